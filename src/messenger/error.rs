#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MessengerError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Chat {chat_id} blocked the bot.")]
    Blocked { chat_id: i64 },

    #[error("Messaging API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to read photo: {0}")]
    PhotoUnreadable(#[from] std::io::Error),
}

impl From<reqwest::Error> for MessengerError {
    fn from(e: reqwest::Error) -> Self {
        MessengerError::RequestFailed(Box::new(e))
    }
}
