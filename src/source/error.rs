#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Listing site responded with status {status} for `{url}`.")]
    HttpStatus { status: u16, url: String },

    #[error("Invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid listing markup: missing field `{field}`.")]
    MissingField { field: String },

    #[error("Could not find an article number in the URL `{url}`.")]
    InvalidArticle { url: String },

    #[error("Invalid publication time: {time}.")]
    InvalidTime { time: String },

    #[error("The URL `{url}` has an invalid format.")]
    InvalidUrl { url: String },
}

impl SourceError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Transport failures, server errors, timeouts and rate limiting are
    /// transient. Other client errors (a removed or hidden listing) are not,
    /// and neither is bad markup.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::RequestFailed(_) => true,
            SourceError::HttpStatus { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::RequestFailed(Box::new(e))
    }
}

impl From<derive_builder::UninitializedFieldError> for SourceError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        SourceError::MissingField {
            field: e.field_name().to_string(),
        }
    }
}
