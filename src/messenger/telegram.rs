//! Telegram Bot API messenger.

use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use governor::Quota;
use governor::RateLimiter;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use log::debug;
use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::StatusCode;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use serde::Deserialize;
use serde::Serialize;

use crate::config::Config;
use crate::error::AppError;
use crate::messenger::InlineKeyboard;
use crate::messenger::Messenger;
use crate::messenger::error::MessengerError;

const PARSE_MODE: &str = "HTML";

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard>,
}

pub struct TelegramMessenger {
    client: Client,
    /// `{api_url}/bot{token}`
    bot_url: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
}

impl TelegramMessenger {
    pub fn new(api_url: &str, token: &str, messages_per_second: u32) -> Result<Self, MessengerError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let quota = Quota::per_second(NonZeroU32::new(messages_per_second).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            bot_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            limiter: RateLimiter::direct(quota),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let token = config
            .telegram_token
            .as_deref()
            .ok_or_else(|| AppError::MissingConfig {
                key: "TELEGRAM_TOKEN".to_string(),
            })?;
        Ok(Self::new(
            &config.telegram_api_url,
            token,
            config.telegram_rate_limit,
        )?)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.bot_url, method)
    }

    async fn call(&self, chat_id: i64, request: RequestBuilder) -> Result<(), MessengerError> {
        self.limiter.until_ready().await;

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();

        if status == StatusCode::FORBIDDEN {
            return Err(MessengerError::Blocked { chat_id });
        }
        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(ApiResponse { description, .. }) => Err(MessengerError::ApiError {
                status: status.as_u16(),
                message: description.unwrap_or_else(|| "Unknown API error".to_string()),
            }),
            None => Err(MessengerError::ApiError {
                status: status.as_u16(),
                message: body,
            }),
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_photo(&self, chat_id: i64, photo: &Path, caption: &str) -> Result<(), MessengerError> {
        let bytes = tokio::fs::read(photo).await?;
        let file_name = photo
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", PARSE_MODE)
            .part("photo", Part::bytes(bytes).file_name(file_name));

        debug!("Sending photo to chat {chat_id}");
        self.call(
            chat_id,
            self.client.post(self.method_url("sendPhoto")).multipart(form),
        )
        .await
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), MessengerError> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: PARSE_MODE,
        };
        self.call(
            chat_id,
            self.client.post(self.method_url("sendMessage")).json(&body),
        )
        .await
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        let body = EditMessageText {
            chat_id,
            message_id,
            text,
            parse_mode: PARSE_MODE,
            reply_markup: keyboard,
        };
        self.call(
            chat_id,
            self.client.post(self.method_url("editMessageText")).json(&body),
        )
        .await
    }
}
