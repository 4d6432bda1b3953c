//! Chat notification channel (Telegram bot API dialect).
//!
//! Sends alert text via `sendMessage` and frame snapshots via `sendPhoto`
//! (multipart). HTTP status codes are classified into retryable vs terminal
//! outcomes; rate limiting and server errors are worth retrying, client
//! errors are not.

use std::time::Duration;

use async_trait::async_trait;
use fallwatch_core::{ChannelError, CoreError, CoreResult};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use crate::alerting::{NotificationChannel, SendOutcome};

/// Configuration for [`ChatChannel`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Bot token
    pub bot_token: String,
    /// Destination chat id
    pub chat_id: String,
    /// API base URL (default: `https://api.telegram.org`)
    pub api_base: String,
    /// Per-request timeout (default: 10s)
    pub request_timeout: Duration,
}

impl ChatConfig {
    /// Creates a configuration for the public bot API.
    #[must_use]
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: "https://api.telegram.org".into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Chat channel posting alerts to a single chat.
pub struct ChatChannel {
    config: ChatConfig,
    http: reqwest::Client,
}

impl ChatChannel {
    /// Builds the channel and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the token or chat id is empty or the
    /// HTTP client cannot be constructed.
    pub fn new(config: ChatConfig) -> CoreResult<Self> {
        if config.bot_token.is_empty() || config.chat_id.is_empty() {
            return Err(CoreError::configuration(
                "chat channel requires a bot token and chat id",
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoreError::configuration(format!("http client: {e}")))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base, self.config.bot_token, method
        )
    }

    fn classify(status: StatusCode, body: &str) -> SendOutcome {
        if status.is_success() {
            SendOutcome::Delivered
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ChannelError::Transient {
                channel: "chat",
                reason: format!("bot API returned {status}: {body}"),
            }
            .into()
        } else {
            ChannelError::Terminal {
                channel: "chat",
                reason: format!("bot API returned {status}: {body}"),
            }
            .into()
        }
    }

    async fn finish(response: Result<reqwest::Response, reqwest::Error>) -> SendOutcome {
        match response {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                Self::classify(status, &body)
            }
            // Network-level failures (DNS, refused, timeout) are transient.
            Err(e) => ChannelError::Transient {
                channel: "chat",
                reason: format!("request failed: {e}"),
            }
            .into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for ChatChannel {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn supports_images(&self) -> bool {
        true
    }

    async fn send_text(&self, message: &str) -> SendOutcome {
        let response = self
            .http
            .post(self.endpoint("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": message,
            }))
            .send()
            .await;
        Self::finish(response).await
    }

    async fn send_image(&self, image: &[u8], caption: &str) -> SendOutcome {
        let photo = match Part::bytes(image.to_vec())
            .file_name("snapshot.jpg")
            .mime_str("image/jpeg")
        {
            Ok(part) => part,
            Err(e) => {
                return ChannelError::Terminal {
                    channel: "chat",
                    reason: format!("snapshot part rejected: {e}"),
                }
                .into()
            }
        };
        let form = Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .http
            .post(self.endpoint("sendPhoto"))
            .multipart(form)
            .send()
            .await;
        Self::finish(response).await
    }
}
