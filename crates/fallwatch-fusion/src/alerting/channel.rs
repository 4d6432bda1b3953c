//! Notification channel contract and shared retry machinery.
//!
//! Each external channel (telephony, chat) is modeled as a capability
//! interface with its own internal failure classification; the shared retry
//! helpers apply bounded exponential backoff on retryable outcomes and
//! degrade image sends to text instead of dropping the alert.

use std::time::Duration;

use async_trait::async_trait;

/// Result of a single channel send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The notification reached the channel
    Delivered,
    /// The attempt failed in a way that may succeed on retry
    Retryable(String),
    /// The attempt failed permanently for this message
    Terminal(String),
}

impl SendOutcome {
    /// Returns `true` if the notification was delivered.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl From<fallwatch_core::ChannelError> for SendOutcome {
    /// Folds a channel transport error into an outcome using the error's own
    /// recoverability classification.
    fn from(err: fallwatch_core::ChannelError) -> Self {
        if err.is_recoverable() {
            Self::Retryable(err.to_string())
        } else {
            Self::Terminal(err.to_string())
        }
    }
}

/// An external notification channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable channel name for logs.
    fn name(&self) -> &'static str;

    /// Whether this channel can carry image attachments.
    fn supports_images(&self) -> bool {
        false
    }

    /// Sends a text notification.
    async fn send_text(&self, message: &str) -> SendOutcome;

    /// Sends an image with a caption. Channels without image support deliver
    /// the caption as text.
    async fn send_image(&self, image: &[u8], caption: &str) -> SendOutcome {
        let _ = image;
        self.send_text(caption).await
    }
}

/// Bounded exponential backoff policy for channel sends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per send (default: 3)
    pub max_attempts: u32,
    /// Backoff before the second attempt (default: 500ms)
    pub initial_backoff: Duration,
    /// Backoff growth factor (default: 2.0)
    pub backoff_multiplier: f64,
    /// Backoff ceiling (default: 10s)
    pub max_backoff: Duration,
    /// Timeout applied to each individual attempt (default: 10s)
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff to sleep after the given 1-based attempt number.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let backoff = self.initial_backoff.mul_f64(factor);
        backoff.min(self.max_backoff)
    }
}

/// Sends a text message with bounded retries on retryable outcomes.
///
/// Each attempt runs under the policy's timeout; a timed-out attempt counts
/// as retryable, not as an unbounded hang.
pub async fn send_text_with_retry(
    channel: &dyn NotificationChannel,
    policy: &RetryPolicy,
    message: &str,
) -> SendOutcome {
    let mut last = SendOutcome::Retryable("no attempt made".into());
    for attempt in 1..=policy.max_attempts {
        let outcome = match tokio::time::timeout(policy.attempt_timeout, channel.send_text(message))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::Retryable(format!(
                "send timed out after {}ms",
                policy.attempt_timeout.as_millis()
            )),
        };

        match outcome {
            SendOutcome::Delivered => return SendOutcome::Delivered,
            SendOutcome::Terminal(reason) => {
                tracing::warn!(channel = channel.name(), %reason, "terminal send failure");
                return SendOutcome::Terminal(reason);
            }
            SendOutcome::Retryable(reason) => {
                tracing::warn!(
                    channel = channel.name(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    %reason,
                    "retryable send failure"
                );
                last = SendOutcome::Retryable(reason);
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff_after(attempt)).await;
                }
            }
        }
    }
    last
}

/// Sends an image with bounded retries, degrading to a text-only notification
/// when the image cannot be delivered within the retry budget.
pub async fn send_image_with_retry(
    channel: &dyn NotificationChannel,
    policy: &RetryPolicy,
    image: &[u8],
    caption: &str,
) -> SendOutcome {
    if !channel.supports_images() || image.is_empty() {
        return send_text_with_retry(channel, policy, caption).await;
    }

    for attempt in 1..=policy.max_attempts {
        let outcome =
            match tokio::time::timeout(policy.attempt_timeout, channel.send_image(image, caption))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => SendOutcome::Retryable(format!(
                    "image send timed out after {}ms",
                    policy.attempt_timeout.as_millis()
                )),
            };

        match outcome {
            SendOutcome::Delivered => return SendOutcome::Delivered,
            SendOutcome::Terminal(reason) => {
                tracing::warn!(
                    channel = channel.name(),
                    %reason,
                    "image rejected, falling back to text"
                );
                break;
            }
            SendOutcome::Retryable(reason) => {
                tracing::warn!(
                    channel = channel.name(),
                    attempt,
                    %reason,
                    "retryable image send failure"
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff_after(attempt)).await;
                }
            }
        }
    }

    // The alert must not be lost with the image.
    send_text_with_retry(channel, policy, caption).await
}
