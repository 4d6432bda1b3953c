//! Telephony notification channel (Asterisk Manager Interface dialect).
//!
//! Speaks the line-based AMI protocol over TCP: an action is a block of
//! `Key: Value` lines terminated by a blank line, and the server answers with
//! a block of the same shape. For every configured extension the channel
//! originates a call to the alert announcement exten and sends a SIP MESSAGE
//! with the alert text. The connection is kept open between alerts and
//! re-established lazily after a failure.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::alerting::{NotificationChannel, SendOutcome};
use fallwatch_core::ChannelError;

/// Configuration for [`TelephonyChannel`].
#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    /// Manager interface host
    pub host: String,
    /// Manager interface port (default: 5038)
    pub port: u16,
    /// Manager username
    pub username: String,
    /// Manager secret
    pub secret: String,
    /// Extensions to alert
    pub extensions: Vec<String>,
    /// Dialplan context for originated calls (default: "internal")
    pub context: String,
    /// Dialplan exten the call is parked on while the announcement plays
    /// (default: "9999")
    pub exten: String,
    /// Caller ID presented on alert calls
    pub caller_id: String,
    /// TCP connect timeout (default: 5s)
    pub connect_timeout: Duration,
    /// Per-action response timeout (default: 5s)
    pub action_timeout: Duration,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5038,
            username: String::new(),
            secret: String::new(),
            extensions: Vec::new(),
            context: "internal".into(),
            exten: "9999".into(),
            caller_id: "FallWatch <1000>".into(),
            connect_timeout: Duration::from_secs(5),
            action_timeout: Duration::from_secs(5),
        }
    }
}

/// A parsed manager response block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AmiResponse {
    fields: HashMap<String, String>,
}

impl AmiResponse {
    fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let mut fields = HashMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { fields }
    }

    fn is_success(&self) -> bool {
        self.fields
            .get("Response")
            .is_some_and(|r| r.eq_ignore_ascii_case("success"))
    }

    fn message(&self) -> &str {
        self.fields.get("Message").map_or("", String::as_str)
    }
}

struct AmiConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl AmiConnection {
    async fn send_action(
        &mut self,
        fields: &[(&str, &str)],
        timeout: Duration,
    ) -> std::io::Result<AmiResponse> {
        let mut packet = String::new();
        for (key, value) in fields {
            packet.push_str(key);
            packet.push_str(": ");
            packet.push_str(value);
            packet.push_str("\r\n");
        }
        packet.push_str("\r\n");

        let exchange = async {
            self.writer.write_all(packet.as_bytes()).await?;
            self.writer.flush().await?;
            self.read_block().await
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "action timed out"))?
    }

    /// Reads one `Key: Value` block terminated by a blank line.
    async fn read_block(&mut self) -> std::io::Result<AmiResponse> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "manager closed the connection",
                ));
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            lines.push(trimmed.to_string());
        }
        Ok(AmiResponse::from_lines(lines.iter().map(String::as_str)))
    }
}

/// Telephony channel alerting a fixed set of extensions.
pub struct TelephonyChannel {
    config: TelephonyConfig,
    connection: Mutex<Option<AmiConnection>>,
}

impl TelephonyChannel {
    /// Creates a channel; the connection is established on first use.
    #[must_use]
    pub fn new(config: TelephonyConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<AmiConnection, SendOutcome> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                SendOutcome::from(ChannelError::Connect {
                    channel: "telephony",
                    reason: format!("connect to {addr} timed out"),
                })
            })?
            .map_err(|e| {
                SendOutcome::from(ChannelError::Connect {
                    channel: "telephony",
                    reason: format!("connect to {addr} failed: {e}"),
                })
            })?;

        let (read_half, write_half) = stream.into_split();
        let mut connection = AmiConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        // The manager greets with a single banner line before any block.
        let mut banner = String::new();
        let banner_read = tokio::time::timeout(
            self.config.action_timeout,
            connection.reader.read_line(&mut banner),
        )
        .await;
        match banner_read {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(SendOutcome::Retryable(format!("banner read failed: {e}"))),
            Err(_) => return Err(SendOutcome::Retryable("banner read timed out".into())),
        }
        tracing::debug!(banner = banner.trim(), "manager connected");

        let login = connection
            .send_action(
                &[
                    ("Action", "Login"),
                    ("Username", &self.config.username),
                    ("Secret", &self.config.secret),
                ],
                self.config.action_timeout,
            )
            .await
            .map_err(|e| SendOutcome::Retryable(format!("login exchange failed: {e}")))?;

        if !login.is_success() {
            // Wrong credentials will not get better on retry.
            return Err(ChannelError::Terminal {
                channel: "telephony",
                reason: format!("manager login rejected: {}", login.message()),
            }
            .into());
        }

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            "telephony manager session established"
        );
        Ok(connection)
    }

    /// Alerts a single extension: originate the announcement call, then send
    /// the SIP MESSAGE. Either action reporting success counts as reaching
    /// the extension.
    async fn alert_extension(
        &self,
        connection: &mut AmiConnection,
        extension: &str,
        message: &str,
    ) -> std::io::Result<bool> {
        let channel = format!("PJSIP/{extension}");
        let variable = format!("ALERT_MSG={message}");

        let call = connection
            .send_action(
                &[
                    ("Action", "Originate"),
                    ("Channel", &channel),
                    ("Context", &self.config.context),
                    ("Exten", &self.config.exten),
                    ("Priority", "1"),
                    ("CallerID", &self.config.caller_id),
                    ("Variable", &variable),
                    ("Async", "true"),
                ],
                self.config.action_timeout,
            )
            .await?;
        if !call.is_success() {
            tracing::warn!(extension, reason = call.message(), "originate rejected");
        }

        let to = format!("pjsip:{extension}");
        let text = connection
            .send_action(
                &[
                    ("Action", "MessageSend"),
                    ("To", &to),
                    ("From", "server"),
                    ("Body", message),
                ],
                self.config.action_timeout,
            )
            .await?;
        if !text.is_success() {
            tracing::warn!(extension, reason = text.message(), "message send rejected");
        }

        Ok(call.is_success() || text.is_success())
    }
}

#[async_trait]
impl NotificationChannel for TelephonyChannel {
    fn name(&self) -> &'static str {
        "telephony"
    }

    async fn send_text(&self, message: &str) -> SendOutcome {
        if self.config.extensions.is_empty() {
            return SendOutcome::Terminal("no extensions configured".into());
        }

        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            match self.connect().await {
                Ok(connection) => *guard = Some(connection),
                Err(outcome) => return outcome,
            }
        }

        let mut reached = 0usize;
        let mut lost: Option<String> = None;
        if let Some(connection) = guard.as_mut() {
            for extension in &self.config.extensions {
                match self.alert_extension(connection, extension, message).await {
                    Ok(true) => reached += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(extension, error = %e, "manager connection lost");
                        lost = Some(e.to_string());
                        break;
                    }
                }
            }
        }

        if let Some(reason) = lost {
            // Drop the session so the next attempt reconnects from scratch.
            *guard = None;
            return SendOutcome::Retryable(format!("connection lost: {reason}"));
        }

        if reached > 0 {
            SendOutcome::Delivered
        } else {
            SendOutcome::Retryable("no extension accepted the alert".into())
        }
    }
}
