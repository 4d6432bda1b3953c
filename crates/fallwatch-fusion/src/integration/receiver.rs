//! UDP receiver for remote device reports.
//!
//! Remote wearables publish their reports as single-datagram payloads; the
//! receiver drains the socket on a background task into a bounded queue.
//! When the queue is full the incoming report is shed with a warning rather
//! than letting a slow consumer grow memory without bound.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::RemoteTransport;
use crate::{FusionError, Result};

/// Configuration for [`ReportReceiver`].
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Address to bind (default: "0.0.0.0")
    pub bind_address: String,
    /// Port to bind; 0 picks an ephemeral port (default: 5800)
    pub port: u16,
    /// Maximum payloads queued ahead of the consumer (default: 256)
    pub queue_size: usize,
    /// Receive buffer size; larger datagrams are truncated by the OS
    /// (default: 8192)
    pub max_datagram_bytes: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 5800,
            queue_size: 256,
            max_datagram_bytes: 8192,
        }
    }
}

/// Bound UDP report receiver.
pub struct ReportReceiver {
    transport: super::QueueTransport,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ReportReceiver {
    /// Binds the socket and starts the receive loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn spawn(config: ReceiverConfig) -> Result<Self> {
        let socket = UdpSocket::bind((config.bind_address.as_str(), config.port))
            .await
            .map_err(FusionError::Io)?;
        let local_addr = socket.local_addr().map_err(FusionError::Io)?;

        let (tx, rx) = mpsc::channel::<Bytes>(config.queue_size.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(%local_addr, "report receiver listening");
        let task = tokio::spawn(receive_loop(socket, config, tx, shutdown_rx));

        Ok(Self {
            transport: super::QueueTransport {
                rx: tokio::sync::Mutex::new(rx),
            },
            shutdown_tx,
            task,
            local_addr,
        })
    }

    /// The address the receiver actually bound.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals the receive loop to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "receiver task failed");
        }
    }
}

#[async_trait]
impl RemoteTransport for ReportReceiver {
    async fn next_payload(&self) -> Option<Bytes> {
        self.transport.next_payload().await
    }
}

async fn receive_loop(
    socket: UdpSocket,
    config: ReceiverConfig,
    tx: mpsc::Sender<Bytes>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; config.max_datagram_bytes.max(64)];
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::info!("report receiver shutting down");
                break;
            }
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((0, _)) => {}
                    Ok((n, from)) => {
                        let payload = Bytes::copy_from_slice(&buf[..n]);
                        match tx.try_send(payload) {
                            Ok(()) => {
                                tracing::trace!(%from, bytes = n, "report queued");
                            }
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::warn!(%from, "report queue full, payload dropped");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                tracing::info!("report consumer gone, receiver stopping");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "udp receive failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ephemeral_receiver() -> ReportReceiver {
        ReportReceiver::spawn(ReceiverConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            ..ReceiverConfig::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_datagram_arrives_as_payload() {
        let receiver = ephemeral_receiver().await;
        let target = receiver.local_addr();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(br#"{"device_id":"dev1","fall_detected":true}"#, target)
            .await
            .unwrap();

        let payload = receiver.next_payload().await.unwrap();
        assert!(payload.as_ref().starts_with(b"{\"device_id\""));
        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_multiple_datagrams_queue_up() {
        let receiver = ephemeral_receiver().await;
        let target = receiver.local_addr();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        for i in 0..3u8 {
            sender.send_to(&[b'p', i], target).await.unwrap();
        }
        for _ in 0..3 {
            assert!(receiver.next_payload().await.is_some());
        }
        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let receiver = ephemeral_receiver().await;
        receiver.shutdown().await;
    }
}
