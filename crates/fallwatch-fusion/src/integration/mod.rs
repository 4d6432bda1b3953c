//! Inbound integrations: remote report transport and offline replay.

pub mod receiver;
pub mod replay;

pub use receiver::{ReceiverConfig, ReportReceiver};
pub use replay::ReplaySource;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

/// Delivery of opaque remote payloads.
///
/// Delivery order across devices is not guaranteed and duplicate delivery of
/// the same logical event is expected; consumers handle both. `None` means
/// the transport has shut down and no further payloads will arrive.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Awaits the next payload.
    async fn next_payload(&self) -> Option<Bytes>;
}

/// Channel-backed transport for tests and in-process embedding.
pub struct QueueTransport {
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl QueueTransport {
    /// Creates a bounded queue transport, returning the producer side with it.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx: Mutex::new(rx) })
    }
}

#[async_trait]
impl RemoteTransport for QueueTransport {
    async fn next_payload(&self) -> Option<Bytes> {
        self.rx.lock().await.recv().await
    }
}
