use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tidepool_core::WireError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {0} is closed")]
    Closed(String),
    #[error("queue transport error: {0}")]
    Transport(String),
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: WireError,
    },
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: WireError,
    },
}

impl QueueError {
    /// True when the backing store can no longer be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, QueueError::Closed(_) | QueueError::Transport(_))
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Strict FIFO channel of opaque messages.
///
/// Implementations own their mutual exclusion and keep push order under
/// concurrent pushers and poppers. Pushes never fail for capacity reasons;
/// only transport problems surface as errors.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn push(&self, message: Bytes) -> QueueResult<()>;

    /// Returns the oldest message, or `None` when the queue is empty.
    async fn pop(&self) -> QueueResult<Option<Bytes>>;

    /// Waits, without a deadline, until a message is available.
    async fn blocking_pop(&self) -> QueueResult<Bytes>;

    /// Drops every pending message and returns how many were removed.
    async fn clear(&self) -> QueueResult<usize>;

    async fn len(&self) -> QueueResult<usize>;
}
