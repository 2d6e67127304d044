use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tidepool_core::WireMessage;
use tracing::{trace, warn};

use crate::metrics::{QUEUE_CLEARED, QUEUE_DECODE_DROPPED, QUEUE_POPPED, QUEUE_PUSHED};
use crate::queue::{MessageQueue, QueueError, QueueResult};

/// Schema-aware view over a byte queue.
///
/// Encoding happens before the push so a message that cannot be represented
/// never reaches the store.
pub struct TypedQueue<M> {
    inner: Arc<dyn MessageQueue>,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for TypedQueue<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _message: PhantomData,
        }
    }
}

impl<M: WireMessage> TypedQueue<M> {
    pub fn new(inner: Arc<dyn MessageQueue>) -> Self {
        Self {
            inner,
            _message: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn raw(&self) -> &Arc<dyn MessageQueue> {
        &self.inner
    }

    pub async fn push(&self, message: &M) -> QueueResult<()> {
        let encoded = message.encode().map_err(|source| QueueError::Encode {
            kind: M::LABEL,
            source,
        })?;
        let len = encoded.len();
        self.inner.push(Bytes::from(encoded)).await?;
        QUEUE_PUSHED.with_label_values(&[self.name()]).inc();
        trace!(queue = self.name(), bytes = len, kind = M::LABEL, "pushed");
        Ok(())
    }

    /// Non-blocking pop. A malformed message is consumed and reported as
    /// [`QueueError::Decode`].
    pub async fn pop(&self) -> QueueResult<Option<M>> {
        let Some(raw) = self.inner.pop().await? else {
            return Ok(None);
        };
        QUEUE_POPPED.with_label_values(&[self.name()]).inc();
        M::decode(&raw)
            .map(Some)
            .map_err(|source| QueueError::Decode {
                kind: M::LABEL,
                source,
            })
    }

    /// Waits for the next well-formed message. Malformed entries are logged,
    /// counted and skipped.
    pub async fn blocking_pop(&self) -> QueueResult<M> {
        loop {
            let raw = self.inner.blocking_pop().await?;
            QUEUE_POPPED.with_label_values(&[self.name()]).inc();
            match M::decode(&raw) {
                Ok(message) => return Ok(message),
                Err(err) => {
                    QUEUE_DECODE_DROPPED.with_label_values(&[self.name()]).inc();
                    warn!(
                        queue = self.name(),
                        kind = M::LABEL,
                        bytes = raw.len(),
                        error = %err,
                        "dropping malformed message"
                    );
                }
            }
        }
    }

    pub async fn clear(&self) -> QueueResult<usize> {
        let removed = self.inner.clear().await?;
        if removed > 0 {
            QUEUE_CLEARED
                .with_label_values(&[self.name()])
                .inc_by(removed as u64);
        }
        Ok(removed)
    }

    pub async fn len(&self) -> QueueResult<usize> {
        self.inner.len().await
    }

    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use tidepool_core::{Action, Observation};

    use super::*;
    use crate::memory::InMemoryQueue;

    #[test_timeout::tokio_timeout_test(10)]
    async fn typed_push_pop_keeps_values() {
        let queue: TypedQueue<Action> = TypedQueue::new(Arc::new(InMemoryQueue::new("actions")));
        queue.push(&Action::touch(100.0, 200.0)).await.expect("push");
        queue.push(&Action::Reset).await.expect("push");

        assert_eq!(
            queue.blocking_pop().await.expect("pop"),
            Action::touch(100.0, 200.0)
        );
        assert_eq!(queue.pop().await.expect("pop"), Some(Action::Reset));
        assert_eq!(queue.pop().await.expect("pop"), None);
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn blocking_pop_skips_malformed_entries() {
        let raw = Arc::new(InMemoryQueue::new("decode-skip"));
        let queue: TypedQueue<Observation> = TypedQueue::new(raw.clone());

        raw.push(Bytes::from_static(&[0xff, 0x00])).await.expect("push");
        queue
            .push(&Observation::new(vec![1u8, 2, 3]))
            .await
            .expect("push");

        let observation = queue.blocking_pop().await.expect("pop");
        assert_eq!(observation.image().as_ref(), &[1, 2, 3]);
        assert!(
            QUEUE_DECODE_DROPPED
                .with_label_values(&["decode-skip"])
                .get()
                >= 1
        );
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn non_blocking_pop_reports_decode_error() {
        let raw = Arc::new(InMemoryQueue::new("actions"));
        let queue: TypedQueue<Action> = TypedQueue::new(raw.clone());
        raw.push(Bytes::from_static(b"garbage")).await.expect("push");

        let err = queue.pop().await.expect_err("decode error");
        assert!(matches!(err, QueueError::Decode { kind: "action", .. }));
        assert!(queue.is_empty().await.expect("len"));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn non_finite_touch_is_rejected_before_push() {
        let queue: TypedQueue<Action> = TypedQueue::new(Arc::new(InMemoryQueue::new("actions")));
        let err = queue
            .push(&Action::touch(f64::NAN, 1.0))
            .await
            .expect_err("encode error");
        assert!(matches!(err, QueueError::Encode { .. }));
        assert_eq!(queue.len().await.expect("len"), 0);
    }
}
