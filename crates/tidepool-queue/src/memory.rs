use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::queue::{MessageQueue, QueueError, QueueResult};

/// Unbounded in-process queue.
///
/// Used when both sides run in one process (tests, dry runs). `close` stands
/// in for losing the connection to a remote store: every later call fails
/// with [`QueueError::Closed`] and parked poppers are woken.
pub struct InMemoryQueue {
    name: String,
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Default)]
struct State {
    items: VecDeque<Bytes>,
    closed: bool,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn closed_error(&self) -> QueueError {
        QueueError::Closed(self.name.clone())
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, message: Bytes) -> QueueResult<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(self.closed_error());
            }
            state.items.push_back(message);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> QueueResult<Option<Bytes>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state.items.pop_front())
    }

    async fn blocking_pop(&self) -> QueueResult<Bytes> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before looking, so a push between the check
            // and the await still wakes us.
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(self.closed_error());
                }
                if let Some(item) = state.items.pop_front() {
                    return Ok(item);
                }
            }
            notified.await;
        }
    }

    async fn clear(&self) -> QueueResult<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        let removed = state.items.len();
        state.items.clear();
        Ok(removed)
    }

    async fn len(&self) -> QueueResult<usize> {
        let state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state.items.len())
    }
}
