use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tidepool_core::{Action, Observation};
use tracing::info;

use crate::memory::InMemoryQueue;
use crate::queue::{MessageQueue, QueueError, QueueResult};
use crate::typed::TypedQueue;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueueBackend {
    InMemory,
    #[default]
    Redis,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(QueueBackend::InMemory),
            "redis" => Ok(QueueBackend::Redis),
            other => Err(format!("unknown queue backend `{other}` (expected memory or redis)")),
        }
    }
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueBackend::InMemory => "memory",
            QueueBackend::Redis => "redis",
        })
    }
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub redis_url: String,
    pub namespace: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            redis_url: "redis://127.0.0.1:6379/".into(),
            namespace: DEFAULT_NAMESPACE.into(),
        }
    }
}

impl QueueConfig {
    pub fn actions_key(&self) -> String {
        format!("tidepool:{}:actions", self.namespace)
    }

    pub fn observations_key(&self) -> String {
        format!("tidepool:{}:observations", self.namespace)
    }
}

/// The two queues of one session: actions flow controller to device,
/// observations flow back.
#[derive(Clone)]
pub struct ExchangeQueues {
    pub actions: TypedQueue<Action>,
    pub observations: TypedQueue<Observation>,
}

impl ExchangeQueues {
    pub fn from_parts(
        actions: Arc<dyn MessageQueue>,
        observations: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            actions: TypedQueue::new(actions),
            observations: TypedQueue::new(observations),
        }
    }

    /// Fresh in-process pair. Clone the result to hand the same queues to
    /// the other side.
    pub fn in_memory() -> Self {
        Self::from_parts(
            Arc::new(InMemoryQueue::new("actions")),
            Arc::new(InMemoryQueue::new("observations")),
        )
    }

    /// Opens the queues named by `config`. A Redis backend that cannot be
    /// reached is an error; there is no silent fallback to memory.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        match config.backend {
            QueueBackend::InMemory => {
                info!(namespace = %config.namespace, "using in-memory exchange queues");
                Ok(Self::in_memory())
            }
            QueueBackend::Redis => connect_redis(config).await,
        }
    }

    /// Empties both queues, returning `(actions, observations)` removed.
    pub async fn flush(&self) -> QueueResult<(usize, usize)> {
        let actions = self.actions.clear().await?;
        let observations = self.observations.clear().await?;
        Ok((actions, observations))
    }
}

#[cfg(feature = "redis-queue")]
async fn connect_redis(config: &QueueConfig) -> QueueResult<ExchangeQueues> {
    use crate::queue_redis::RedisQueue;

    let actions = RedisQueue::connect(&config.redis_url, config.actions_key())
        .await
        .map_err(|err| QueueError::Transport(err.to_string()))?;
    let observations = RedisQueue::connect(&config.redis_url, config.observations_key())
        .await
        .map_err(|err| QueueError::Transport(err.to_string()))?;
    info!(
        url = %config.redis_url,
        namespace = %config.namespace,
        "connected redis exchange queues"
    );
    Ok(ExchangeQueues::from_parts(
        Arc::new(actions),
        Arc::new(observations),
    ))
}

#[cfg(not(feature = "redis-queue"))]
async fn connect_redis(_config: &QueueConfig) -> QueueResult<ExchangeQueues> {
    Err(QueueError::Transport(
        "redis backend requested but the `redis-queue` feature is disabled".into(),
    ))
}
