use clap::Args;

use crate::exchange::{DEFAULT_NAMESPACE, QueueBackend, QueueConfig};

#[derive(Args, Debug, Clone)]
pub struct QueueArgs {
    #[arg(
        long = "queue-backend",
        env = "TIDEPOOL_QUEUE_BACKEND",
        default_value_t = QueueBackend::Redis,
        help = "Queue store shared by the controller and the device (redis or memory)"
    )]
    pub backend: QueueBackend,

    #[arg(
        long = "redis-url",
        env = "TIDEPOOL_REDIS_URL",
        default_value = "redis://127.0.0.1:6379/",
        help = "Redis instance holding the action and observation lists"
    )]
    pub redis_url: String,

    #[arg(
        long,
        env = "TIDEPOOL_NAMESPACE",
        default_value = DEFAULT_NAMESPACE,
        help = "Key prefix separating concurrent sessions"
    )]
    pub namespace: String,
}

impl QueueArgs {
    pub fn to_config(&self) -> QueueConfig {
        QueueConfig {
            backend: self.backend,
            redis_url: self.redis_url.clone(),
            namespace: self.namespace.clone(),
        }
    }
}
