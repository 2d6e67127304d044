use async_trait::async_trait;
use bytes::Bytes;
use redis::RedisResult;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::queue::{MessageQueue, QueueError, QueueResult};

/// FIFO over a Redis list: producers `LPUSH`, consumers `RPOP`/`BRPOP`.
///
/// Blocking pops park a connection on the server, so they get a dedicated
/// multiplexed connection instead of sharing the manager used for pushes.
pub struct RedisQueue {
    key: String,
    client: redis::Client,
    conn: ConnectionManager,
    blocking: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    pub async fn connect(url: &str, key: impl Into<String>) -> RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let key = key.into();
        debug!(key = %key, "redis queue connected");
        Ok(Self {
            key,
            client,
            conn,
            blocking: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn blocking_conn(
        &self,
        slot: &mut Option<MultiplexedConnection>,
    ) -> QueueResult<MultiplexedConnection> {
        match slot.take() {
            Some(conn) => Ok(conn),
            None => self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(transport),
        }
    }
}

fn transport(err: redis::RedisError) -> QueueError {
    QueueError::Transport(err.to_string())
}

#[async_trait]
impl MessageQueue for RedisQueue {
    fn name(&self) -> &str {
        &self.key
    }

    async fn push(&self, message: Bytes) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(message.as_ref())
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn pop(&self) -> QueueResult<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let item: Option<Vec<u8>> = redis::cmd("RPOP")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(item.map(Bytes::from))
    }

    /// The connection is out of its slot while `BRPOP` is parked. If this
    /// future is dropped mid-wait the connection closes with it, so the server
    /// abandons the pop instead of consuming a later message nobody reads.
    async fn blocking_pop(&self) -> QueueResult<Bytes> {
        let mut slot = self.blocking.lock().await;
        let mut conn = self.blocking_conn(&mut slot).await?;
        let reply: RedisResult<Option<(String, Vec<u8>)>> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(0)
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(Some((_, payload))) => {
                *slot = Some(conn);
                Ok(Bytes::from(payload))
            }
            Ok(None) => {
                *slot = Some(conn);
                Err(QueueError::Transport(format!(
                    "BRPOP on {} returned no value",
                    self.key
                )))
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "blocking pop failed; dropping connection");
                Err(transport(err))
            }
        }
    }

    async fn clear(&self) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let (removed, _): (usize, i64) = redis::pipe()
            .atomic()
            .cmd("LLEN")
            .arg(&self.key)
            .cmd("DEL")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(removed)
    }

    async fn len(&self) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(transport)
    }
}
