//! Redis list-backed queue.
//!
//! Producers `LPUSH` onto the list and consumers `BRPOP` from the other end,
//! which gives FIFO order and an atomic single-consumer pop.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use verdict_core::JobDescriptor;

use crate::error::QueueError;
use crate::parser::{encode_job, parse_job};
use crate::queue::{JobQueue, QueueHealth};

/// Blocking connections kept around for reuse between dequeues.
const MAX_IDLE_BLOCKING: usize = 16;

pub struct RedisQueue {
    client: redis::Client,
    /// Shared connection for non-blocking commands.
    conn: MultiplexedConnection,
    /// Dedicated connections for `BRPOP`. A blocking command stalls every
    /// other request pipelined on the same connection, so concurrent workers
    /// each need their own.
    blocking: Mutex<Vec<MultiplexedConnection>>,
    key: String,
}

impl RedisQueue {
    /// Connect to `url` and use the list at `key` as the queue.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, QueueError> {
        let key = key.into();
        if key.is_empty() {
            return Err(QueueError::Config("queue key must not be empty".into()));
        }
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::Config(format!("invalid redis url: {e}")))?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!(queue = %key, "redis queue connected");

        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(Vec::new()),
            key,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, QueueError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn checkin_blocking(&self, conn: MultiplexedConnection) {
        let mut idle = self.blocking.lock().await;
        if idle.len() < MAX_IDLE_BLOCKING {
            idle.push(conn);
        }
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        let body = encode_job(job)?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(body)
            .query_async(&mut conn)
            .await?;
        debug!(job_id = %job.id, queue = %self.key, "enqueued");
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
        // BRPOP treats 0 as "block forever", so a zero timeout is a plain RPOP.
        let body: Option<String> = if timeout.is_zero() {
            let mut conn = self.conn.clone();
            redis::cmd("RPOP")
                .arg(&self.key)
                .query_async(&mut conn)
                .await?
        } else {
            let mut conn = self.checkout_blocking().await?;
            let popped: Option<(String, String)> = redis::cmd("BRPOP")
                .arg(&self.key)
                .arg(timeout.as_secs_f64())
                .query_async(&mut conn)
                .await?;
            self.checkin_blocking(conn).await;
            popped.map(|(_, body)| body)
        };

        match body {
            Some(body) => parse_job(&body).map(Some).map_err(QueueError::from),
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        let depth: u64 = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(QueueHealth {
            connected: true,
            approximate_depth: Some(depth),
            provider: "redis".to_string(),
        })
    }
}
