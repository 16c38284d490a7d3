//! Redis-backed result store.
//!
//! Results live at `<prefix><id>` as JSON strings; dispatcher claims live at
//! `<prefix>claim:<id>` with a `PX` expiry so a crashed dispatcher never
//! blocks resubmission forever.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use verdict_core::{decode_result, encode_result, JobId, ResultRecord};

use crate::error::StoreError;
use crate::results::ResultStore;

pub struct RedisResultStore {
    conn: MultiplexedConnection,
    prefix: String,
    ttl: Option<Duration>,
}

impl RedisResultStore {
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Config(format!("invalid redis url: {e}")))?;
        let conn = client.get_multiplexed_async_connection().await?;
        let prefix = prefix.into();

        info!(prefix = %prefix, ttl = ?ttl, "redis result store connected");

        Ok(Self { conn, prefix, ttl })
    }

    fn result_key(&self, id: &JobId) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn claim_key(&self, id: &JobId) -> String {
        format!("{}claim:{}", self.prefix, id)
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn put(&self, id: &JobId, record: &ResultRecord) -> Result<(), StoreError> {
        let body = encode_result(record).map_err(|e| e.with_id(id.as_str()))?;
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("SET").arg(self.result_key(id)).arg(body);
        if let Some(ttl) = self.ttl {
            pipe.arg("PX").arg(ttl.as_millis() as u64);
        }
        pipe.ignore().cmd("DEL").arg(self.claim_key(id)).ignore();

        let _: () = pipe.query_async(&mut conn).await?;
        debug!(job_id = %id, "result stored");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<ResultRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let body: Option<String> = redis::cmd("GET")
            .arg(self.result_key(id))
            .query_async(&mut conn)
            .await?;
        match body {
            Some(body) => decode_result(&body)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.with_id(id.as_str()))),
            None => Ok(None),
        }
    }

    async fn claim(&self, id: &JobId, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.claim_key(id))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, id: &JobId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.claim_key(id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
