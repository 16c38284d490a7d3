//! In-process result store with optional expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use verdict_core::{decode_result, encode_result, JobId, ResultRecord};

use crate::error::StoreError;
use crate::results::ResultStore;

struct Entry {
    body: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| now < t)
    }
}

/// Roughly thirty years out; tokio uses the same horizon for unbounded sleeps.
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}

/// Records are kept in their encoded form so reads go through the same
/// validation as a networked store.
#[derive(Default)]
pub struct MemoryResultStore {
    records: RwLock<HashMap<JobId, Entry>>,
    claims: Mutex<HashMap<JobId, Instant>>,
    ttl: Option<Duration>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results expire `ttl` after they are written.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.records
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(&self, id: &JobId, record: &ResultRecord) -> Result<(), StoreError> {
        let body = encode_result(record).map_err(|e| e.with_id(id.as_str()))?;
        let now = Instant::now();
        let entry = Entry {
            body,
            expires_at: self.ttl.and_then(|ttl| now.checked_add(ttl)),
        };
        {
            let mut records = self.records.write().await;
            records.retain(|_, e| e.is_live(now));
            records.insert(id.clone(), entry);
        }
        self.claims.lock().await.remove(id);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<ResultRecord>, StoreError> {
        let records = self.records.read().await;
        match records.get(id) {
            Some(entry) if entry.is_live(Instant::now()) => decode_result(&entry.body)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.with_id(id.as_str()))),
            _ => Ok(None),
        }
    }

    async fn claim(&self, id: &JobId, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut claims = self.claims.lock().await;
        claims.retain(|_, expires_at| now < *expires_at);
        if claims.contains_key(id) {
            return Ok(false);
        }
        // An unrepresentable expiry never lapses; release or put clears it.
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| far_future(now));
        claims.insert(id.clone(), expires_at);
        Ok(true)
    }

    async fn release(&self, id: &JobId) -> Result<(), StoreError> {
        self.claims.lock().await.remove(id);
        Ok(())
    }
}
