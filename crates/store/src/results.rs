//! Result store trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use verdict_core::{JobId, ResultRecord};

use crate::error::StoreError;

/// Key/value store mapping correlation IDs to job outcomes.
///
/// `get` returning `Ok(None)` is the normal "still processing" answer and is
/// distinct from a stored [`ResultRecord::Failure`].
///
/// Besides results, the store tracks short-lived claims that dispatchers use
/// to avoid enqueuing the same content twice while a job is in flight.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Upsert the outcome for `id` (last writer wins) and drop any claim on it.
    async fn put(&self, id: &JobId, record: &ResultRecord) -> Result<(), StoreError>;

    /// Fetch the whole outcome for `id`, or `None` if nothing is stored yet.
    async fn get(&self, id: &JobId) -> Result<Option<ResultRecord>, StoreError>;

    /// Reserve `id` for `ttl`. Returns `false` if an unexpired claim exists.
    async fn claim(&self, id: &JobId, ttl: Duration) -> Result<bool, StoreError>;

    /// Drop the claim on `id`, if any.
    async fn release(&self, id: &JobId) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: ResultStore + ?Sized> ResultStore for Arc<T> {
    async fn put(&self, id: &JobId, record: &ResultRecord) -> Result<(), StoreError> {
        (**self).put(id, record).await
    }

    async fn get(&self, id: &JobId) -> Result<Option<ResultRecord>, StoreError> {
        (**self).get(id).await
    }

    async fn claim(&self, id: &JobId, ttl: Duration) -> Result<bool, StoreError> {
        (**self).claim(id, ttl).await
    }

    async fn release(&self, id: &JobId) -> Result<(), StoreError> {
        (**self).release(id).await
    }
}
