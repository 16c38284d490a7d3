//! Producer side: turn an artifact into a queued job and hand back its ID.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use verdict_core::{Artifact, InvalidArtifact, JobDescriptor, JobId, ResultRecord};
use verdict_queue::JobQueue;
use verdict_store::{ArtifactStore, ResultStore};

use crate::error::SubmitError;

/// How correlation IDs are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Derive the ID from the content; identical uploads share one job.
    #[default]
    ContentAddressed,
    /// Fresh random token per submission; no deduplication.
    Random,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub id_strategy: IdStrategy,
    /// Lifetime of the in-flight claim taken before enqueuing.
    pub claim_ttl: Duration,
    /// Re-dispatch content whose stored result is an error record.
    pub retry_failed: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            id_strategy: IdStrategy::ContentAddressed,
            claim_ttl: Duration::from_secs(600),
            retry_failed: false,
        }
    }
}

/// What `submit` did with the artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// A new job was queued.
    Enqueued(JobId),
    /// A result for identical content already exists; nothing was queued.
    Cached { id: JobId, record: ResultRecord },
    /// Identical content is already queued or being processed.
    InFlight(JobId),
}

impl Submission {
    pub fn id(&self) -> &JobId {
        match self {
            Submission::Enqueued(id) | Submission::InFlight(id) => id,
            Submission::Cached { id, .. } => id,
        }
    }

    pub fn into_id(self) -> JobId {
        match self {
            Submission::Enqueued(id) | Submission::InFlight(id) => id,
            Submission::Cached { id, .. } => id,
        }
    }

    pub fn was_enqueued(&self) -> bool {
        matches!(self, Submission::Enqueued(_))
    }
}

/// Accepts artifacts and enqueues jobs without waiting for them to finish.
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    results: Arc<dyn ResultStore>,
    artifacts: Arc<dyn ArtifactStore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            results,
            artifacts,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Submit an artifact for classification.
    ///
    /// Content-addressed submissions first consult the result store, then take
    /// a claim on the ID so that concurrent submitters of identical content
    /// put at most one job on the queue.
    #[instrument(skip_all, fields(kind = %artifact.kind, size = artifact.len()))]
    pub async fn submit(&self, artifact: &Artifact) -> Result<Submission, SubmitError> {
        match self.config.id_strategy {
            IdStrategy::Random => {
                if artifact.is_empty() {
                    return Err(InvalidArtifact::Empty.into());
                }
                let id = JobId::random(artifact.kind);
                self.enqueue(&id, artifact).await?;
                info!(job_id = %id, "job enqueued");
                Ok(Submission::Enqueued(id))
            }
            IdStrategy::ContentAddressed => self.submit_addressed(artifact).await,
        }
    }

    async fn submit_addressed(&self, artifact: &Artifact) -> Result<Submission, SubmitError> {
        let id = artifact.address()?;

        if let Some(cached) = self.cached(&id).await? {
            return Ok(cached);
        }

        if !self.results.claim(&id, self.config.claim_ttl).await? {
            debug!(job_id = %id, "identical job already in flight");
            return Ok(Submission::InFlight(id));
        }
        // From here on the claim is released on every exit except a
        // successful enqueue, including when this future is dropped.
        let claim = ClaimGuard::new(self.results.clone(), id.clone());

        // A worker may have published between the lookup and the claim.
        if let Some(cached) = self.cached(&id).await? {
            claim.release().await;
            return Ok(cached);
        }

        if let Err(e) = self.enqueue(&id, artifact).await {
            claim.release().await;
            warn!(job_id = %id, error = %e, "submission failed");
            return Err(e);
        }
        claim.keep();

        info!(job_id = %id, "job enqueued");
        Ok(Submission::Enqueued(id))
    }

    /// A stored record that makes re-dispatching unnecessary.
    async fn cached(&self, id: &JobId) -> Result<Option<Submission>, SubmitError> {
        match self.results.get(id).await? {
            Some(record) if record.is_failure() && self.config.retry_failed => {
                debug!(job_id = %id, "previous attempt failed, retrying");
                Ok(None)
            }
            Some(record) => {
                debug!(job_id = %id, "result already available");
                Ok(Some(Submission::Cached {
                    id: id.clone(),
                    record,
                }))
            }
            None => Ok(None),
        }
    }

    async fn enqueue(&self, id: &JobId, artifact: &Artifact) -> Result<(), SubmitError> {
        let artifact_ref = self.artifacts.put(id.as_str(), &artifact.bytes).await?;
        let job = JobDescriptor::new(id.clone(), artifact_ref);
        self.queue.enqueue(&job).await?;
        Ok(())
    }
}

// ── ClaimGuard ───────────────────────────────────────────────────────

/// An in-flight claim that is given back unless [`ClaimGuard::keep`] is
/// called. Dropping the guard (for example when the submitting future is
/// cancelled) releases the claim on a background task.
struct ClaimGuard {
    results: Arc<dyn ResultStore>,
    id: Option<JobId>,
}

impl ClaimGuard {
    fn new(results: Arc<dyn ResultStore>, id: JobId) -> Self {
        Self {
            results,
            id: Some(id),
        }
    }

    /// The job is on the queue; the worker's `put` clears the claim.
    fn keep(mut self) {
        self.id = None;
    }

    /// Release now. If this is itself cancelled, `Drop` still releases.
    async fn release(mut self) {
        if let Some(id) = &self.id {
            release_claim(&*self.results, id).await;
        }
        self.id = None;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let results = self.results.clone();
                handle.spawn(async move { release_claim(&*results, &id).await });
            }
            Err(_) => {
                warn!(job_id = %id, "no runtime to release claim, it expires after claim_ttl");
            }
        }
    }
}

async fn release_claim(results: &dyn ResultStore, id: &JobId) {
    if let Err(e) = results.release(id).await {
        // Still expires after claim_ttl.
        warn!(job_id = %id, error = %e, "failed to release claim");
    } else {
        debug!(job_id = %id, "claim released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use verdict_core::ArtifactKind;
    use verdict_queue::{MemoryQueue, QueueError, QueueHealth};
    use verdict_store::{MemoryArtifactStore, MemoryResultStore, StoreError};

    struct Fixture {
        queue: Arc<MemoryQueue>,
        results: Arc<MemoryResultStore>,
        artifacts: Arc<MemoryArtifactStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                queue: Arc::new(MemoryQueue::new()),
                results: Arc::new(MemoryResultStore::new()),
                artifacts: Arc::new(MemoryArtifactStore::new()),
            }
        }

        fn dispatcher(&self, config: DispatcherConfig) -> Dispatcher {
            Dispatcher::new(
                self.queue.clone(),
                self.results.clone(),
                self.artifacts.clone(),
                config,
            )
        }
    }

    fn jpg(bytes: &'static [u8]) -> Artifact {
        Artifact::new(bytes, ArtifactKind::Jpg)
    }

    /// Queue whose transport can be switched off.
    struct FlakyQueue {
        inner: MemoryQueue,
        down: AtomicBool,
    }

    #[async_trait]
    impl JobQueue for FlakyQueue {
        async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(QueueError::Unavailable("connection refused".into()));
            }
            self.inner.enqueue(job).await
        }

        async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
            self.inner.dequeue(timeout).await
        }

        async fn health_check(&self) -> Result<QueueHealth, QueueError> {
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn submit_returns_content_address_and_enqueues() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(DispatcherConfig::default());

        let submission = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        let expected = verdict_core::address(b"IMG_BYTES", "jpg").unwrap();
        assert_eq!(submission, Submission::Enqueued(expected.clone()));

        let job = fx.queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(job.id, expected);
        assert_eq!(job.artifact_ref, expected.as_str());
        assert_eq!(
            fx.artifacts.get(&job.artifact_ref).await.unwrap(),
            Bytes::from_static(b"IMG_BYTES")
        );
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_does_not_enqueue() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(DispatcherConfig::default());

        let first = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        let second = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        assert!(first.was_enqueued());
        assert_eq!(second, Submission::InFlight(first.id().clone()));
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn existing_result_short_circuits() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(DispatcherConfig::default());
        let id = verdict_core::address(b"IMG_BYTES", "jpg").unwrap();
        let record = ResultRecord::prediction("tabby_cat", 0.8734);
        fx.results.put(&id, &record).await.unwrap();

        let submission = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        assert_eq!(submission, Submission::Cached { id, record });
        assert!(fx.queue.is_empty().await);
        assert!(fx.artifacts.is_empty().await);
    }

    #[tokio::test]
    async fn failed_result_is_cached_unless_retry_enabled() {
        let fx = Fixture::new();
        let id = verdict_core::address(b"IMG_BYTES", "jpg").unwrap();
        fx.results.put(&id, &ResultRecord::failure("oom")).await.unwrap();

        let strict = fx.dispatcher(DispatcherConfig::default());
        assert!(matches!(
            strict.submit(&jpg(b"IMG_BYTES")).await.unwrap(),
            Submission::Cached { .. }
        ));

        let retrying = fx.dispatcher(DispatcherConfig {
            retry_failed: true,
            ..DispatcherConfig::default()
        });
        assert!(retrying.submit(&jpg(b"IMG_BYTES")).await.unwrap().was_enqueued());
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_submits_enqueue_once() {
        let fx = Fixture::new();
        let dispatcher = Arc::new(fx.dispatcher(DispatcherConfig::default()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        let mut enqueued = 0;
        for handle in handles {
            let submission = handle.await.unwrap();
            if submission.was_enqueued() {
                enqueued += 1;
            }
            ids.push(submission.into_id());
        }
        assert_eq!(enqueued, 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn random_ids_skip_dedupe() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(DispatcherConfig {
            id_strategy: IdStrategy::Random,
            ..DispatcherConfig::default()
        });
        let a = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        let b = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().ends_with(".jpg"));
        assert_eq!(fx.queue.len().await, 2);
    }

    #[tokio::test]
    async fn empty_artifact_is_rejected() {
        let fx = Fixture::new();
        for strategy in [IdStrategy::ContentAddressed, IdStrategy::Random] {
            let dispatcher = fx.dispatcher(DispatcherConfig {
                id_strategy: strategy,
                ..DispatcherConfig::default()
            });
            let err = dispatcher.submit(&jpg(b"")).await.unwrap_err();
            assert!(matches!(err, SubmitError::InvalidArtifact(InvalidArtifact::Empty)));
        }
        assert!(fx.queue.is_empty().await);
    }

    /// Artifact store whose first write stalls long enough to be cancelled.
    struct StallingArtifacts {
        inner: MemoryArtifactStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl ArtifactStore for StallingArtifacts {
        async fn put(&self, name: &str, bytes: &Bytes) -> Result<String, StoreError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.put(name, bytes).await
        }

        async fn get(&self, artifact_ref: &str) -> Result<Bytes, StoreError> {
            self.inner.get(artifact_ref).await
        }
    }

    #[tokio::test]
    async fn cancelled_submit_does_not_block_resubmission() {
        let queue = Arc::new(MemoryQueue::new());
        let results = Arc::new(MemoryResultStore::new());
        let dispatcher = Dispatcher::new(
            queue.clone(),
            results.clone(),
            Arc::new(StallingArtifacts {
                inner: MemoryArtifactStore::new(),
                stalled: AtomicBool::new(false),
            }),
            DispatcherConfig::default(),
        );

        // Caller gives up while the artifact is still being stored.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), dispatcher.submit(&jpg(b"IMG_BYTES")))
                .await;
        assert!(abandoned.is_err());
        assert!(queue.is_empty().await);

        // Let the background release run.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let retry = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        assert!(retry.was_enqueued(), "got {retry:?}");
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn successful_submit_keeps_its_claim() {
        let f = Fixture::new();
        let dispatcher = f.dispatcher(DispatcherConfig::default());
        dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let id = verdict_core::address(b"IMG_BYTES", "jpg").unwrap();
        assert!(!f.results.claim(&id, Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn queue_failure_is_surfaced_and_claim_released() {
        let results = Arc::new(MemoryResultStore::new());
        let queue = Arc::new(FlakyQueue {
            inner: MemoryQueue::new(),
            down: AtomicBool::new(true),
        });
        let dispatcher = Dispatcher::new(
            queue.clone(),
            results.clone(),
            Arc::new(MemoryArtifactStore::new()),
            DispatcherConfig::default(),
        );

        let err = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap_err();
        assert!(matches!(err, SubmitError::QueueUnavailable(_)));
        let id = verdict_core::address(b"IMG_BYTES", "jpg").unwrap();
        assert!(results.get(&id).await.unwrap().is_none());

        // Transport recovers: the retry is not mistaken for an in-flight duplicate.
        queue.down.store(false, Ordering::SeqCst);
        let retry = dispatcher.submit(&jpg(b"IMG_BYTES")).await.unwrap();
        assert_eq!(retry, Submission::Enqueued(id));
    }
}
