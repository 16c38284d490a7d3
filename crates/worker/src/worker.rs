//! The consumer loop: dequeue a job, classify it once, publish the outcome.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use verdict_core::job::is_valid_score;
use verdict_core::{Artifact, ArtifactKind, Backoff, JobDescriptor, JobId, PayloadError, ResultRecord};
use verdict_queue::{JobQueue, QueueError};
use verdict_store::{ArtifactStore, ResultStore, StoreError};

use crate::classifier::{Classification, Classifier};
use crate::error::{ClassifyError, JobError};

/// Shortest blocking wait on the queue; a zero wait would spin.
const MIN_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// First sleep after a queue transport error.
const ERROR_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Longest sleep between retries of a failing queue.
const ERROR_BACKOFF_MAX: Duration = Duration::from_secs(30);

// ── State and counters ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Processing,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerState::Processing,
            _ => WorkerState::Idle,
        }
    }
}

/// Running totals, shared by every loop of a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Jobs that produced a prediction.
    pub processed: u64,
    /// Jobs that produced an error record.
    pub failed: u64,
    /// Queue payloads that could not be decoded.
    pub malformed: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} failed={} malformed={}",
            self.processed, self.failed, self.malformed
        )
    }
}

// ── WorkerLoop ───────────────────────────────────────────────────────

pub struct WorkerLoop {
    name: String,
    queue: Arc<dyn JobQueue>,
    results: Arc<dyn ResultStore>,
    artifacts: Arc<dyn ArtifactStore>,
    classifier: Arc<dyn Classifier>,
    dequeue_timeout: Duration,
    classify_timeout: Duration,
    state: AtomicU8,
    stats: Arc<WorkerStats>,
}

impl WorkerLoop {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
        artifacts: Arc<dyn ArtifactStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            results,
            artifacts,
            classifier,
            dequeue_timeout: Duration::from_secs(1),
            classify_timeout: Duration::from_secs(30),
            state: AtomicU8::new(WorkerState::Idle as u8),
            stats: Arc::new(WorkerStats::new()),
        }
    }

    /// How long one `dequeue` may block before the loop re-checks for shutdown.
    pub fn dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout.max(MIN_DEQUEUE_TIMEOUT);
        self
    }

    /// Upper bound on a single classifier call.
    pub fn classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    /// Report into `stats` instead of a private counter set.
    pub fn with_stats(mut self, stats: Arc<WorkerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Consume jobs until `cancel` fires.
    ///
    /// The token is checked between iterations only. A job that has been
    /// dequeued is always finished and published before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker = %self.name, dequeue_timeout = ?self.dequeue_timeout, "worker loop started");

        let backoff = Backoff::exponential(2.0, ERROR_BACKOFF_MAX);
        let mut consecutive_errors: u32 = 0;
        let mut error_delay = ERROR_BACKOFF_BASE;

        while !cancel.is_cancelled() {
            self.set_state(WorkerState::Idle);

            match self.queue.dequeue(self.dequeue_timeout).await {
                Ok(Some(job)) => {
                    consecutive_errors = 0;
                    self.set_state(WorkerState::Processing);
                    if let Err(e) = self.process(&job).await {
                        error!(worker = %self.name, job_id = %job.id, error = %e, "failed to publish result");
                    }
                }
                Ok(None) => {
                    consecutive_errors = 0;
                }
                Err(QueueError::Malformed(payload)) => {
                    consecutive_errors = 0;
                    self.reject_malformed(payload).await;
                }
                Err(e) => {
                    if consecutive_errors == 0 {
                        error_delay = ERROR_BACKOFF_BASE;
                    } else {
                        error_delay = backoff.next(error_delay);
                    }
                    consecutive_errors += 1;
                    warn!(
                        worker = %self.name,
                        error = %e,
                        consecutive_errors,
                        retry_in = ?error_delay,
                        "queue dequeue failed"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(error_delay) => {}
                    }
                }
            }
        }

        self.set_state(WorkerState::Idle);
        info!(worker = %self.name, stats = %self.stats.snapshot(), "worker loop stopped");
    }

    /// Handle one job end to end and publish its record.
    ///
    /// Classification problems become an error record; only a failure to
    /// write the record is returned.
    #[instrument(skip(self, job), fields(worker = %self.name, job_id = %job.id))]
    pub async fn process(&self, job: &JobDescriptor) -> Result<ResultRecord, StoreError> {
        let waited = Utc::now().signed_duration_since(job.submitted_at);
        debug!(queued_ms = waited.num_milliseconds(), "job picked up");

        let record = match self.evaluate(job).await {
            Ok(c) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                let record = ResultRecord::prediction(c.label, c.confidence);
                info!(result = %record, "job classified");
                record
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                match &e {
                    JobError::Classify(ClassifyError::InvalidConfidence(v)) => {
                        warn!(confidence = v, "classifier returned out-of-range confidence")
                    }
                    _ => warn!(error = %e, "job failed"),
                }
                ResultRecord::failure(e.to_string())
            }
        };

        self.results.put(&job.id, &record).await?;
        Ok(record)
    }

    async fn evaluate(&self, job: &JobDescriptor) -> Result<Classification, JobError> {
        let kind = ArtifactKind::from_filename(&job.artifact_ref)
            .or_else(|_| ArtifactKind::from_filename(job.id.as_str()))?;
        let bytes = self.artifacts.get(&job.artifact_ref).await?;
        let artifact = Artifact::new(bytes, kind);

        let c = self.classify(artifact).await?;
        if !is_valid_score(c.confidence) {
            return Err(ClassifyError::InvalidConfidence(c.confidence).into());
        }
        Ok(c)
    }

    /// Run the classifier exactly once on its own task so a panic or an
    /// overrun cannot take the loop down with it.
    async fn classify(&self, artifact: Artifact) -> Result<Classification, ClassifyError> {
        let classifier = self.classifier.clone();
        let mut handle = tokio::spawn(async move { classifier.classify(&artifact).await });

        match tokio::time::timeout(self.classify_timeout, &mut handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join)) if join.is_panic() => Err(ClassifyError::Panicked),
            Ok(Err(join)) => Err(ClassifyError::Failed(format!("classifier task ended: {join}"))),
            Err(_) => {
                handle.abort();
                Err(ClassifyError::Timeout(self.classify_timeout))
            }
        }
    }

    async fn reject_malformed(&self, payload: PayloadError) {
        self.stats.malformed.fetch_add(1, Ordering::Relaxed);
        warn!(worker = %self.name, job_id = ?payload.id, error = %payload, "discarding malformed job");

        let Some(id) = payload.id.clone() else {
            return;
        };
        let id = JobId::from(id);
        let record = ResultRecord::failure(payload.to_string());
        if let Err(e) = self.results.put(&id, &record).await {
            error!(worker = %self.name, job_id = %id, error = %e, "failed to publish error record");
        }
    }
}
