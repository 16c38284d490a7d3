//! Submit through the dispatcher, process with a worker pool, read back
//! through the poller. All backends are in-memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use verdict_core::{address, Artifact, ArtifactKind, ResultRecord};
use verdict_dispatch::{Dispatcher, DispatcherConfig, PollError, PollPolicy, Poller, Submission};
use verdict_queue::MemoryQueue;
use verdict_store::{MemoryArtifactStore, MemoryResultStore, ResultStore};
use verdict_worker::{Classification, Classifier, ClassifyError, WorkerPool, WorkerPoolBuilder};

/// Answers based on the artifact's bytes.
struct ScriptedClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, artifact: &Artifact) -> Result<Classification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &artifact.bytes[..] {
            b"IMG_BYTES" => Ok(Classification::new("tabby_cat", 0.8734)),
            b"CORRUPT" => {
                // Give a concurrent poller time to start waiting.
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(ClassifyError::Failed("cannot decode image".into()))
            }
            b"TOO_SURE" => Ok(Classification::new("tabby_cat", 1.5)),
            b"NEGATIVE" => Ok(Classification::new("tabby_cat", -0.2)),
            _ => Ok(Classification::new("unknown", 0.1)),
        }
    }
}

struct Harness {
    queue: Arc<MemoryQueue>,
    results: Arc<MemoryResultStore>,
    dispatcher: Dispatcher,
    poller: Poller,
    classifier: Arc<ScriptedClassifier>,
    cancel: CancellationToken,
    pool: tokio::task::JoinHandle<verdict_worker::StatsSnapshot>,
}

impl Harness {
    fn start(concurrency: usize) -> Self {
        let queue = Arc::new(MemoryQueue::new());
        let results = Arc::new(MemoryResultStore::new());
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let classifier = Arc::new(ScriptedClassifier {
            calls: AtomicUsize::new(0),
        });

        let dispatcher = Dispatcher::new(
            queue.clone(),
            results.clone(),
            artifacts.clone(),
            DispatcherConfig::default(),
        );
        let poller = Poller::new(results.clone());

        let pool: WorkerPool = WorkerPoolBuilder::new("e2e")
            .concurrency(concurrency)
            .dequeue_timeout(Duration::from_millis(20))
            .classify_timeout(Duration::from_secs(2))
            .health_interval(Duration::ZERO)
            .shutdown_timeout(Duration::from_secs(2))
            .handle_signals(false)
            .build(queue.clone(), results.clone(), artifacts, classifier.clone());

        let cancel = CancellationToken::new();
        let pool = tokio::spawn(pool.run(cancel.clone()));

        Self {
            queue,
            results,
            dispatcher,
            poller,
            classifier,
            cancel,
            pool,
        }
    }

    async fn submit_and_wait(&self, bytes: &'static [u8], kind: ArtifactKind) -> ResultRecord {
        let submission = self
            .dispatcher
            .submit(&Artifact::new(bytes, kind))
            .await
            .unwrap();
        self.poller
            .await_result(submission.id(), &policy(), &CancellationToken::new())
            .await
            .unwrap()
    }

    async fn stop(self) -> verdict_worker::StatsSnapshot {
        self.cancel.cancel();
        self.pool.await.unwrap()
    }
}

fn policy() -> PollPolicy {
    PollPolicy::new(Duration::from_secs(5), Duration::from_millis(10))
}

#[tokio::test]
async fn image_is_classified_and_published_under_its_address() {
    let h = Harness::start(2);

    let submission = h
        .dispatcher
        .submit(&Artifact::new(&b"IMG_BYTES"[..], ArtifactKind::Jpg))
        .await
        .unwrap();
    let expected_id = address(b"IMG_BYTES", "jpg").unwrap();
    assert_eq!(submission, Submission::Enqueued(expected_id.clone()));

    let record = h
        .poller
        .await_result(&expected_id, &policy(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record, ResultRecord::prediction("tabby_cat", 0.8734));
    assert_eq!(h.results.get(&expected_id).await.unwrap(), Some(record));

    let stats = h.stop().await;
    assert_eq!(stats.processed, 1);
}

#[tokio::test]
async fn resubmitting_identical_content_reuses_the_result() {
    let h = Harness::start(1);

    let first = h.submit_and_wait(b"IMG_BYTES", ArtifactKind::Jpg).await;
    let again = h
        .dispatcher
        .submit(&Artifact::new(&b"IMG_BYTES"[..], ArtifactKind::Jpg))
        .await
        .unwrap();

    assert!(matches!(again, Submission::Cached { ref record, .. } if *record == first));
    assert!(h.queue.is_empty().await);
    assert_eq!(h.classifier.calls.load(Ordering::SeqCst), 1);
    h.stop().await;
}

#[tokio::test]
async fn classifier_failure_reaches_a_waiting_poller_and_the_pool_survives() {
    let h = Harness::start(1);

    let bad = h
        .dispatcher
        .submit(&Artifact::new(&b"CORRUPT"[..], ArtifactKind::Png))
        .await
        .unwrap();

    // Poll concurrently with processing.
    let record = h
        .poller
        .await_result(bad.id(), &policy(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(record.is_failure());
    assert!(record.error().unwrap().contains("cannot decode image"));

    // The same pool still handles the next job.
    let good = h.submit_and_wait(b"IMG_BYTES", ArtifactKind::Jpg).await;
    assert_eq!(good, ResultRecord::prediction("tabby_cat", 0.8734));

    let stats = h.stop().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processed, 1);
}

#[tokio::test]
async fn out_of_range_confidence_is_never_stored_as_a_prediction() {
    let h = Harness::start(2);

    for bytes in [&b"TOO_SURE"[..], &b"NEGATIVE"[..]] {
        let record = h.submit_and_wait(bytes, ArtifactKind::Gif).await;
        assert!(record.as_prediction().is_none(), "stored {record:?}");
        assert!(record.error().unwrap().contains("confidence"));
    }

    let stats = h.stop().await;
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.processed, 0);
}

#[tokio::test]
async fn malformed_queue_entry_does_not_stall_the_pool() {
    let h = Harness::start(1);

    h.queue.push_raw("{not json").await;
    h.queue
        .push_raw(r#"{"id":"deadbeef.png","artifact_ref":42}"#)
        .await;

    let record = h
        .poller
        .await_result(&"deadbeef.png".into(), &policy(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(record.error().unwrap().contains("malformed payload"));

    let good = h.submit_and_wait(b"IMG_BYTES", ArtifactKind::Jpg).await;
    assert!(good.as_prediction().is_some());

    let stats = h.stop().await;
    assert_eq!(stats.malformed, 2);
}

#[tokio::test]
async fn poll_for_unknown_id_times_out_without_a_worker_result() {
    let h = Harness::start(1);

    let err = h
        .poller
        .await_result(
            &"never-submitted.png".into(),
            &PollPolicy::new(Duration::from_millis(50), Duration::from_millis(10)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::Timeout(_)));
    h.stop().await;
}

#[tokio::test]
async fn stopping_the_pool_finishes_promptly() {
    let h = Harness::start(4);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(3), h.stop()).await;
    let stats = stopped.expect("pool did not stop");
    assert_eq!(stats, verdict_worker::StatsSnapshot::default());
}
