//! Worker pool lifecycle.
//!
//! [`WorkerPoolBuilder`] collects the knobs, [`WorkerPool::run`] spawns one
//! [`WorkerLoop`] per concurrency slot and keeps them running with periodic
//! health lines until SIGINT/SIGTERM or the caller's token asks them to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use verdict_core::config::WorkerConfig;
use verdict_queue::JobQueue;
use verdict_store::{ArtifactStore, ResultStore};

use crate::classifier::Classifier;
use crate::worker::{StatsSnapshot, WorkerLoop, WorkerState, WorkerStats};

// ── WorkerPoolBuilder ────────────────────────────────────────────────

pub struct WorkerPoolBuilder {
    name: String,
    concurrency: usize,
    dequeue_timeout: Duration,
    classify_timeout: Duration,
    health_interval: Duration,
    shutdown_timeout: Duration,
    handle_signals: bool,
}

impl WorkerPoolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            concurrency: 1,
            dequeue_timeout: Duration::from_secs(1),
            classify_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            handle_signals: true,
        }
    }

    /// Seed every knob from the `worker` config section.
    pub fn from_config(name: impl Into<String>, cfg: &WorkerConfig) -> Self {
        Self::new(name)
            .concurrency(cfg.concurrency)
            .dequeue_timeout(cfg.dequeue_timeout())
            .classify_timeout(cfg.classify_timeout())
            .health_interval(Duration::from_secs(cfg.health_interval_secs))
            .shutdown_timeout(Duration::from_secs(cfg.shutdown_timeout_secs))
    }

    /// Number of loops (default: 1, minimum: 1).
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    /// Interval between health log lines (default: 30s, zero disables).
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// How long loops get to finish their current job once stopping (default: 10s).
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Also stop on SIGINT/SIGTERM (default: true).
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn build(
        self,
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
        artifacts: Arc<dyn ArtifactStore>,
        classifier: Arc<dyn Classifier>,
    ) -> WorkerPool {
        let stats = Arc::new(WorkerStats::new());
        let loops = (0..self.concurrency)
            .map(|i| {
                Arc::new(
                    WorkerLoop::new(
                        format!("{}-{}", self.name, i),
                        queue.clone(),
                        results.clone(),
                        artifacts.clone(),
                        classifier.clone(),
                    )
                    .dequeue_timeout(self.dequeue_timeout)
                    .classify_timeout(self.classify_timeout)
                    .with_stats(stats.clone()),
                )
            })
            .collect();

        WorkerPool {
            name: self.name,
            loops,
            stats,
            queue,
            health_interval: self.health_interval,
            shutdown_timeout: self.shutdown_timeout,
            handle_signals: self.handle_signals,
        }
    }
}

// ── WorkerPool ───────────────────────────────────────────────────────

pub struct WorkerPool {
    name: String,
    loops: Vec<Arc<WorkerLoop>>,
    stats: Arc<WorkerStats>,
    queue: Arc<dyn JobQueue>,
    health_interval: Duration,
    shutdown_timeout: Duration,
    handle_signals: bool,
}

impl WorkerPool {
    pub fn size(&self) -> usize {
        self.loops.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of loops currently working on a job.
    pub fn busy(&self) -> usize {
        busy_count(&self.loops)
    }

    /// Run every loop until `cancel` fires (or a signal arrives), then give
    /// in-flight jobs `shutdown_timeout` to finish. Returns the final totals.
    pub async fn run(self, cancel: CancellationToken) -> StatsSnapshot {
        info!(pool = %self.name, size = self.loops.len(), "starting worker pool");

        let shutdown = cancel.child_token();
        let mut set = JoinSet::new();
        for worker in &self.loops {
            let worker = worker.clone();
            let token = shutdown.clone();
            set.spawn(async move { worker.run(token).await });
        }

        let health_handle = (!self.health_interval.is_zero()).then(|| {
            let loops = self.loops.clone();
            let stats = self.stats.clone();
            let queue = self.queue.clone();
            let name = self.name.clone();
            let interval = self.health_interval;
            let token = shutdown.clone();
            tokio::spawn(async move {
                health_loop(&name, &loops, &stats, &*queue, interval, &token).await;
            })
        });

        let signal_handle = self.handle_signals.then(|| {
            let token = shutdown.clone();
            let name = self.name.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = os_signal() => {
                        info!(pool = %name, "shutdown signal received");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        shutdown.cancelled().await;

        if let Some(h) = health_handle {
            h.abort();
        }
        if let Some(h) = signal_handle {
            h.abort();
        }

        info!(
            pool = %self.name,
            busy = self.busy(),
            timeout = ?self.shutdown_timeout,
            "stopping worker pool"
        );
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    warn!(pool = %self.name, error = %e, "worker task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(pool = %self.name, "worker pool drain timed out, aborting remaining loops");
            set.abort_all();
        }

        let totals = self.stats.snapshot();
        info!(pool = %self.name, stats = %totals, "worker pool shutdown complete");
        totals
    }
}

fn busy_count(loops: &[Arc<WorkerLoop>]) -> usize {
    loops
        .iter()
        .filter(|w| w.state() == WorkerState::Processing)
        .count()
}

/// Log pool totals and queue health until shutdown.
async fn health_loop(
    name: &str,
    loops: &[Arc<WorkerLoop>],
    stats: &WorkerStats,
    queue: &dyn JobQueue,
    interval: Duration,
    shutdown: &CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the immediate first tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let busy = busy_count(loops);
                match queue.health_check().await {
                    Ok(health) => info!(
                        pool = %name,
                        busy,
                        stats = %stats.snapshot(),
                        queue = %health,
                        "worker pool health"
                    ),
                    Err(e) => warn!(
                        pool = %name,
                        busy,
                        stats = %stats.snapshot(),
                        error = %e,
                        "worker pool health: queue unreachable"
                    ),
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere. If the handlers
/// cannot be installed this never resolves and only the token stops the pool.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(i), Ok(t)) => (i, t),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "failed to register signal handlers");
                    return std::future::pending().await;
                }
            };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    }
}
