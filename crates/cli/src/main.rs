mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use verdict_core::config::{load_dotenv, Config};
use verdict_core::{Artifact, ArtifactKind, JobId, ResultRecord};
use verdict_dispatch::{Dispatcher, DispatcherConfig, IdStrategy, PollError, PollPolicy, Poller};
use verdict_queue::{JobQueue, RedisQueue};
use verdict_store::{LocalArtifactStore, RedisResultStore, ResultStore};
use verdict_worker::{HttpClassifier, WorkerPoolBuilder};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = Config::from_env();
    if let Some(url) = args.redis_url {
        config.redis.url = url;
    }
    if let Some(queue) = args.queue {
        config.redis.queue_key = queue;
    }
    if let Some(dir) = args.upload_dir {
        config.storage.upload_dir = dir;
    }

    match args.command {
        Command::Worker {
            concurrency,
            classifier_url,
        } => run_worker(config, concurrency, classifier_url).await,
        Command::Submit {
            file,
            wait,
            random_id,
            retry_failed,
            max_wait_ms,
        } => {
            let dispatcher_config = DispatcherConfig {
                id_strategy: if random_id {
                    IdStrategy::Random
                } else {
                    IdStrategy::ContentAddressed
                },
                claim_ttl: config.redis.claim_ttl(),
                retry_failed,
            };
            submit(&config, &file, dispatcher_config, wait, max_wait_ms).await
        }
        Command::Result { id, max_wait_ms } => {
            let results = connect_results(&config).await?;
            let record = wait_for(results, &JobId::from(id), &config, max_wait_ms).await?;
            print_record(&record)
        }
        Command::Health => {
            let queue = connect_queue(&config).await?;
            let health = queue.health_check().await?;
            println!("{health}");
            if !health.connected {
                bail!("queue is not reachable");
            }
            Ok(())
        }
    }
}

/// Loads `.env` and builds the log filter from `RUST_LOG` (default `info`),
/// so a `RUST_LOG` kept in `.env` applies to startup logging too.
fn log_filter() -> EnvFilter {
    load_dotenv();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

// ── Backends ─────────────────────────────────────────────────────────

async fn connect_queue(config: &Config) -> Result<Arc<RedisQueue>> {
    let queue = RedisQueue::connect(&config.redis.url, config.redis.queue_key.clone())
        .await
        .with_context(|| format!("failed to connect queue at {}", config.redis.redacted_url()))?;
    Ok(Arc::new(queue))
}

async fn connect_results(config: &Config) -> Result<Arc<RedisResultStore>> {
    let store = RedisResultStore::connect(
        &config.redis.url,
        config.redis.result_prefix.clone(),
        config.redis.result_ttl(),
    )
    .await
    .with_context(|| {
        format!(
            "failed to connect result store at {}",
            config.redis.redacted_url()
        )
    })?;
    Ok(Arc::new(store))
}

async fn open_artifacts(config: &Config) -> Result<Arc<LocalArtifactStore>> {
    let store = LocalArtifactStore::open(&config.storage.upload_dir)
        .await
        .with_context(|| {
            format!(
                "failed to open upload directory {}",
                config.storage.upload_dir.display()
            )
        })?;
    Ok(Arc::new(store))
}

// ── Commands ─────────────────────────────────────────────────────────

async fn run_worker(
    config: Config,
    concurrency: Option<usize>,
    classifier_url: Option<String>,
) -> Result<()> {
    config.log_summary();

    let Some(url) = classifier_url.or_else(|| config.worker.classifier_url.clone()) else {
        bail!("no classifier endpoint configured (set CLASSIFIER_URL or --classifier-url)");
    };

    let queue = connect_queue(&config).await?;
    let results = connect_results(&config).await?;
    let artifacts = open_artifacts(&config).await?;
    let classifier = Arc::new(HttpClassifier::new(url));

    let mut builder = WorkerPoolBuilder::from_config("verdict-worker", &config.worker);
    if let Some(n) = concurrency {
        builder = builder.concurrency(n);
    }
    let pool = builder.build(queue, results, artifacts, classifier);

    let totals = pool.run(CancellationToken::new()).await;
    info!(stats = %totals, "verdict worker exited cleanly");
    Ok(())
}

async fn submit(
    config: &Config,
    file: &Path,
    dispatcher_config: DispatcherConfig,
    wait: bool,
    max_wait_ms: Option<u64>,
) -> Result<()> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", file.display()))?;
    let kind = ArtifactKind::from_filename(name)?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let queue = connect_queue(config).await?;
    let results = connect_results(config).await?;
    let artifacts = open_artifacts(config).await?;

    let dispatcher = Dispatcher::new(queue, results.clone(), artifacts, dispatcher_config);
    let submission = dispatcher.submit(&Artifact::new(bytes, kind)).await?;
    info!(job_id = %submission.id(), enqueued = submission.was_enqueued(), "submitted");
    println!("{}", submission.id());

    if wait {
        let record = wait_for(results, submission.id(), config, max_wait_ms).await?;
        print_record(&record)?;
    }
    Ok(())
}

/// Poll for `id`, stopping early on Ctrl+C.
async fn wait_for(
    results: Arc<dyn ResultStore>,
    id: &JobId,
    config: &Config,
    max_wait_ms: Option<u64>,
) -> Result<ResultRecord> {
    let mut policy = PollPolicy::from_config(&config.poll);
    if let Some(ms) = max_wait_ms {
        policy.max_wait = Duration::from_millis(ms);
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let poller = Poller::new(results);
    match poller.await_result(id, &policy, &cancel).await {
        Ok(record) => Ok(record),
        Err(PollError::Timeout(waited)) => {
            bail!("job {id} is still processing after {waited:?}")
        }
        Err(e) => Err(e.into()),
    }
}

fn print_record(record: &ResultRecord) -> Result<()> {
    println!("{}", serde_json::to_string(record)?);
    if let Some(reason) = record.error() {
        bail!("job failed: {reason}");
    }
    Ok(())
}
