use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub redis: RedisConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub poll: PollConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VERDICT_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VERDICT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            redis: RedisConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            worker: WorkerConfig::from_env_profiled(p),
            poll: PollConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  redis:    url={}, queue={}", self.redis.redacted_url(), self.redis.queue_key);
        tracing::info!("  results:  prefix={:?}, ttl={:?}", self.redis.result_prefix, self.redis.result_ttl());
        tracing::info!("  storage:  upload_dir={}", self.storage.upload_dir.display());
        tracing::info!(
            "  worker:   concurrency={}, classifier={}",
            self.worker.concurrency,
            self.worker.classifier_url.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  poll:     max_wait={:?}, interval={:?}",
            self.poll.max_wait(),
            self.poll.interval()
        );
    }
}

// ── Redis ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// List key used as the job queue.
    pub queue_key: String,
    /// Prefix prepended to correlation IDs for result keys.
    pub result_prefix: String,
    /// Result expiry in seconds (0 = never expire).
    pub result_ttl_secs: u64,
    /// How long a dispatcher's in-flight claim on an ID lives.
    pub claim_ttl_secs: u64,
}

impl RedisConfig {
    fn from_env_profiled(p: &str) -> Self {
        // REDIS_URL wins; otherwise assemble from the discrete host/port/db settings.
        let url = profiled_env_opt(p, "REDIS_URL").unwrap_or_else(|| {
            format!(
                "redis://{}:{}/{}",
                profiled_env_or(p, "REDIS_IP", "127.0.0.1"),
                profiled_env_parse::<u16>(p, "REDIS_PORT", 6379),
                profiled_env_parse::<u32>(p, "REDIS_DB_ID", 0),
            )
        });
        Self {
            url,
            queue_key: profiled_env_or(p, "REDIS_QUEUE", "service_queue"),
            result_prefix: profiled_env_or(p, "RESULT_KEY_PREFIX", ""),
            result_ttl_secs: profiled_env_parse(p, "RESULT_TTL_SECS", 0),
            claim_ttl_secs: profiled_env_parse(p, "CLAIM_TTL_SECS", 600),
        }
    }

    pub fn result_ttl(&self) -> Option<Duration> {
        (self.result_ttl_secs > 0).then(|| Duration::from_secs(self.result_ttl_secs))
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs.max(1))
    }

    /// URL with any password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***{}", &self.url[..scheme_end], &self.url[at..])
            }
            _ => self.url.clone(),
        }
    }
}

// ── Artifact storage ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            upload_dir: PathBuf::from(profiled_env_or(p, "UPLOAD_FOLDER", "uploads")),
        }
    }
}

// ── Worker pool ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub dequeue_timeout_ms: u64,
    pub classify_timeout_ms: u64,
    pub classifier_url: Option<String>,
    pub health_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl WorkerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            concurrency: profiled_env_parse(p, "WORKER_CONCURRENCY", 1),
            dequeue_timeout_ms: profiled_env_parse(p, "DEQUEUE_TIMEOUT_MS", 1_000),
            classify_timeout_ms: profiled_env_parse(p, "CLASSIFY_TIMEOUT_MS", 30_000),
            classifier_url: profiled_env_opt(p, "CLASSIFIER_URL"),
            health_interval_secs: profiled_env_parse(p, "WORKER_HEALTH_INTERVAL_SECS", 30),
            shutdown_timeout_secs: profiled_env_parse(p, "WORKER_SHUTDOWN_TIMEOUT_SECS", 10),
        }
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }
}

// ── Result polling ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub max_wait_ms: u64,
    pub interval_ms: u64,
    /// Multiplier applied to the interval after each miss (1.0 = fixed).
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
}

impl PollConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_wait_ms: profiled_env_parse(p, "POLL_MAX_WAIT_MS", 30_000),
            interval_ms: profiled_env_parse(p, "POLL_INTERVAL_MS", 100),
            backoff_factor: profiled_env_parse(p, "POLL_BACKOFF_FACTOR", 1.5),
            max_interval_ms: profiled_env_parse(p, "POLL_MAX_INTERVAL_MS", 2_000),
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}
