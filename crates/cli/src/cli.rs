use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator tool for the verdict classification queue.
///
/// Connection settings come from the environment (and `.env`); flags
/// override individual values.
#[derive(Parser, Debug)]
#[command(name = "verdict", version, about)]
pub struct CliArgs {
    /// Redis URL (overrides REDIS_URL / REDIS_IP+REDIS_PORT+REDIS_DB_ID).
    #[arg(long, global = true)]
    pub redis_url: Option<String>,

    /// Redis list used as the job queue.
    #[arg(long, global = true)]
    pub queue: Option<String>,

    /// Directory holding uploaded artifacts.
    #[arg(long, global = true)]
    pub upload_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a worker pool until SIGINT/SIGTERM.
    Worker {
        /// Number of concurrent worker loops.
        #[arg(long, short = 'c')]
        concurrency: Option<usize>,

        /// Model-serving endpoint the artifacts are posted to.
        #[arg(long, env = "CLASSIFIER_URL")]
        classifier_url: Option<String>,
    },

    /// Submit an image and print its job ID.
    Submit {
        /// Image file (png, jpg, jpeg or gif).
        file: PathBuf,

        /// Wait for the result and print it.
        #[arg(long)]
        wait: bool,

        /// Use a random job ID instead of the content address.
        #[arg(long)]
        random_id: bool,

        /// Re-dispatch content whose stored result is an error record.
        #[arg(long)]
        retry_failed: bool,

        /// Give up waiting after this many milliseconds.
        #[arg(long)]
        max_wait_ms: Option<u64>,
    },

    /// Wait for the result of a job ID.
    Result {
        id: String,

        /// Give up waiting after this many milliseconds (0 = look once).
        #[arg(long)]
        max_wait_ms: Option<u64>,
    },

    /// Show queue connectivity and depth.
    Health,
}
