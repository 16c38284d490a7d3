//! Consumer side of the job protocol: worker loops, the classifier seam
//! and the pool that runs them.

pub mod classifier;
pub mod error;
pub mod http;
pub mod pool;
pub mod worker;

pub use classifier::{Classification, Classifier};
pub use error::{ClassifyError, JobError};
pub use http::HttpClassifier;
pub use pool::{WorkerPool, WorkerPoolBuilder};
pub use worker::{StatsSnapshot, WorkerLoop, WorkerState, WorkerStats};
