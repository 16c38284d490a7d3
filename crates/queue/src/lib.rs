pub mod error;
pub mod memory;
pub mod parser;
pub mod queue;
#[cfg(feature = "redis")]
pub mod redis;

pub use error::QueueError;
pub use memory::MemoryQueue;
pub use parser::{encode_job, parse_job};
pub use queue::{JobQueue, QueueHealth};
#[cfg(feature = "redis")]
pub use self::redis::RedisQueue;
