pub mod artifact;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod results;

pub use artifact::{ArtifactStore, LocalArtifactStore, MemoryArtifactStore};
pub use error::StoreError;
pub use memory::MemoryResultStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisResultStore;
pub use results::ResultStore;
