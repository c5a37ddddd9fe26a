pub mod config;
pub mod types;

pub use config::{CacheConfig, CorruptCachePolicy, KilnConfig};
pub use types::*;
