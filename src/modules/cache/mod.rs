pub mod domain;
pub mod infrastructure;
pub mod manager;

pub use domain::{keys, CacheBackend};
pub use infrastructure::{MemoryCache, MemoryCacheStats, RedisCache};
pub use manager::{CacheHealth, CacheManager, PrimaryTierStatus};
