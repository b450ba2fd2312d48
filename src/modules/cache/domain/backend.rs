use crate::shared::errors::AppResult;
use async_trait::async_trait;
use std::time::Duration;

/// Capability shared by both cache tiers.
///
/// Every operation fails closed: an unreachable backend returns
/// `AppError::CacheError` instead of panicking, so the manager can fall back.
/// Values are opaque strings (JSON produced by the manager).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Short name used in log lines
    fn name(&self) -> &'static str;
}
