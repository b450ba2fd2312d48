/// Runtime configuration loaded from the environment
///
/// Values come from process environment variables, optionally seeded from a
/// `.env` file. Every field has a default so an empty environment is valid.
use crate::shared::errors::{AppError, AppResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What the scheduler does with a submission when every slot is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Keep the job Pending in a FIFO queue until a slot frees up
    #[default]
    Queue,
    /// Refuse the submission outright
    Reject,
}

impl FromStr for AdmissionPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(AdmissionPolicy::Queue),
            "reject" => Ok(AdmissionPolicy::Reject),
            other => Err(AppError::ValidationError(format!(
                "Invalid admission policy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub max_concurrent_jobs: usize,
    pub cache_ttl: Duration,
    pub recent_frames_ttl: Duration,
    pub max_cache_size_mb: u64,
    pub cache_retry_cooldown: Duration,
    pub cache_sweep_interval: Duration,
    pub cache_op_timeout: Duration,
    /// `None` runs with the local fallback tier only
    pub redis_url: Option<String>,
    pub frames_base_path: PathBuf,
    pub admission_policy: AdmissionPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            cache_ttl: Duration::from_secs(3600),
            recent_frames_ttl: Duration::from_secs(300),
            max_cache_size_mb: 100,
            cache_retry_cooldown: Duration::from_secs(30),
            cache_sweep_interval: Duration::from_secs(60),
            cache_op_timeout: Duration::from_millis(500),
            redis_url: None,
            frames_base_path: PathBuf::from("runtime/frames"),
            admission_policy: AdmissionPolicy::Queue,
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env` (if present) and the process environment
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_concurrent_jobs =
            parse_or(&lookup, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?;
        if max_concurrent_jobs == 0 {
            return Err(AppError::ValidationError(
                "MAX_CONCURRENT_JOBS must be at least 1".to_string(),
            ));
        }

        let cache_ttl = Duration::from_secs(parse_or(
            &lookup,
            "CACHE_TTL",
            defaults.cache_ttl.as_secs(),
        )?);
        let recent_frames_ttl = Duration::from_secs(parse_or(
            &lookup,
            "RECENT_FRAMES_TTL",
            defaults.recent_frames_ttl.as_secs(),
        )?)
        .min(cache_ttl);

        let redis_url = match lookup("REDIS_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(url),
            None => match lookup("REDIS_HOST").filter(|host| !host.trim().is_empty()) {
                Some(host) => {
                    let port: u16 = parse_or(&lookup, "REDIS_PORT", 6379)?;
                    let db: u32 = parse_or(&lookup, "REDIS_DB", 0)?;
                    Some(format!("redis://{}:{}/{}", host, port, db))
                }
                None => None,
            },
        };

        let admission_policy = match lookup("ADMISSION_POLICY") {
            Some(value) => value.parse()?,
            None => defaults.admission_policy,
        };

        Ok(Self {
            max_concurrent_jobs,
            cache_ttl,
            recent_frames_ttl,
            max_cache_size_mb: parse_or(&lookup, "MAX_CACHE_SIZE_MB", defaults.max_cache_size_mb)?,
            cache_retry_cooldown: Duration::from_secs(parse_or(
                &lookup,
                "CACHE_RETRY_COOLDOWN",
                defaults.cache_retry_cooldown.as_secs(),
            )?),
            cache_sweep_interval: Duration::from_secs(
                parse_or(
                    &lookup,
                    "CACHE_SWEEP_INTERVAL",
                    defaults.cache_sweep_interval.as_secs(),
                )?
                .max(1),
            ),
            cache_op_timeout: Duration::from_millis(parse_or(
                &lookup,
                "CACHE_OP_TIMEOUT_MS",
                defaults.cache_op_timeout.as_millis() as u64,
            )?),
            redis_url,
            frames_base_path: lookup("FRAMES_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.frames_base_path),
            admission_policy,
        })
    }

    /// Fallback tier budget in bytes
    pub fn max_cache_bytes(&self) -> usize {
        (self.max_cache_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            AppError::ValidationError(format!("Invalid value for {}: '{}' ({})", key, raw, e))
        }),
        None => Ok(default),
    }
}
