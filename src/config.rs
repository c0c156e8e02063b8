//! Configuration Module
//!
//! Handles loading and validating cache and resilience settings from
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, VeloxError};

/// Reads an environment variable and parses it, returning None when unset or invalid.
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Reads a millisecond duration from the environment.
fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

// == Cache Config ==
/// Settings shared by the in-memory and persistent cache tiers.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory
    pub max_size: usize,
    /// TTL applied when a write does not carry its own
    pub default_ttl: Duration,
    /// How long past expiry a value may still be served by `get_stale`
    pub stale_tolerance: Duration,
    /// TTL written into persistent-tier envelopes
    pub l2_ttl: Duration,
    /// Namespace prefix for persistent-tier keys
    pub l2_prefix: String,
    /// Interval of the background expiry sweeper
    pub cleanup_interval: Duration,
}

impl CacheConfig {
    /// Loads cache settings from the environment.
    ///
    /// # Environment Variables
    /// - `VELOX_CACHE_MAX_SIZE` - Maximum in-memory entries (default: 100)
    /// - `VELOX_CACHE_DEFAULT_TTL_MS` - Default TTL (default: 300000)
    /// - `VELOX_CACHE_STALE_TOLERANCE_MS` - Stale window (default: 60000)
    /// - `VELOX_CACHE_L2_TTL_MS` - Persistent TTL (default: 3600000)
    /// - `VELOX_CACHE_L2_PREFIX` - Persistent key prefix (default: `velox_cache_`)
    /// - `VELOX_CACHE_CLEANUP_INTERVAL_MS` - Sweeper interval (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: env_parse("VELOX_CACHE_MAX_SIZE").unwrap_or(defaults.max_size),
            default_ttl: env_millis("VELOX_CACHE_DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl),
            stale_tolerance: env_millis("VELOX_CACHE_STALE_TOLERANCE_MS")
                .unwrap_or(defaults.stale_tolerance),
            l2_ttl: env_millis("VELOX_CACHE_L2_TTL_MS").unwrap_or(defaults.l2_ttl),
            l2_prefix: env::var("VELOX_CACHE_L2_PREFIX").unwrap_or(defaults.l2_prefix),
            cleanup_interval: env_millis("VELOX_CACHE_CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    /// Rejects a non-positive capacity or sweep interval.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(VeloxError::InvalidConfig(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(VeloxError::InvalidConfig(
                "cleanup_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl: Duration::from_secs(300),
            stale_tolerance: Duration::from_secs(60),
            l2_ttl: Duration::from_secs(3600),
            l2_prefix: "velox_cache_".to_string(),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

// == Breaker Config ==
/// Circuit breaker thresholds.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures in the closed state that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before allowing probes
    pub recovery_timeout: Duration,
    /// Successful probes needed to close from half-open
    pub half_open_max_attempts: u32,
}

impl BreakerConfig {
    /// Loads breaker settings from the environment.
    ///
    /// # Environment Variables
    /// - `VELOX_BREAKER_FAILURE_THRESHOLD` (default: 5)
    /// - `VELOX_BREAKER_RECOVERY_TIMEOUT_MS` (default: 30000)
    /// - `VELOX_BREAKER_HALF_OPEN_MAX_ATTEMPTS` (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            failure_threshold: env_parse("VELOX_BREAKER_FAILURE_THRESHOLD")
                .unwrap_or(defaults.failure_threshold),
            recovery_timeout: env_millis("VELOX_BREAKER_RECOVERY_TIMEOUT_MS")
                .unwrap_or(defaults.recovery_timeout),
            half_open_max_attempts: env_parse("VELOX_BREAKER_HALF_OPEN_MAX_ATTEMPTS")
                .unwrap_or(defaults.half_open_max_attempts),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(VeloxError::InvalidConfig(
                "failure_threshold must be greater than zero".to_string(),
            ));
        }
        if self.half_open_max_attempts == 0 {
            return Err(VeloxError::InvalidConfig(
                "half_open_max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_attempts: 1,
        }
    }
}

// == Queue Config ==
/// Request queue limits.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of actions running at once
    pub max_concurrent: usize,
    /// Minimum spacing between consecutive action starts
    pub rate_limit_delay: Option<Duration>,
}

impl QueueConfig {
    /// Loads queue settings from the environment.
    ///
    /// # Environment Variables
    /// - `VELOX_QUEUE_MAX_CONCURRENT` (default: 4)
    /// - `VELOX_QUEUE_RATE_LIMIT_MS` (default: unset, no rate limit)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent: env_parse("VELOX_QUEUE_MAX_CONCURRENT")
                .unwrap_or(defaults.max_concurrent),
            rate_limit_delay: env_millis("VELOX_QUEUE_RATE_LIMIT_MS").or(defaults.rate_limit_delay),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(VeloxError::InvalidConfig(
                "max_concurrent must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            rate_limit_delay: None,
        }
    }
}

// == Interceptor Config ==
/// HTTP response cache settings.
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Maximum number of cached responses
    pub max_entries: usize,
    /// Lifetime of a cached response
    pub ttl: Duration,
    /// Largest response body that will be buffered for caching
    pub max_body_bytes: usize,
}

impl InterceptorConfig {
    /// Loads interceptor settings from the environment.
    ///
    /// # Environment Variables
    /// - `VELOX_HTTP_CACHE_MAX_ENTRIES` (default: 100)
    /// - `VELOX_HTTP_CACHE_TTL_MS` (default: 300000)
    /// - `VELOX_HTTP_CACHE_MAX_BODY_BYTES` (default: 1048576)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_parse("VELOX_HTTP_CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            ttl: env_millis("VELOX_HTTP_CACHE_TTL_MS").unwrap_or(defaults.ttl),
            max_body_bytes: env_parse("VELOX_HTTP_CACHE_MAX_BODY_BYTES")
                .unwrap_or(defaults.max_body_bytes),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(VeloxError::InvalidConfig(
                "max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Duration::from_secs(300),
            max_body_bytes: 1024 * 1024,
        }
    }
}

// == Velox Config ==
/// Aggregate configuration for every component in the crate.
#[derive(Debug, Clone, Default)]
pub struct VeloxConfig {
    pub cache: CacheConfig,
    pub breaker: BreakerConfig,
    pub queue: QueueConfig,
    pub interceptor: InterceptorConfig,
}

impl VeloxConfig {
    /// Loads every component's settings from the environment.
    pub fn from_env() -> Self {
        Self {
            cache: CacheConfig::from_env(),
            breaker: BreakerConfig::from_env(),
            queue: QueueConfig::from_env(),
            interceptor: InterceptorConfig::from_env(),
        }
    }

    /// Validates every section, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.breaker.validate()?;
        self.queue.validate()?;
        self.interceptor.validate()
    }
}
