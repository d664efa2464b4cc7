//! Typed configuration.
//!
//! Every field has a default; environment variables (`TASKQ_*`) override
//! them. Malformed values fail fast with [`ConfigError::Invalid`].

use std::str::FromStr;
use std::time::Duration;

use crate::domain::WorkerId;
use crate::engine::RetryPolicy;
use crate::error::ConfigError;
use crate::keys::DEFAULT_NAMESPACE;

/// Queue engine settings: TTLs, claim behavior and retry policy.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key prefix (`{ns}:queue`, `{ns}:data:{id}`, ...).
    pub namespace: String,

    /// How long a claim is exclusive.
    pub lease_ttl: Duration,

    /// Retention of the in-flight record of a claimed task.
    pub processing_ttl: Duration,

    /// Retention of a task record written by enqueue.
    pub record_ttl: Duration,

    /// Retention of a COMPLETED / FAILED record.
    pub terminal_ttl: Duration,

    /// When true, claim ignores the head of the schedule until it is due.
    /// When false, the earliest entry is claimed even if its due time is
    /// still in the future.
    pub respect_due_time: bool,

    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            lease_ttl: Duration::from_secs(30),
            processing_ttl: Duration::from_secs(60 * 60),
            record_ttl: Duration::from_secs(24 * 60 * 60),
            terminal_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            respect_due_time: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ns) = lookup("TASKQ_NAMESPACE") {
            config.namespace = ns;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TASKQ_LEASE_TTL_SECS")? {
            config.lease_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TASKQ_PROCESSING_TTL_SECS")? {
            config.processing_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TASKQ_RECORD_TTL_SECS")? {
            config.record_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "TASKQ_TERMINAL_TTL_SECS")? {
            config.terminal_ttl = Duration::from_secs(secs);
        }
        if let Some(flag) = parse_bool(&lookup, "TASKQ_RESPECT_DUE_TIME")? {
            config.respect_due_time = flag;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TASKQ_RETRY_BASE_MS")? {
            config.retry = config.retry.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TASKQ_RETRY_MAX_DELAY_MS")? {
            config.retry = config.retry.with_max_delay(Duration::from_millis(ms));
        }
        if let Some(jitter) = parse_var::<f64>(&lookup, "TASKQ_RETRY_JITTER")? {
            if !(0.0..=1.0).contains(&jitter) {
                return Err(ConfigError::Invalid {
                    var: "TASKQ_RETRY_JITTER",
                    value: jitter.to_string(),
                });
            }
            config.retry = config.retry.with_jitter(jitter);
        }
        Ok(config)
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_respect_due_time(mut self, respect: bool) -> Self {
        self.respect_due_time = respect;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Polling worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,

    /// Delay between claim attempts.
    pub poll_interval: Duration,

    /// Max number of tasks executing at once in this worker.
    pub max_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: WorkerId::generate(),
            poll_interval: Duration::from_millis(100),
            max_concurrency: 6,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(id) = lookup("TASKQ_WORKER_ID") {
            config.worker_id = WorkerId::new(id);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TASKQ_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<usize>(&lookup, "TASKQ_MAX_CONCURRENCY")? {
            if n == 0 {
                return Err(ConfigError::Invalid {
                    var: "TASKQ_MAX_CONCURRENCY",
                    value: n.to_string(),
                });
            }
            config.max_concurrency = n;
        }
        Ok(config)
    }
}

/// Lease-expiry reaper settings.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

impl ReaperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "TASKQ_REAPER_INTERVAL_MS")? {
            config.interval = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(var).as_deref().map(str::trim) {
        None => Ok(None),
        Some("1" | "true" | "TRUE" | "yes") => Ok(Some(true)),
        Some("0" | "false" | "FALSE" | "no") => Ok(Some(false)),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
        }),
    }
}
