use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RETRY_COOLDOWN_SECS: u64 = 3;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;
/// Status records expire after this many poll intervals without a heartbeat.
pub const STATUS_TIMEOUT_POLL_FACTOR: u32 = 3;
const DEFAULT_MIN_POLL_SLEEP_MS: u64 = 100;

/// Runtime configuration for one streaming worker.
///
/// Construct through [`WorkerConfig::builder`] or [`WorkerConfig::new`]; both validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    credentials_name: Option<String>,
    poll_interval: Duration,
    retry_cooldown: Duration,
    max_consecutive_errors: u32,
    status_timeout: Duration,
    min_poll_sleep: Duration,
}

pub struct WorkerConfigParams {
    pub credentials_name: Option<String>,
    pub poll_interval: Duration,
    pub retry_cooldown: Duration,
    pub max_consecutive_errors: u32,
    pub status_timeout: Duration,
    pub min_poll_sleep: Duration,
}

impl WorkerConfig {
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    pub fn new(params: WorkerConfigParams) -> Result<Self> {
        let WorkerConfigParams {
            credentials_name,
            poll_interval,
            retry_cooldown,
            max_consecutive_errors,
            status_timeout,
            min_poll_sleep,
        } = params;

        let config = Self {
            credentials_name: credentials_name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty()),
            poll_interval,
            retry_cooldown,
            max_consecutive_errors,
            status_timeout,
            min_poll_sleep,
        };

        config.validate()?;
        Ok(config)
    }

    /// Credentials to stream with; `None` means the first available.
    pub fn credentials_name(&self) -> Option<&str> {
        self.credentials_name.as_deref()
    }

    /// Time between ticks (flush, term refresh, heartbeat).
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Pause after a failed stream attempt before retrying.
    pub fn retry_cooldown(&self) -> Duration {
        self.retry_cooldown
    }

    /// Recorded errors at which the worker is considered unhealthy.
    pub fn max_consecutive_errors(&self) -> u32 {
        self.max_consecutive_errors
    }

    /// How long the status record stays valid after a heartbeat.
    pub fn status_timeout(&self) -> Duration {
        self.status_timeout
    }

    pub fn min_poll_sleep(&self) -> Duration {
        self.min_poll_sleep
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.retry_cooldown.is_zero() {
            bail!("retry_cooldown must be greater than 0");
        }

        if self.max_consecutive_errors == 0 {
            bail!("max_consecutive_errors must be greater than 0");
        }

        if self.status_timeout < self.poll_interval {
            bail!(
                "status_timeout ({:?}) must be at least the poll_interval ({:?})",
                self.status_timeout,
                self.poll_interval
            );
        }

        if self.min_poll_sleep.is_zero() || self.min_poll_sleep > self.poll_interval {
            bail!("min_poll_sleep must be greater than 0 and at most the poll_interval");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct WorkerConfigBuilder {
    credentials_name: Option<String>,
    poll_interval: Option<Duration>,
    retry_cooldown: Option<Duration>,
    max_consecutive_errors: Option<u32>,
    status_timeout: Option<Duration>,
    min_poll_sleep: Option<Duration>,
}

impl WorkerConfigBuilder {
    pub fn credentials_name(mut self, name: impl Into<String>) -> Self {
        self.credentials_name = Some(name.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = Some(cooldown);
        self
    }

    pub fn max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = Some(max);
        self
    }

    pub fn status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = Some(timeout);
        self
    }

    pub fn min_poll_sleep(mut self, sleep: Duration) -> Self {
        self.min_poll_sleep = Some(sleep);
        self
    }

    pub fn build(self) -> Result<WorkerConfig> {
        let poll_interval = self
            .poll_interval
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
        let min_poll_sleep = self
            .min_poll_sleep
            .unwrap_or_else(|| Duration::from_millis(DEFAULT_MIN_POLL_SLEEP_MS).min(poll_interval));

        let params = WorkerConfigParams {
            credentials_name: self.credentials_name,
            poll_interval,
            retry_cooldown: self
                .retry_cooldown
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RETRY_COOLDOWN_SECS)),
            max_consecutive_errors: self
                .max_consecutive_errors
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_ERRORS),
            status_timeout: self
                .status_timeout
                .unwrap_or_else(|| poll_interval.saturating_mul(STATUS_TIMEOUT_POLL_FACTOR)),
            min_poll_sleep,
        };

        WorkerConfig::new(params)
    }
}
