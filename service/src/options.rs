use std::collections::HashMap;
use std::time::Duration;

use domain::{Result, SchedulerError};

pub const POLL_DELAY: &str = "gridengine.poll.delay";
pub const ACCOUNTING_GRACE_TIME: &str = "gridengine.accounting.grace.time";
pub const PARALLEL_ENVIRONMENT: &str = "gridengine.parallel.environment";
pub const RELAXED_PARSING: &str = "gridengine.relaxed.parsing";

const KNOWN: [&str; 4] = [
    POLL_DELAY,
    ACCOUNTING_GRACE_TIME,
    PARALLEL_ENVIRONMENT,
    RELAXED_PARSING,
];

/// Per-connection settings parsed from the caller's property bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Delay between two polls of a waiting caller
    pub poll_delay: Duration,
    /// How long a job that vanished from the live queue is still reported pending
    pub accounting_grace_time: Duration,
    /// Parallel environment requested for multi-slot jobs
    pub parallel_environment: Option<String>,
    /// Skip malformed live-queue entries instead of failing
    pub relaxed_parsing: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_delay: Self::default_poll_delay(),
            accounting_grace_time: Self::default_accounting_grace_time(),
            parallel_environment: None,
            relaxed_parsing: false,
        }
    }
}

impl SchedulerOptions {
    pub fn default_poll_delay() -> Duration {
        Duration::from_millis(100)
    }

    pub fn default_accounting_grace_time() -> Duration {
        Duration::from_millis(60_000)
    }

    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        if let Some(key) = properties.keys().find(|k| !KNOWN.contains(&k.as_str())) {
            return Err(SchedulerError::UnknownOption(key.clone()));
        }

        let mut options = Self::default();
        if let Some(value) = properties.get(POLL_DELAY) {
            options.poll_delay = millis(POLL_DELAY, value)?;
            if options.poll_delay.is_zero() {
                return Err(invalid(POLL_DELAY, value));
            }
        }
        if let Some(value) = properties.get(ACCOUNTING_GRACE_TIME) {
            options.accounting_grace_time = millis(ACCOUNTING_GRACE_TIME, value)?;
        }
        if let Some(value) = properties.get(PARALLEL_ENVIRONMENT) {
            let value = value.trim();
            if value.is_empty() || value.contains(char::is_whitespace) {
                return Err(invalid(PARALLEL_ENVIRONMENT, value));
            }
            options.parallel_environment = Some(value.to_owned());
        }
        if let Some(value) = properties.get(RELAXED_PARSING) {
            options.relaxed_parsing = match value.trim() {
                "true" => true,
                "false" => false,
                _ => return Err(invalid(RELAXED_PARSING, value)),
            };
        }
        Ok(options)
    }
}

fn millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> SchedulerError {
    SchedulerError::InvalidProperty {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}
