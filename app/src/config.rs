use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use domain::model::vo::{Credential, JobDescription};
use serde::*;

/// Configuration file read when `JOBGATE_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Reads the YAML configuration file, then `JOBGATE__*` environment overrides.
pub fn build_config() -> Result<Config, ConfigError> {
    let path = std::env::var("JOBGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());
    Config::builder()
        .add_source(File::with_name(&path).required(false))
        .add_source(Environment::with_prefix("JOBGATE").separator("__"))
        .build()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Seconds between two status refreshes of the submitted jobs
    #[serde(default = "AppConfig::default_refresh_jobs_interval")]
    pub refresh_jobs_interval: u64,

    /// `tracing` filter directives, overridden by `RUST_LOG`
    #[serde(default = "AppConfig::default_log_filter")]
    pub log_filter: String,

    #[serde(default = "Default::default")]
    pub schedulers: Vec<SchedulerConfig>,

    #[serde(default = "Default::default")]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub name: String,

    /// `local://`, `ssh://[user@]host[:port]` or `host[:port]`
    pub location: String,

    #[serde(default = "Default::default")]
    pub credential: Credential,

    #[serde(default = "Default::default")]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Name of the scheduler to submit to
    pub scheduler: String,

    #[serde(flatten)]
    pub description: JobDescription,
}

impl AppConfig {
    pub fn default_refresh_jobs_interval() -> u64 {
        10
    }

    pub fn default_log_filter() -> String {
        "info".to_owned()
    }
}
