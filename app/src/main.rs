mod background_service;
mod config;
mod infrastructure;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use domain::model::entity::SchedulerId;
use service::prelude::*;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use self::background_service::prelude::*;
use self::config::{build_config, AppConfig};
use self::infrastructure::command::ProcessChannelFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = build_config().with_context(|| "Failed to build config".red())?;
    let app_config: AppConfig =
        config.try_deserialize().with_context(|| "Invalid configuration".red())?;

    init_logging(&app_config.log_filter).with_context(|| "Failed to initialize logger".red())?;

    let registry = Arc::new(SchedulerRegistry::new(Arc::new(ProcessChannelFactory)));
    let result = run(registry.clone(), &app_config).await;

    tracing::info!("Closing schedulers");
    registry.close_all().await.with_context(|| "Failed to close schedulers".red())?;
    result
}

fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}

async fn run(registry: Arc<SchedulerRegistry>, config: &AppConfig) -> anyhow::Result<()> {
    let mut schedulers = HashMap::<&str, SchedulerId>::new();
    for scheduler in &config.schedulers {
        let id = registry
            .new_scheduler(&scheduler.location, &scheduler.credential, &scheduler.properties)
            .await
            .with_context(|| format!("Cannot connect to scheduler {}", scheduler.name).red())?;
        schedulers.insert(&scheduler.name, id);

        for queue in registry.queue_statuses(id, &[]).await? {
            match &queue.exception {
                None => tracing::info!(
                    scheduler = %scheduler.name,
                    queue = %queue.queue_name,
                    attributes = ?queue.attributes,
                    "Queue status"
                ),
                Some(e) => tracing::warn!(
                    scheduler = %scheduler.name,
                    queue = %queue.queue_name,
                    "No status for queue: {e}"
                ),
            }
        }
    }

    let mut jobs = Vec::with_capacity(config.jobs.len());
    for job in &config.jobs {
        let id = *schedulers
            .get(job.scheduler.as_str())
            .with_context(|| format!("Job refers to unknown scheduler {}", job.scheduler).red())?;
        let submitted = registry
            .submit_job(id, &job.description)
            .await
            .with_context(|| format!("Cannot submit {}", job.description.executable).red())?;
        jobs.push(submitted);
    }
    if jobs.is_empty() {
        tracing::info!("No jobs configured");
        return Ok(());
    }

    let interval = Duration::from_secs(config.refresh_jobs_interval.max(1));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    tracing::info!(jobs = jobs.len(), "Jobgate started");

    match refresh_jobs(registry, jobs, interval, shutdown).await {
        Some(statuses) => {
            for status in &statuses {
                if let Some(e) = &status.exception {
                    tracing::warn!(job_id = %status.job.id(), state = %status.state, "{e}");
                }
            }
            let failed = statuses.iter().filter(|s| s.exception.is_some()).count();
            tracing::info!(failed, "All jobs finished");
        }
        None => tracing::info!("Stopping services (ctrl-c handling)."),
    }
    Ok(())
}
