use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use domain::model::entity::{Job, JobStatus};
use infrastructure::sync::timer;
use service::registry::SchedulerRegistry;

/// Refreshes the statuses of `jobs` with one batched call per interval until all
/// of them are done. Returns `None` if `shutdown` completes first.
pub async fn refresh_jobs(
    registry: Arc<SchedulerRegistry>,
    jobs: Vec<Job>,
    interval: Duration,
    shutdown: impl Future,
) -> Option<Vec<JobStatus>> {
    let jobs = jobs.into_iter().map(Some).collect::<Vec<_>>();

    timer::repeat_until(interval, shutdown, || async {
        let statuses = match registry.get_statuses(&jobs).await {
            Ok(statuses) => statuses.into_iter().flatten().collect::<Vec<_>>(),
            Err(e) => {
                tracing::error!("Cannot refresh job statuses: {e}");
                return ControlFlow::Continue(());
            }
        };

        for status in &statuses {
            tracing::info!(
                scheduler = %status.job.scheduler(),
                job_id = %status.job.id(),
                state = %status.state,
                exit_code = ?status.exit_code,
                "Job status"
            );
        }
        if statuses.iter().all(JobStatus::is_done) {
            ControlFlow::Break(statuses)
        } else {
            ControlFlow::Continue(())
        }
    })
    .await
}
