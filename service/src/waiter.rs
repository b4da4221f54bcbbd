use std::time::Duration;

use domain::model::entity::{Job, JobStatus};
use domain::service::JobScheduler;
use domain::{Result, SchedulerError};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Polls a scheduler until a job reaches a condition or a deadline passes.
///
/// A timeout of `0` waits forever; a negative timeout is rejected before any
/// query is made. When the deadline passes, or the cancellation token fires, the
/// last observed status is returned; callers must check it.
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    poll_delay: Duration,
}

impl Waiter {
    pub fn new(poll_delay: Duration) -> Self {
        Self { poll_delay }
    }

    pub async fn until_done<S>(&self, scheduler: &S, job: &Job, timeout_ms: i64) -> Result<JobStatus>
    where
        S: JobScheduler + ?Sized,
    {
        self.wait(scheduler, job, timeout_ms, None, JobStatus::is_done).await
    }

    /// Also returns for jobs that finished without ever being seen running.
    pub async fn until_running<S>(
        &self,
        scheduler: &S,
        job: &Job,
        timeout_ms: i64,
    ) -> Result<JobStatus>
    where
        S: JobScheduler + ?Sized,
    {
        self.wait(scheduler, job, timeout_ms, None, running_or_done).await
    }

    pub async fn until_done_or_cancelled<S>(
        &self,
        scheduler: &S,
        job: &Job,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<JobStatus>
    where
        S: JobScheduler + ?Sized,
    {
        self.wait(scheduler, job, timeout_ms, Some(cancel), JobStatus::is_done).await
    }

    pub async fn until_running_or_cancelled<S>(
        &self,
        scheduler: &S,
        job: &Job,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<JobStatus>
    where
        S: JobScheduler + ?Sized,
    {
        self.wait(scheduler, job, timeout_ms, Some(cancel), running_or_done).await
    }

    async fn wait<S>(
        &self,
        scheduler: &S,
        job: &Job,
        timeout_ms: i64,
        cancel: Option<&CancellationToken>,
        condition: fn(&JobStatus) -> bool,
    ) -> Result<JobStatus>
    where
        S: JobScheduler + ?Sized,
    {
        let deadline = deadline(timeout_ms)?;

        let mut status = scheduler.get_status(job).await?;
        loop {
            if condition(&status) {
                return Ok(status);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::debug!(job_id = %job.id(), state = %status.state, "Wait deadline passed");
                return Ok(status);
            }
            match cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!(job_id = %job.id(), "Wait cancelled by caller");
                        return Ok(status);
                    }
                    _ = sleep(self.poll_delay) => {}
                },
                None => sleep(self.poll_delay).await,
            }
            status = scheduler.get_status(job).await?;
        }
    }
}

fn running_or_done(status: &JobStatus) -> bool {
    status.is_running() || status.is_done()
}

fn deadline(timeout_ms: i64) -> Result<Option<Instant>> {
    match timeout_ms {
        t if t < 0 => Err(SchedulerError::IllegalArgument(format!(
            "timeout must be non-negative, got {t}"
        ))),
        0 => Ok(None),
        t => Ok(Some(Instant::now() + Duration::from_millis(t as u64))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use domain::model::entity::{Attributes, JobId, JobState, SchedulerId};
    use domain::model::vo::JobDescription;
    use mockall::mock;

    use super::*;

    mock! {
        Scheduler {}

        #[async_trait::async_trait]
        impl JobScheduler for Scheduler {
            async fn submit_job(&self, description: &JobDescription) -> Result<Job>;
            async fn get_status(&self, job: &Job) -> Result<JobStatus>;
            async fn get_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>>;
            async fn cancel_job(&self, job: &Job) -> Result<JobStatus>;
        }
    }

    const POLL: Duration = Duration::from_millis(100);

    fn job() -> Job {
        let description = JobDescription::builder().executable("/bin/sleep").build();
        Job::new(JobId::from("42"), SchedulerId(1), description)
    }

    /// Reports `states` in order, repeating the last one.
    fn scripted(states: Vec<JobState>) -> (MockScheduler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut scheduler = MockScheduler::new();
        scheduler.expect_get_status().returning(move |job| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let state = states[n.min(states.len() - 1)];
            let exit_code = (state == JobState::Done).then_some(0);
            Ok(JobStatus::new(job.clone(), state, exit_code, None, Attributes::new()))
        });
        (scheduler, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn negative_timeout_makes_no_calls() {
        let mut scheduler = MockScheduler::new();
        scheduler.expect_get_status().times(0);
        let waiter = Waiter::new(POLL);

        for result in [
            waiter.until_done(&scheduler, &job(), -1).await,
            waiter.until_running(&scheduler, &job(), -1).await,
        ] {
            assert!(matches!(result, Err(SchedulerError::IllegalArgument(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_waits_until_done() {
        let mut states = vec![JobState::Pending; 50];
        states.extend([JobState::Running; 50]);
        states.push(JobState::Done);
        let (scheduler, calls) = scripted(states);

        let status = Waiter::new(POLL).until_done(&scheduler, &job(), 0).await.unwrap();
        assert!(status.is_done());
        assert_eq!(101, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_returns_last_status() {
        let (scheduler, _) = scripted(vec![JobState::Pending]);
        let start = Instant::now();

        let status = Waiter::new(POLL).until_done(&scheduler, &job(), 1_000).await.unwrap();
        assert!(!status.is_done());
        assert_eq!(JobState::Pending, status.state);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000));
        assert!(elapsed <= Duration::from_millis(1_000) + POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn running_wait_accepts_finished_jobs() {
        let (scheduler, calls) = scripted(vec![JobState::Pending, JobState::Pending, JobState::Done]);

        let status = Waiter::new(POLL).until_running(&scheduler, &job(), 0).await.unwrap();
        assert_eq!(JobState::Done, status.state);
        assert_eq!(3, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn running_wait_stops_at_running() {
        let (scheduler, _) = scripted(vec![JobState::Pending, JobState::Running, JobState::Done]);

        let status = Waiter::new(POLL).until_running(&scheduler, &job(), 5_000).await.unwrap();
        assert!(status.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_last_status() {
        let (scheduler, _) = scripted(vec![JobState::Pending]);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(350)).await;
            trigger.cancel();
        });

        let status = Waiter::new(POLL)
            .until_done_or_cancelled(&scheduler, &job(), 0, &token)
            .await
            .unwrap();
        assert_eq!(JobState::Pending, status.state);
    }

    #[tokio::test(start_paused = true)]
    async fn query_errors_propagate() {
        let mut scheduler = MockScheduler::new();
        scheduler
            .expect_get_status()
            .times(1)
            .returning(|_| Err(SchedulerError::Transport("connection reset".to_owned())));

        let result = Waiter::new(POLL).until_done(&scheduler, &job(), 0).await;
        assert_eq!(Err(SchedulerError::Transport("connection reset".to_owned())), result);
    }
}
