use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use domain::model::entity::{
    Attributes, Job, JobId, JobState, JobStatus, QueueStatus, SchedulerId,
};
use domain::model::vo::{CommandOutput, JobDescription, Location, RemoteCommand};
use domain::service::{
    AccountingOutcome, CancelAck, CommandChannel, JobScheduler, SchedulerDialect,
};
use domain::{Result, SchedulerError};
use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::options::SchedulerOptions;
use crate::seen::SeenRegistry;
use crate::waiter::Waiter;

/// One scheduler endpoint: a command channel, the queues it offers and what has
/// been observed about its jobs.
pub struct SchedulerConnection {
    id: SchedulerId,
    location: Location,
    dialect: Arc<dyn SchedulerDialect>,
    channel: Arc<dyn CommandChannel>,
    queue_names: Vec<String>,
    options: SchedulerOptions,
    seen: SeenRegistry,
    closed: AtomicBool,
}

impl SchedulerConnection {
    /// Fetches the queue list over `channel`. The channel is closed again if that fails.
    pub async fn connect(
        id: SchedulerId,
        location: Location,
        dialect: Arc<dyn SchedulerDialect>,
        channel: Arc<dyn CommandChannel>,
        options: SchedulerOptions,
    ) -> Result<Self> {
        let queue_names = match fetch_queue_names(&*dialect, &*channel).await {
            Ok(queue_names) => queue_names,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    tracing::warn!(%location, "Unable to close channel: {close_err}");
                }
                return Err(e);
            }
        };
        tracing::info!(
            scheduler = %id,
            %location,
            dialect = dialect.name(),
            queues = ?queue_names,
            "Connected to scheduler"
        );

        Ok(Self {
            id,
            location,
            dialect,
            channel,
            queue_names,
            options,
            seen: SeenRegistry::default(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SchedulerId {
        self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn queue_names(&self) -> &[String] {
        &self.queue_names
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn queue_status(&self, name: &str) -> Result<QueueStatus> {
        self.check_queue(name)?;
        let mut statuses = self.queue_statuses(&[name]).await?;
        let status = statuses.pop().ok_or_else(|| SchedulerError::NoSuchQueue(name.to_owned()))?;
        match status.exception {
            Some(e) => Err(e),
            None => Ok(status),
        }
    }

    /// Statuses in the order asked for; no names means every queue.
    pub async fn queue_statuses(&self, names: &[&str]) -> Result<Vec<QueueStatus>> {
        self.ensure_open()?;
        let names = if names.is_empty() {
            self.queue_names.iter().map(String::as_str).collect()
        } else {
            names.to_vec()
        };

        let mut summary = HashMap::new();
        if names.iter().any(|name| self.check_queue(name).is_ok()) {
            let out = self.run_checked(None, self.dialect.queue_summary_command()).await?;
            summary = self.dialect.parse_queue_summary(&out.stdout)?;
        }

        Ok(names
            .into_iter()
            .map(|name| match self.check_queue(name) {
                Err(e) => QueueStatus::failed(self.id, name, e),
                Ok(()) => match summary.get(name) {
                    Some(attributes) => QueueStatus::new(self.id, name, attributes.clone()),
                    None => QueueStatus::failed(
                        self.id,
                        name,
                        SchedulerError::NoSuchQueue(name.to_owned()),
                    ),
                },
            })
            .collect())
    }

    pub async fn wait_until_done(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        self.waiter().until_done(self, job, timeout_ms).await
    }

    pub async fn wait_until_running(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        self.waiter().until_running(self, job, timeout_ms).await
    }

    pub async fn wait_until_done_or_cancelled(
        &self,
        job: &Job,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<JobStatus> {
        self.waiter().until_done_or_cancelled(self, job, timeout_ms, cancel).await
    }

    pub async fn wait_until_running_or_cancelled(
        &self,
        job: &Job,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<JobStatus> {
        self.waiter().until_running_or_cancelled(self, job, timeout_ms, cancel).await
    }

    /// Closes the channel. Closing twice is an error.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyClosed);
        }
        tracing::info!(scheduler = %self.id, location = %self.location, "Closing scheduler");
        self.channel.close().await
    }

    fn waiter(&self) -> Waiter {
        Waiter::new(self.options.poll_delay)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SchedulerError::AlreadyClosed);
        }
        Ok(())
    }

    fn check_queue(&self, name: &str) -> Result<()> {
        if self.queue_names.iter().any(|q| q == name) {
            Ok(())
        } else {
            Err(SchedulerError::NoSuchQueue(name.to_owned()))
        }
    }

    fn check_owner(&self, job: &Job) -> Result<()> {
        if job.scheduler() == self.id {
            Ok(())
        } else {
            Err(SchedulerError::IllegalArgument(format!(
                "job {} belongs to {}, not {}",
                job.id(),
                job.scheduler(),
                self.id
            )))
        }
    }

    async fn run(&self, stdin: Option<&str>, command: RemoteCommand) -> Result<CommandOutput> {
        self.ensure_open()?;
        tracing::debug!(scheduler = %self.id, "Running `{}`", command.display());
        self.channel.run(stdin, command.program, &command.args).await
    }

    async fn run_checked(&self, stdin: Option<&str>, command: RemoteCommand) -> Result<CommandOutput> {
        let out = self.run(stdin, command.clone()).await?;
        check(&command, out)
    }

    async fn live_queue(&self) -> Result<HashMap<JobId, Attributes>> {
        let out = self.run_checked(None, self.dialect.live_queue_command()).await?;
        self.dialect.parse_live_queue(&out.stdout)
    }

    /// `Ok(None)` both for a missing record and for a failing accounting command.
    async fn accounting(&self, id: &JobId) -> Result<Option<Attributes>> {
        let out = match self.run(None, self.dialect.accounting_command(id)).await? {
            out if out.success() => out,
            out => {
                tracing::debug!(
                    scheduler = %self.id,
                    job_id = %id,
                    exit_code = out.exit_code,
                    "No accounting record: {}",
                    out.stderr.trim()
                );
                return Ok(None);
            }
        };
        self.dialect.parse_accounting(&out.stdout, id)
    }

    /// Merges the live queue snapshot and the accounting record of one job.
    ///
    /// Only a connection closed underneath the query is returned as an error.
    async fn reconcile(
        &self,
        job: &Job,
        live: &HashMap<JobId, Attributes>,
        now: Instant,
    ) -> Result<JobStatus> {
        if let Err(e) = self.check_owner(job) {
            return Ok(JobStatus::error(job.clone(), e));
        }
        let id = job.id();

        if let Some(attributes) = live.get(id) {
            let running = self.dialect.sub_state(attributes) == Some(self.dialect.running_token());
            return Ok(if running {
                JobStatus::running(job.clone(), attributes.clone())
            } else {
                JobStatus::pending(job.clone(), attributes.clone())
            });
        }

        let record = match self.accounting(id).await {
            Ok(record) => record,
            Err(SchedulerError::AlreadyClosed) => return Err(SchedulerError::AlreadyClosed),
            Err(e @ SchedulerError::Protocol(_)) => return Ok(JobStatus::error(job.clone(), e)),
            Err(e) => {
                tracing::debug!(scheduler = %self.id, job_id = %id, "Accounting query failed: {e}");
                None
            }
        };

        if let Some(record) = record {
            self.seen.forget(id);
            return Ok(self.finished(job, record));
        }

        if self.seen.is_removed(id) {
            return Ok(JobStatus::new(
                job.clone(),
                JobState::Done,
                None,
                Some(SchedulerError::JobCancelled(
                    id.to_string(),
                    "deleted before it started".to_owned(),
                )),
                Attributes::new(),
            ));
        }

        if self.seen.seen_within(id, self.options.accounting_grace_time, now) {
            return Ok(JobStatus::pending(job.clone(), Attributes::new()));
        }

        Ok(JobStatus::error(job.clone(), SchedulerError::JobNotFound(id.to_string())))
    }

    fn finished(&self, job: &Job, record: Attributes) -> JobStatus {
        let id = job.id().to_string();
        match self.dialect.accounting_outcome(&record) {
            Ok(AccountingOutcome::Exited(code)) => JobStatus::done(job.clone(), code, record),
            Ok(AccountingOutcome::Killed) => JobStatus::new(
                job.clone(),
                JobState::Done,
                None,
                Some(SchedulerError::JobCancelled(id, "killed by signal".to_owned())),
                record,
            ),
            Ok(AccountingOutcome::Failed { exit_code, reason }) => JobStatus::new(
                job.clone(),
                JobState::Error,
                Some(exit_code),
                Some(SchedulerError::JobFailed(id, reason)),
                record,
            ),
            Err(e) => JobStatus::new(job.clone(), JobState::Error, None, Some(e), record),
        }
    }
}

#[async_trait::async_trait]
impl JobScheduler for SchedulerConnection {
    async fn submit_job(&self, description: &JobDescription) -> Result<Job> {
        self.ensure_open()?;
        if let Some(queue) = &description.queue_name {
            self.check_queue(queue)?;
        }
        let script = self.dialect.render_script(description)?;

        let out = self.run_checked(Some(&script), self.dialect.submit_command()).await?;
        let id = self.dialect.parse_submit_ack(&out.stdout)?;
        self.seen.mark_seen(&id, Instant::now());
        tracing::info!(scheduler = %self.id, job_id = %id, "Job submitted");

        Ok(Job::new(id, self.id, description.clone()))
    }

    async fn get_status(&self, job: &Job) -> Result<JobStatus> {
        let mut statuses = self.get_statuses(std::slice::from_ref(job)).await?;
        statuses
            .pop()
            .ok_or_else(|| SchedulerError::Protocol("empty status batch".to_owned()))
    }

    async fn get_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>> {
        self.ensure_open()?;
        let now = Instant::now();
        let live = self.live_queue().await?;
        self.seen.mark_all_seen(live.keys(), now, self.options.accounting_grace_time);

        join_all(jobs.iter().map(|job| self.reconcile(job, &live, now)))
            .await
            .into_iter()
            .collect()
    }

    async fn cancel_job(&self, job: &Job) -> Result<JobStatus> {
        self.ensure_open()?;
        self.check_owner(job)?;
        let command = self.dialect.cancel_command(job.id());
        let out = self.run(None, command.clone()).await?;
        if !out.success() {
            return Err(command_failed(&command, out));
        }

        match self.dialect.parse_cancel_ack(&out.stdout, job.id())? {
            CancelAck::RemovedWhilePending => self.seen.mark_removed(job.id()),
            CancelAck::SignalledWhileRunning => {}
        }
        tracing::info!(scheduler = %self.id, job_id = %job.id(), "Job cancelled");
        self.get_status(job).await
    }
}

async fn fetch_queue_names(
    dialect: &dyn SchedulerDialect,
    channel: &dyn CommandChannel,
) -> Result<Vec<String>> {
    let command = dialect.list_queues_command();
    let out = channel.run(None, command.program, &command.args).await?;
    let out = check(&command, out)?;
    dialect.parse_queue_names(&out.stdout)
}

fn check(command: &RemoteCommand, out: CommandOutput) -> Result<CommandOutput> {
    if out.is_clean() {
        Ok(out)
    } else {
        Err(command_failed(command, out))
    }
}

fn command_failed(command: &RemoteCommand, out: CommandOutput) -> SchedulerError {
    SchedulerError::CommandFailed {
        command: command.display(),
        exit_code: out.exit_code,
        stderr: out.stderr.trim().to_owned(),
    }
}
