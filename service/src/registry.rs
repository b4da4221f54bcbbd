use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::model::entity::{Job, JobStatus, QueueStatus, SchedulerId};
use domain::model::vo::{Credential, JobDescription, Location};
use domain::service::{ChannelFactory, JobScheduler};
use domain::{Result, SchedulerError};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::connection::SchedulerConnection;
use crate::gridengine::GridEngine;
use crate::options::SchedulerOptions;

/// Owns every open scheduler connection and routes job operations to the
/// connection a job was submitted through.
pub struct SchedulerRegistry {
    channels: Arc<dyn ChannelFactory>,
    next_id: AtomicU64,
    schedulers: Mutex<HashMap<SchedulerId, Arc<SchedulerConnection>>>,
}

impl SchedulerRegistry {
    pub fn new(channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            channels,
            next_id: AtomicU64::new(1),
            schedulers: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a connection to the scheduler at `location`.
    ///
    /// Properties are checked before anything is opened.
    pub async fn new_scheduler(
        &self,
        location: &str,
        credential: &Credential,
        properties: &HashMap<String, String>,
    ) -> Result<SchedulerId> {
        let options = SchedulerOptions::from_properties(properties)?;
        let location = Location::parse(location)?;
        let channel = self.channels.open(&location, credential).await?;

        let id = SchedulerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let dialect = Arc::new(GridEngine::new(&options));
        let connection = SchedulerConnection::connect(id, location, dialect, channel, options).await?;
        self.table().insert(id, Arc::new(connection));
        Ok(id)
    }

    pub fn scheduler(&self, id: SchedulerId) -> Result<Arc<SchedulerConnection>> {
        self.table().get(&id).cloned().ok_or(SchedulerError::NoSuchScheduler(id))
    }

    pub fn scheduler_ids(&self) -> Vec<SchedulerId> {
        let mut ids = self.table().keys().copied().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn queue_names(&self, id: SchedulerId) -> Result<Vec<String>> {
        Ok(self.scheduler(id)?.queue_names().to_vec())
    }

    pub async fn queue_status(&self, id: SchedulerId, name: &str) -> Result<QueueStatus> {
        self.scheduler(id)?.queue_status(name).await
    }

    pub async fn queue_statuses(&self, id: SchedulerId, names: &[&str]) -> Result<Vec<QueueStatus>> {
        self.scheduler(id)?.queue_statuses(names).await
    }

    pub async fn submit_job(&self, id: SchedulerId, description: &JobDescription) -> Result<Job> {
        self.scheduler(id)?.submit_job(description).await
    }

    pub async fn get_status(&self, job: &Job) -> Result<JobStatus> {
        self.scheduler(job.scheduler())?.get_status(job).await
    }

    /// Statuses for jobs of any number of schedulers, in input order.
    ///
    /// Each scheduler answers its share with one batched query. `None` entries
    /// stay `None`; jobs of a scheduler that is gone get an ERROR status.
    pub async fn get_statuses(&self, jobs: &[Option<Job>]) -> Result<Vec<Option<JobStatus>>> {
        let mut groups = HashMap::<SchedulerId, Vec<usize>>::new();
        for (index, job) in jobs.iter().enumerate() {
            if let Some(job) = job {
                groups.entry(job.scheduler()).or_default().push(index);
            }
        }

        let connections = {
            let table = self.table();
            groups
                .into_iter()
                .map(|(id, indices)| (id, table.get(&id).cloned(), indices))
                .collect::<Vec<_>>()
        };

        let mut statuses = vec![None; jobs.len()];
        let batches = join_all(connections.into_iter().map(|(id, connection, indices)| async move {
            let batch = indices
                .iter()
                .filter_map(|&i| jobs[i].clone())
                .collect::<Vec<_>>();
            let gone = |batch: Vec<Job>| {
                batch
                    .into_iter()
                    .map(|job| JobStatus::error(job, SchedulerError::NoSuchScheduler(id)))
                    .collect::<Vec<_>>()
            };
            let result = match connection {
                // Closed between the table lookup and the query
                Some(connection) => match connection.get_statuses(&batch).await {
                    Err(SchedulerError::AlreadyClosed) => Ok(gone(batch)),
                    result => result,
                },
                None => Ok(gone(batch)),
            };
            (indices, result)
        }))
        .await;

        for (indices, result) in batches {
            for (index, status) in indices.into_iter().zip(result?) {
                statuses[index] = Some(status);
            }
        }
        Ok(statuses)
    }

    pub async fn cancel_job(&self, job: &Job) -> Result<JobStatus> {
        self.scheduler(job.scheduler())?.cancel_job(job).await
    }

    pub async fn wait_until_done(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        check_timeout(timeout_ms)?;
        self.scheduler(job.scheduler())?.wait_until_done(job, timeout_ms).await
    }

    pub async fn wait_until_running(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        check_timeout(timeout_ms)?;
        self.scheduler(job.scheduler())?.wait_until_running(job, timeout_ms).await
    }

    pub async fn wait_until_done_or_cancelled(
        &self,
        job: &Job,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<JobStatus> {
        check_timeout(timeout_ms)?;
        self.scheduler(job.scheduler())?
            .wait_until_done_or_cancelled(job, timeout_ms, cancel)
            .await
    }

    pub async fn wait_until_running_or_cancelled(
        &self,
        job: &Job,
        timeout_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<JobStatus> {
        check_timeout(timeout_ms)?;
        self.scheduler(job.scheduler())?
            .wait_until_running_or_cancelled(job, timeout_ms, cancel)
            .await
    }

    /// Unregisters and closes a scheduler. Unknown ids are ignored.
    pub async fn close(&self, id: SchedulerId) -> Result<()> {
        let removed = self.table().remove(&id);
        match removed {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }

    /// Closes every registered scheduler, returning the first failure.
    pub async fn close_all(&self) -> Result<()> {
        let removed = self.table().drain().map(|(_, c)| c).collect::<Vec<_>>();
        let results = join_all(removed.iter().map(|connection| async move {
            let result = connection.close().await;
            if let Err(e) = &result {
                tracing::warn!(scheduler = %connection.id(), "Unable to close scheduler: {e}");
            }
            result
        }))
        .await;
        results.into_iter().collect()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<SchedulerId, Arc<SchedulerConnection>>> {
        self.schedulers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_timeout(timeout_ms: i64) -> Result<()> {
    if timeout_ms < 0 {
        return Err(SchedulerError::IllegalArgument(format!(
            "timeout must be non-negative, got {timeout_ms}"
        )));
    }
    Ok(())
}
