use crate::error::Result;
use crate::model::entity::{Job, JobStatus};
use crate::model::vo::JobDescription;

#[async_trait::async_trait]
pub trait JobScheduler: Send + Sync {
    async fn submit_job(&self, description: &JobDescription) -> Result<Job>;
    async fn get_status(&self, job: &Job) -> Result<JobStatus>;
    /// One status per job, in order. Problems with a single job are reported in
    /// its status, only failures of the shared query are returned as errors.
    async fn get_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>>;
    async fn cancel_job(&self, job: &Job) -> Result<JobStatus>;
}
