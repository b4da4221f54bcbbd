use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SchedulerError;
use crate::model::vo::JobDescription;

/// Raw key/value attributes reported by the scheduler for one record.
pub type Attributes = HashMap<String, String>;

/// Opaque identifier of a scheduler connection inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchedulerId(pub u64);

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler-{}", self.0)
    }
}

/// Scheduler-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(Arc<str>);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted job. Holds its own copy of the description it was submitted with.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    scheduler: SchedulerId,
    description: Arc<JobDescription>,
}

impl Job {
    pub fn new(id: JobId, scheduler: SchedulerId, description: JobDescription) -> Self {
        Self {
            id,
            scheduler,
            description: Arc::new(description),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn scheduler(&self) -> SchedulerId {
        self.scheduler
    }

    pub fn description(&self) -> &JobDescription {
        &self.description
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Error,
}

/// Status of a job as observed by one query.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job: Job,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub exception: Option<SchedulerError>,
    pub attributes: Attributes,
}

impl JobStatus {
    pub fn pending(job: Job, attributes: Attributes) -> Self {
        Self::new(job, JobState::Pending, None, None, attributes)
    }

    pub fn running(job: Job, attributes: Attributes) -> Self {
        Self::new(job, JobState::Running, None, None, attributes)
    }

    pub fn done(job: Job, exit_code: i32, attributes: Attributes) -> Self {
        Self::new(job, JobState::Done, Some(exit_code), None, attributes)
    }

    pub fn error(job: Job, exception: SchedulerError) -> Self {
        Self::new(job, JobState::Error, None, Some(exception), Attributes::new())
    }

    pub fn new(
        job: Job,
        state: JobState,
        exit_code: Option<i32>,
        exception: Option<SchedulerError>,
        attributes: Attributes,
    ) -> Self {
        Self {
            job,
            state,
            exit_code,
            exception,
            attributes,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, JobState::Done | JobState::Error)
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        let description = JobDescription::builder().executable("/bin/true").build();
        Job::new(JobId::from("42"), SchedulerId(0), description)
    }

    #[test]
    fn error_counts_as_done() {
        let status = JobStatus::error(job(), SchedulerError::JobNotFound("42".to_owned()));
        assert!(status.is_done());
        assert!(!status.is_running());
    }

    #[test]
    fn running_is_not_done() {
        let status = JobStatus::running(job(), Attributes::new());
        assert!(status.is_running());
        assert!(!status.is_done());
        assert_eq!("RUNNING", status.state.to_string());
    }
}
