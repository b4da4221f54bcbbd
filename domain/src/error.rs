use std::result;

use crate::model::entity::SchedulerId;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("invalid value {value:?} for option {key}")]
    InvalidProperty { key: String, value: String },
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected scheduler output: {0}")]
    Protocol(String),
    #[error("cannot parse job identifier from submission output: {0:?}")]
    CannotParseSubmission(String),
    #[error("command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("job {0} not found on server")]
    JobNotFound(String),
    #[error("job {0} cancelled: {1}")]
    JobCancelled(String, String),
    #[error("job {0} reports error: {1}")]
    JobFailed(String, String),

    #[error("no such queue: {0}")]
    NoSuchQueue(String),
    #[error("scheduler {0} not found")]
    NoSuchScheduler(SchedulerId),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("invalid job description: {0}")]
    InvalidJobDescription(String),
    #[error("scheduler connection already closed")]
    AlreadyClosed,
}

pub type Result<T> = result::Result<T, SchedulerError>;
