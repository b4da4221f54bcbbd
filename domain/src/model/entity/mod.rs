pub mod job;
pub mod queue;

#[rustfmt::skip]
pub use self::{
    job::{Attributes, Job, JobId, JobState, JobStatus, SchedulerId},
    queue::QueueStatus,
};
