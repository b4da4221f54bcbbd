use crate::error::SchedulerError;

use super::{Attributes, SchedulerId};

/// Status of one queue, or the reason it could not be reported.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus {
    pub scheduler: SchedulerId,
    pub queue_name: String,
    pub attributes: Attributes,
    pub exception: Option<SchedulerError>,
}

impl QueueStatus {
    pub fn new(scheduler: SchedulerId, queue_name: &str, attributes: Attributes) -> Self {
        Self {
            scheduler,
            queue_name: queue_name.to_owned(),
            attributes,
            exception: None,
        }
    }

    pub fn failed(scheduler: SchedulerId, queue_name: &str, exception: SchedulerError) -> Self {
        Self {
            scheduler,
            queue_name: queue_name.to_owned(),
            attributes: Attributes::new(),
            exception: Some(exception),
        }
    }
}
