use std::collections::HashMap;

use crate::error::Result;
use crate::model::entity::{Attributes, JobId};
use crate::model::vo::{JobDescription, RemoteCommand};

/// How a job left the scheduler according to its accounting record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingOutcome {
    Exited(i32),
    Killed,
    Failed { exit_code: i32, reason: String },
}

/// The two acknowledgements a successful cancellation can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
    RemovedWhilePending,
    SignalledWhileRunning,
}

/// Everything that differs between scheduler families: command shapes, output
/// parsing and script rendering. Status reconciliation only talks to this.
pub trait SchedulerDialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sub-state a live job reports while running.
    fn running_token(&self) -> &str;

    fn sub_state<'a>(&self, attributes: &'a Attributes) -> Option<&'a str>;

    fn list_queues_command(&self) -> RemoteCommand;
    fn queue_summary_command(&self) -> RemoteCommand;
    fn live_queue_command(&self) -> RemoteCommand;
    fn accounting_command(&self, job: &JobId) -> RemoteCommand;
    fn submit_command(&self) -> RemoteCommand;
    fn cancel_command(&self, job: &JobId) -> RemoteCommand;

    fn parse_queue_names(&self, text: &str) -> Result<Vec<String>>;
    fn parse_queue_summary(&self, text: &str) -> Result<HashMap<String, Attributes>>;
    fn parse_live_queue(&self, text: &str) -> Result<HashMap<JobId, Attributes>>;
    /// `Ok(None)` when the record is legitimately absent.
    fn parse_accounting(&self, text: &str, job: &JobId) -> Result<Option<Attributes>>;
    fn accounting_outcome(&self, record: &Attributes) -> Result<AccountingOutcome>;
    fn parse_submit_ack(&self, text: &str) -> Result<JobId>;
    fn parse_cancel_ack(&self, text: &str, job: &JobId) -> Result<CancelAck>;

    fn render_script(&self, description: &JobDescription) -> Result<String>;
}
