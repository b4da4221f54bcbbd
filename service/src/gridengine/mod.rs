//! Sun/Open/Son of Grid Engine command shapes and output formats.

pub mod parser;
pub mod script;

use std::collections::HashMap;

use domain::model::entity::{Attributes, JobId};
use domain::model::vo::{JobDescription, RemoteCommand};
use domain::service::{AccountingOutcome, CancelAck, SchedulerDialect};
use domain::Result;

use crate::options::SchedulerOptions;

/// Sub-state of a running job in `qstat` output.
pub const RUNNING_STATE: &str = "r";

#[derive(Debug, Clone, Default)]
pub struct GridEngine {
    parallel_environment: Option<String>,
    relaxed_parsing: bool,
}

impl GridEngine {
    pub fn new(options: &SchedulerOptions) -> Self {
        Self {
            parallel_environment: options.parallel_environment.clone(),
            relaxed_parsing: options.relaxed_parsing,
        }
    }
}

impl SchedulerDialect for GridEngine {
    fn name(&self) -> &'static str {
        "gridengine"
    }

    fn running_token(&self) -> &str {
        RUNNING_STATE
    }

    fn sub_state<'a>(&self, attributes: &'a Attributes) -> Option<&'a str> {
        attributes.get("state").map(String::as_str)
    }

    fn list_queues_command(&self) -> RemoteCommand {
        RemoteCommand::new("qconf", ["-sql"])
    }

    fn queue_summary_command(&self) -> RemoteCommand {
        RemoteCommand::new("qstat", ["-g", "c"])
    }

    fn live_queue_command(&self) -> RemoteCommand {
        RemoteCommand::new("qstat", ["-xml"])
    }

    fn accounting_command(&self, job: &JobId) -> RemoteCommand {
        RemoteCommand::new("qacct", ["-j", job.as_str()])
    }

    fn submit_command(&self) -> RemoteCommand {
        RemoteCommand::new("qsub", Vec::<String>::new())
    }

    fn cancel_command(&self, job: &JobId) -> RemoteCommand {
        RemoteCommand::new("qdel", [job.as_str()])
    }

    fn parse_queue_names(&self, text: &str) -> Result<Vec<String>> {
        Ok(parser::parse_queue_names(text))
    }

    fn parse_queue_summary(&self, text: &str) -> Result<HashMap<String, Attributes>> {
        parser::parse_queue_summary(text)
    }

    fn parse_live_queue(&self, text: &str) -> Result<HashMap<JobId, Attributes>> {
        parser::parse_qstat_xml(text, self.relaxed_parsing)
    }

    fn parse_accounting(&self, text: &str, job: &JobId) -> Result<Option<Attributes>> {
        parser::parse_qacct(text, job)
    }

    fn accounting_outcome(&self, record: &Attributes) -> Result<AccountingOutcome> {
        parser::accounting_outcome(record)
    }

    fn parse_submit_ack(&self, text: &str) -> Result<JobId> {
        parser::parse_submit_ack(text)
    }

    fn parse_cancel_ack(&self, text: &str, job: &JobId) -> Result<CancelAck> {
        parser::parse_cancel_ack(text, job)
    }

    fn render_script(&self, description: &JobDescription) -> Result<String> {
        script::gen_script(description, self.parallel_environment.as_deref())
    }
}
