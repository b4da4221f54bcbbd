mod command_channel;
mod job_scheduler;
mod scheduler_dialect;

#[rustfmt::skip]
pub use self::{
    command_channel::{ChannelFactory, CommandChannel},
    job_scheduler::JobScheduler,
    scheduler_dialect::{AccountingOutcome, CancelAck, SchedulerDialect},
};
