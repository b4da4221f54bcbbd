//! In-memory channel that answers scheduler commands from a script.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use domain::model::vo::{CommandOutput, Credential, Location};
use domain::service::{ChannelFactory, CommandChannel};
use domain::{Result, SchedulerError};

#[derive(Debug, Default)]
pub struct ScriptedChannel {
    /// Answers per command line; the last answer repeats
    answers: Mutex<HashMap<String, VecDeque<Result<CommandOutput>>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    closed: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, command: &str, stdout: &str) -> &Self {
        self.on_output(
            command,
            CommandOutput {
                stdout: stdout.to_owned(),
                ..Default::default()
            },
        )
    }

    pub fn on_output(&self, command: &str, output: CommandOutput) -> &Self {
        self.answer(command, Ok(output))
    }

    pub fn on_error(&self, command: &str, error: SchedulerError) -> &Self {
        self.answer(command, Err(error))
    }

    fn answer(&self, command: &str, answer: Result<CommandOutput>) -> &Self {
        self.answers.lock().unwrap().entry(command.to_owned()).or_default().push_back(answer);
        self
    }

    /// Forgets earlier answers for `command`.
    pub fn reset(&self, command: &str) -> &Self {
        self.answers.lock().unwrap().remove(command);
        self
    }

    pub fn calls_to(&self, command: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(c, _)| c == command).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn stdin_of(&self, command: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| c == command)
            .and_then(|(_, stdin)| stdin.clone())
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CommandChannel for ScriptedChannel {
    async fn run(
        &self,
        stdin: Option<&str>,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput> {
        let line = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push((line.clone(), stdin.map(str::to_owned)));

        let mut answers = self.answers.lock().unwrap();
        match answers.get_mut(&line) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Ok(CommandOutput {
                stderr: format!("{command}: command not scripted"),
                exit_code: 127,
                ..Default::default()
            }),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out scripted channels by location.
#[derive(Default)]
pub struct ScriptedFactory {
    channels: Mutex<HashMap<String, Arc<ScriptedChannel>>>,
    opened: AtomicUsize,
}

impl ScriptedFactory {
    pub fn with(self, location: &str, channel: Arc<ScriptedChannel>) -> Self {
        let key = Location::parse(location).unwrap().to_string();
        self.channels.lock().unwrap().insert(key, channel);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChannelFactory for ScriptedFactory {
    async fn open(
        &self,
        location: &Location,
        _credential: &Credential,
    ) -> Result<Arc<dyn CommandChannel>> {
        let channel = self
            .channels
            .lock()
            .unwrap()
            .get(&location.to_string())
            .cloned()
            .ok_or_else(|| SchedulerError::Transport(format!("cannot reach {location}")))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(channel)
    }
}

pub const QUEUES: &str = "all.q\nlong.q\n";

pub fn qstat_xml(jobs: &[(&str, &str)]) -> String {
    let lists = jobs
        .iter()
        .map(|(id, state)| {
            format!(
                "<job_list state=\"x\"><JB_job_number>{id}</JB_job_number>\
                 <JB_name>job{id}</JB_name><state>{state}</state></job_list>"
            )
        })
        .collect::<String>();
    format!("<?xml version='1.0'?>\n<job_info><queue_info>{lists}</queue_info><job_info></job_info></job_info>\n")
}

pub fn qacct(id: &str, exit_status: &str, failed: &str) -> String {
    format!(
        "==============================================================\n\
         qname        all.q\n\
         jobnumber    {id}\n\
         exit_status  {exit_status}\n\
         failed       {failed}\n"
    )
}

pub fn not_found(id: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: format!("error: job id {id} not found"),
        exit_code: 1,
    }
}
