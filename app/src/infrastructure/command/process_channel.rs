use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use domain::model::vo::{CommandOutput, Credential, Location};
use domain::service::{ChannelFactory, CommandChannel};
use domain::{Result, SchedulerError};
use tokio::io::AsyncWriteExt;

use super::ssh_proxy::{MaybeSsh, SshConfig, SSH_FAILURE};

/// Runs scheduler commands as child processes, locally or through `ssh`.
#[derive(Debug)]
pub struct ProcessChannel {
    ssh: Option<SshConfig>,
    closed: AtomicBool,
}

impl AsRef<Option<SshConfig>> for ProcessChannel {
    fn as_ref(&self) -> &Option<SshConfig> {
        &self.ssh
    }
}

impl ProcessChannel {
    pub fn new(ssh: Option<SshConfig>) -> Self {
        Self {
            ssh,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl CommandChannel for ProcessChannel {
    async fn run(
        &self,
        stdin: Option<&str>,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::AlreadyClosed);
        }

        let transport = |e: std::io::Error| SchedulerError::Transport(format!("{command}: {e}"));
        let mut child = self
            .command(command, args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(transport)?;

        let pipe = child.stdin.take();
        let feed = async move {
            match (stdin, pipe) {
                (Some(input), Some(mut pipe)) => match pipe.write_all(input.as_bytes()).await {
                    Ok(()) => pipe.shutdown().await,
                    Err(e) => Err(e),
                },
                _ => Ok(()),
            }
        };
        // Stdin is written while the output pipes drain
        let (fed, output) = futures::join!(feed, child.wait_with_output());
        let output = output.map_err(transport)?;
        match fed {
            // The command may exit without reading its input
            Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(transport(e)),
            _ => {}
        }

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        if self.is_ssh() && output.exit_code == SSH_FAILURE {
            return Err(SchedulerError::Transport(output.stderr.trim().to_owned()));
        }
        Ok(output)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyClosed);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessChannelFactory;

#[async_trait::async_trait]
impl ChannelFactory for ProcessChannelFactory {
    async fn open(
        &self,
        location: &Location,
        credential: &Credential,
    ) -> Result<Arc<dyn CommandChannel>> {
        tracing::debug!(%location, "Opening process channel");
        Ok(Arc::new(ProcessChannel::new(SshConfig::new(location, credential))))
    }
}
