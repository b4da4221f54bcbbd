use std::path::PathBuf;

use domain::model::vo::{Credential, Location};
use service::gridengine::script::protect;
use tokio::process::Command;

/// Exit code `ssh` reports when it could not run the remote command at all.
pub const SSH_FAILURE: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub port: String,
    pub username_host: String,
    pub identity_file: Option<PathBuf>,
}

/// An ssh proxy for command. It's transparent if not using ssh.
pub trait MaybeSsh {
    fn command(&self, program: &str, args: &[String]) -> Command;
    fn is_ssh(&self) -> bool;
}

impl<Ctx> MaybeSsh for Ctx
where
    Ctx: AsRef<Option<SshConfig>>,
{
    fn command(&self, program: &str, args: &[String]) -> Command {
        let Some(ssh) = self.as_ref() else {
            let mut command = Command::new(program);
            command.args(args);
            return command;
        };

        // The remote side hands the command line to a shell
        let remote = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .map(protect)
            .collect::<Vec<_>>()
            .join(" ");

        let mut command = Command::new("ssh");
        command.args(["-o", "BatchMode=yes", "-p", ssh.port.as_str()]);
        if let Some(identity) = &ssh.identity_file {
            command.arg("-i").arg(identity);
        }
        command.args([ssh.username_host.as_str(), "--", remote.as_str()]);
        command
    }

    fn is_ssh(&self) -> bool {
        self.as_ref().is_some()
    }
}

impl SshConfig {
    /// `None` for a local location. A user in the location wins over the credential's.
    pub fn new(location: &Location, credential: &Credential) -> Option<Self> {
        let Location::Ssh { host, port, user } = location else {
            return None;
        };

        let username_host = match user.as_deref().or(credential.username()) {
            Some(user) => format!("{user}@{host}"),
            None => host.clone(),
        };
        let identity_file = match credential {
            Credential::KeyFile { path, .. } => Some(path.clone()),
            Credential::Default | Credential::Username { .. } => None,
        };

        Some(Self {
            port: port.to_string(),
            username_host,
            identity_file,
        })
    }
}
