use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use url::Url;

use crate::error::SchedulerError;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Where the scheduler's command-line tools are reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local,
    Ssh {
        host: String,
        port: u16,
        user: Option<String>,
    },
}

impl Location {
    /// Accepts `local://`, `ssh://[user@]host[:port]` or a bare `host[:port]`.
    pub fn parse(s: &str) -> Result<Self, SchedulerError> {
        let s = s.trim();
        let invalid = || SchedulerError::InvalidLocation(s.to_owned());
        if s.is_empty() {
            return Err(invalid());
        }

        let url = if s.contains("://") {
            Url::parse(s).map_err(|_| invalid())?
        } else {
            Url::parse(&format!("ssh://{s}")).map_err(|_| invalid())?
        };

        match url.scheme() {
            "local" => {
                if url.host_str().is_some_and(|h| !h.is_empty()) {
                    return Err(invalid());
                }
                Ok(Self::Local)
            }
            "ssh" => {
                let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
                if !matches!(url.path(), "" | "/") {
                    return Err(invalid());
                }
                let user = Some(url.username()).filter(|u| !u.is_empty()).map(str::to_owned);
                Ok(Self::Ssh {
                    host: host.to_owned(),
                    port: url.port().unwrap_or(DEFAULT_SSH_PORT),
                    user,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local://"),
            Self::Ssh { host, port, user } => {
                f.write_str("ssh://")?;
                if let Some(user) = user {
                    write!(f, "{user}@")?;
                }
                write!(f, "{host}:{port}")
            }
        }
    }
}

/// Credential handed to the channel factory. Obtaining it is the caller's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    #[default]
    Default,
    Username { username: String },
    KeyFile { username: String, path: PathBuf },
}

impl Credential {
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Username { username } | Self::KeyFile { username, .. } => Some(username),
        }
    }
}
