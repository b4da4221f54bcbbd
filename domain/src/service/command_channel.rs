use std::sync::Arc;

use crate::error::Result;
use crate::model::vo::{CommandOutput, Credential, Location};

/// Runs one command on the machine hosting the scheduler.
///
/// Every call is a one-shot request/response; implementations must not rely on
/// a persistent session and may be invoked concurrently.
#[async_trait::async_trait]
pub trait CommandChannel: Send + Sync {
    async fn run(&self, stdin: Option<&str>, command: &str, args: &[String])
        -> Result<CommandOutput>;

    async fn close(&self) -> Result<()>;
}

/// Opens channels for a location.
#[async_trait::async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn open(
        &self,
        location: &Location,
        credential: &Credential,
    ) -> Result<Arc<dyn CommandChannel>>;
}
