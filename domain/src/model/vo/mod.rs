pub mod command;
pub mod job;
pub mod location;

#[rustfmt::skip]
pub use self::{
    command::{CommandOutput, RemoteCommand},
    job::JobDescription,
    location::{Credential, Location},
};
