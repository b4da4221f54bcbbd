mod process_channel;
mod ssh_proxy;

pub use self::{
    process_channel::{ProcessChannel, ProcessChannelFactory},
    ssh_proxy::{MaybeSsh, SshConfig},
};
