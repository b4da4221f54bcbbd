pub mod connection;
pub mod gridengine;
pub mod options;
pub mod registry;
pub mod seen;
pub mod waiter;

#[cfg(test)]
mod testing;

pub mod prelude {
    #[rustfmt::skip]
    pub use super::{
        connection::SchedulerConnection,
        gridengine::GridEngine,
        options::SchedulerOptions,
        registry::SchedulerRegistry,
        waiter::Waiter,
    };
}
