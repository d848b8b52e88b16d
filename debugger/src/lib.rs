//! High level debugging session over the debugger's socket protocol
mod breakpoints;
mod debugger;
mod internals;
mod pending_requests;
mod source;
mod state;

pub use debugger::{Debugger, THREAD_ID};
pub use source::FileSource;
pub use state::{LaunchArguments, SessionEvent, StopReason};
