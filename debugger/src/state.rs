use std::path::PathBuf;

use dap_codec::events::OutputCategory;

/// How to start a debugging session.
#[derive(Debug, Clone)]
pub struct LaunchArguments {
    /// The script to debug
    pub program: PathBuf,
    /// Executable to run the script under; defaults to the installed debugger
    pub debugger: Option<String>,
    /// Report the first suspension as a stop at the program entry
    pub stop_on_entry: bool,
}

impl LaunchArguments {
    pub fn from_path(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            debugger: None,
            stop_on_entry: false,
        }
    }
}

/// Why the debuggee stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint,
    Step,
    Entry,
}

/// Notifications published by a session towards the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The debug socket is connected; configuration can begin
    Initialised,
    /// The debuggee suspended execution
    Stopped { reason: StopReason },
    /// A line of process output
    Output {
        category: OutputCategory,
        output: String,
    },
    /// The debugger process exited or the socket closed
    Terminated,
}
