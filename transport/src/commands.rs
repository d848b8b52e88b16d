//! Line-oriented commands written to the debugger's control socket
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request a breakpoint at a source position
    Break { file: PathBuf, line: usize },
    /// Begin execution of the debuggee
    Start,
    /// Resume execution until the next stop
    Continue,
    /// Step over the current statement
    Next,
    /// Step into the current statement
    Step,
    /// List the local variables of the current frame
    VarLocal,
    /// List the current call stack
    Where,
    /// Terminate the debugger
    Quit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Break { file, line } => write!(f, "break {}:{}", file.display(), line),
            Command::Start => f.write_str("start"),
            Command::Continue => f.write_str("c"),
            Command::Next => f.write_str("next"),
            Command::Step => f.write_str("step"),
            Command::VarLocal => f.write_str("var local"),
            Command::Where => f.write_str("where"),
            Command::Quit => f.write_str("quit"),
        }
    }
}
