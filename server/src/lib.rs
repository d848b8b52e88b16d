//! Supervision of the background debugger process.
//!
//! The debuggee runs under the debugger executable, which prints a readiness
//! banner to stderr once its debug socket is listening. All process output is
//! forwarded line by line so the adapter can surface it to the frontend.
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use eyre::WrapErr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Executable used to run the debuggee under the debugger.
pub const DEFAULT_DEBUGGER_PROGRAM: &str = "rdebug-ide";

/// Prefix of the stderr line the debugger prints once its socket is listening.
pub const READY_PREFIX: &str = "Fast Debugger";

/// How long the adapter waits for the readiness banner before giving up.
pub const SERVER_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Output and lifecycle notifications from the debugger process.
///
/// Lines of one stream arrive in the order the process wrote them; `Ready`
/// follows the stderr line that carried the banner; `Exited` follows all
/// output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Ready,
    Exited(Option<i32>),
}

/// A running debugger process. Dropping the handle kills the child.
pub struct DebugServer {
    monitor: JoinHandle<()>,
}

impl DebugServer {
    /// Spawn the debugger for `program`, in `program`'s directory.
    pub fn start(program: &Path) -> eyre::Result<(Self, mpsc::UnboundedReceiver<ProcessEvent>)> {
        Self::with_debugger(DEFAULT_DEBUGGER_PROGRAM, program)
    }

    pub fn with_debugger(
        debugger: impl AsRef<OsStr>,
        program: &Path,
    ) -> eyre::Result<(Self, mpsc::UnboundedReceiver<ProcessEvent>)> {
        let debugger = debugger.as_ref();
        let cwd = match program.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        tracing::debug!(
            debugger = %debugger.to_string_lossy(),
            program = %program.display(),
            "starting debugger process"
        );
        let mut child = Command::new(debugger)
            .arg(program)
            .arg("-xd")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(cwd)
            .kill_on_drop(true)
            .spawn()
            .wrap_err("spawning debugger process")?;

        let (tx, rx) = mpsc::unbounded_channel();

        let stdout = child.stdout.take().unwrap();
        let stdout_tx = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stdout_tx.send(ProcessEvent::Stdout(line)).is_err() {
                    break;
                }
            }
        });

        let stderr = child.stderr.take().unwrap();
        let stderr_tx = tx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut should_signal = true;
            while let Ok(Some(line)) = lines.next_line().await {
                let ready = should_signal && line.starts_with(READY_PREFIX);
                if stderr_tx.send(ProcessEvent::Stderr(line)).is_err() {
                    break;
                }
                if ready {
                    should_signal = false;
                    if stderr_tx.send(ProcessEvent::Ready).is_err() {
                        break;
                    }
                }
            }
        });

        // exit is reported only after both output streams have drained
        let monitor = tokio::spawn(async move {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            match child.wait().await {
                Ok(status) => {
                    tracing::debug!(%status, "debugger process exited");
                    let _ = tx.send(ProcessEvent::Exited(status.code()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "waiting for debugger process");
                    let _ = tx.send(ProcessEvent::Exited(None));
                }
            }
        });

        Ok((Self { monitor }, rx))
    }
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        tracing::debug!("terminating debugger process");
        // aborting the monitor drops the child, which kills the process
        self.monitor.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a shell script through `sh <script> -xd` as a stand-in debugger.
    fn fake_debugger(
        name: &str,
        script: &str,
    ) -> eyre::Result<(DebugServer, mpsc::UnboundedReceiver<ProcessEvent>)> {
        let path = std::env::temp_dir().join(format!("{name}-{}.sh", std::process::id()));
        std::fs::write(&path, script)?;
        DebugServer::with_debugger("sh", &path)
    }

    async fn collect_until_exit(
        rx: &mut mpsc::UnboundedReceiver<ProcessEvent>,
    ) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for process events")
                .expect("event channel closed before the process exited");
            let done = matches!(event, ProcessEvent::Exited(_));
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn readiness_banner_is_detected_on_stderr() {
        let (_server, mut rx) = fake_debugger(
            "ready",
            "echo out-line\n\
             echo 'Fast Debugger (test) listens on 127.0.0.1:1234' >&2\n",
        )
        .unwrap();

        let events = collect_until_exit(&mut rx).await;

        assert!(events.contains(&ProcessEvent::Stdout("out-line".to_string())));
        let banner = events
            .iter()
            .position(|e| matches!(e, ProcessEvent::Stderr(line) if line.starts_with(READY_PREFIX)))
            .expect("banner forwarded as stderr output");
        let ready = events
            .iter()
            .position(|e| matches!(e, ProcessEvent::Ready))
            .expect("readiness detected");
        assert!(ready > banner);
        assert_eq!(events.last(), Some(&ProcessEvent::Exited(Some(0))));
    }

    #[tokio::test]
    async fn banner_on_stdout_is_not_readiness() {
        let (_server, mut rx) = fake_debugger("stdout-banner", "echo 'Fast Debugger'\n").unwrap();

        let events = collect_until_exit(&mut rx).await;
        assert!(!events.contains(&ProcessEvent::Ready));
    }

    #[tokio::test]
    async fn readiness_is_signalled_once() {
        let (_server, mut rx) = fake_debugger(
            "double-banner",
            "echo 'Fast Debugger' >&2\necho 'Fast Debugger' >&2\n",
        )
        .unwrap();

        let events = collect_until_exit(&mut rx).await;
        let ready_count = events
            .iter()
            .filter(|e| matches!(e, ProcessEvent::Ready))
            .count();
        assert_eq!(ready_count, 1);
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let result = DebugServer::with_debugger(
            "definitely-not-an-installed-debugger",
            Path::new("/tmp/app.rb"),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dropping_the_handle_kills_the_child() {
        let (server, mut rx) = fake_debugger("long-lived", "sleep 60\n").unwrap();

        drop(server);

        // the reader tasks see EOF once the child dies and the channel closes
        let closed = tokio::time::timeout(Duration::from_secs(10), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
