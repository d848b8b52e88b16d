use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use dap_codec::events::OutputCategory;
use dap_codec::types;
use server::{DebugServer, ProcessEvent, SERVER_READY_TIMEOUT};
use transport::DEFAULT_DEBUGGER_PORT;

use crate::internals::SessionInternals;
use crate::source::FileSource;
use crate::state::{LaunchArguments, SessionEvent};

/// The single thread exposed to the frontend.
pub const THREAD_ID: types::ThreadId = 1;

/// A live debugging session: one debugger process, one debug socket.
pub struct Debugger {
    internals: Arc<SessionInternals>,
    // keeps the debugger process alive for the lifetime of the session
    _server: Option<DebugServer>,
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debugger").finish_non_exhaustive()
    }
}

impl Debugger {
    /// Spawn the debugger for the program, wait for its readiness banner and
    /// connect to the debug socket.
    pub async fn launch(
        args: LaunchArguments,
    ) -> eyre::Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        Self::launch_on_port(DEFAULT_DEBUGGER_PORT, args).await
    }

    #[tracing::instrument(skip(args))]
    pub async fn launch_on_port(
        port: u16,
        args: LaunchArguments,
    ) -> eyre::Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let source = FileSource::load(&args.program)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (server, mut process_events) = match &args.debugger {
            Some(debugger) => DebugServer::with_debugger(debugger, &args.program)?,
            None => DebugServer::start(&args.program)?,
        };

        wait_for_ready(&mut process_events, &events_tx).await?;

        // keep forwarding process output for the rest of the session
        let forward_tx = events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = process_events.recv().await {
                forward_process_event(event, &forward_tx);
            }
        });

        tracing::debug!(port, "connecting to debugger socket");
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .wrap_err("connecting to debugger socket")?;

        let mut debugger = Self::over_stream(stream, source, args.stop_on_entry, events_tx);
        debugger._server = Some(server);
        Ok((debugger, events_rx))
    }

    /// Build a session over an already-connected debug socket.
    pub fn from_stream(
        stream: TcpStream,
        program: impl AsRef<Path>,
        stop_on_entry: bool,
    ) -> eyre::Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let source = FileSource::load(program.as_ref())?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let debugger = Self::over_stream(stream, source, stop_on_entry, events_tx);
        Ok((debugger, events_rx))
    }

    fn over_stream(
        stream: TcpStream,
        source: FileSource,
        stop_on_entry: bool,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (messages_tx, mut messages_rx) = mpsc::channel(100);
        let client = transport::Client::new(stream, messages_tx);
        let internals = Arc::new(SessionInternals::new(
            client,
            events_tx.clone(),
            source,
            stop_on_entry,
        ));

        let _ = events_tx.send(SessionEvent::Initialised);

        // route reassembled replies; a closed socket ends the session
        let routing_internals = Arc::clone(&internals);
        tokio::spawn(async move {
            while let Some(message) = messages_rx.recv().await {
                match message {
                    Ok(message) => routing_internals.on_message(message).await,
                    Err(error) => routing_internals.on_protocol_error(error),
                }
            }
            let _ = events_tx.send(SessionEvent::Terminated);
        });

        Self {
            internals,
            _server: None,
        }
    }

    /// Replace the breakpoint set for `path` and report each breakpoint's
    /// placement back to the frontend.
    pub async fn set_breakpoints(
        &self,
        path: impl AsRef<Path>,
        lines: &[usize],
    ) -> eyre::Result<Vec<types::Breakpoint>> {
        self.internals.set_breakpoints(path.as_ref(), lines).await
    }

    /// Configuration is complete: begin execution of the debuggee.
    pub async fn configuration_done(&self) -> eyre::Result<()> {
        self.internals.start().await
    }

    pub async fn stack_trace(&self) -> eyre::Result<Vec<types::StackFrame>> {
        self.internals.stack_trace().await
    }

    /// Every frame exposes exactly one scope holding its locals.
    pub fn scopes(&self, frame_id: types::StackFrameId) -> Vec<types::Scope> {
        vec![types::Scope {
            name: "Local".to_string(),
            variables_reference: frame_id + 1,
            expensive: false,
        }]
    }

    pub async fn variables(
        &self,
        reference: types::VariablesReference,
    ) -> eyre::Result<Vec<types::Variable>> {
        self.internals.variables(reference).await
    }

    pub fn threads(&self) -> Vec<types::Thread> {
        vec![types::Thread {
            id: THREAD_ID,
            name: "main".to_string(),
        }]
    }

    /// Resume execution of the debuggee.
    pub async fn r#continue(&self) -> eyre::Result<()> {
        self.internals.resume().await
    }

    /// Step over a statement.
    pub async fn step_over(&self) -> eyre::Result<()> {
        self.internals.step_over().await
    }

    /// Step into a statement.
    pub async fn step_in(&self) -> eyre::Result<()> {
        self.internals.step_in().await
    }

    /// Step out of a statement.
    pub async fn step_out(&self) -> eyre::Result<()> {
        self.internals.step_out().await
    }

    /// Expression evaluation is a plain echo.
    pub fn evaluate(&self, expression: &str) -> String {
        expression.to_string()
    }

    /// Ask the debugger to quit. Always writes the command, even when no
    /// other command was ever sent.
    pub async fn disconnect(&self) -> eyre::Result<()> {
        self.internals.quit().await
    }
}

async fn wait_for_ready(
    process_events: &mut mpsc::UnboundedReceiver<ProcessEvent>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> eyre::Result<()> {
    let deadline = tokio::time::Instant::now() + SERVER_READY_TIMEOUT;
    let mut collected = Vec::new();
    loop {
        let Ok(event) = tokio::time::timeout_at(deadline, process_events.recv()).await else {
            eyre::bail!(
                "timed out after {SERVER_READY_TIMEOUT:?} waiting for the debugger readiness banner\nCollected stderr:\n{}",
                collected.join("\n")
            );
        };
        match event {
            Some(ProcessEvent::Ready) => return Ok(()),
            Some(ProcessEvent::Exited(code)) => {
                eyre::bail!(
                    "debugger exited before becoming ready (status {code:?})\nCollected stderr:\n{}",
                    collected.join("\n")
                )
            }
            // output written before readiness still reaches the frontend
            Some(event) => {
                if let ProcessEvent::Stderr(line) = &event {
                    collected.push(line.clone());
                }
                forward_process_event(event, events);
            }
            None => eyre::bail!("debugger output ended before the readiness banner"),
        }
    }
}

fn forward_process_event(event: ProcessEvent, events: &mpsc::UnboundedSender<SessionEvent>) {
    match event {
        ProcessEvent::Stdout(line) => {
            let _ = events.send(SessionEvent::Output {
                category: OutputCategory::Stdout,
                output: format!("{line}\n"),
            });
        }
        ProcessEvent::Stderr(line) => {
            let _ = events.send(SessionEvent::Output {
                category: OutputCategory::Stderr,
                output: format!("{line}\n"),
            });
        }
        ProcessEvent::Exited(_) => {
            let _ = events.send(SessionEvent::Terminated);
        }
        ProcessEvent::Ready => {}
    }
}
