use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::WrapErr;
use tokio::sync::{mpsc, Mutex};

use dap_codec::events::OutputCategory;
use dap_codec::types;
use transport::{Command, Document, DocumentKind, Message, ProtocolError};

use crate::breakpoints::{self, BreakpointTable};
use crate::pending_requests::PendingRequests;
use crate::source::FileSource;
use crate::state::{SessionEvent, StopReason};

/// Script names belonging to the debugger itself. The call stack below the
/// first frame in one of these is debugger machinery, not user code.
const INTERNAL_SCRIPTS: &[&str] = &["ruby-debug-ide.rb", "rdebug-ide"];

/// All mutable state of one session. Owned behind an `Arc` by the public
/// [`crate::Debugger`] handle and the reply-routing task.
pub(crate) struct SessionInternals {
    client: transport::Client,
    events: mpsc::UnboundedSender<SessionEvent>,
    pending: Mutex<PendingRequests>,
    breakpoints: Mutex<BreakpointTable>,
    source: FileSource,
    /// Report the next suspension as a stop at the program entry
    entry_pending: AtomicBool,
}

impl SessionInternals {
    pub(crate) fn new(
        client: transport::Client,
        events: mpsc::UnboundedSender<SessionEvent>,
        source: FileSource,
        stop_on_entry: bool,
    ) -> Self {
        Self {
            client,
            events,
            pending: Mutex::new(PendingRequests::new()),
            breakpoints: Mutex::new(BreakpointTable::new()),
            source,
            entry_pending: AtomicBool::new(stop_on_entry),
        }
    }

    /// Route one reassembled message from the socket.
    pub(crate) async fn on_message(&self, message: Message) {
        match message {
            Message::Event(event) => self.on_event(event),
            Message::Document(document) => self.pending.lock().await.resolve(document),
        }
    }

    /// A reply failed to parse. The session carries on; the failure reaches
    /// the user as diagnostic output.
    pub(crate) fn on_protocol_error(&self, error: ProtocolError) {
        tracing::warn!(error = %error, "malformed reply from debugger");
        let _ = self.events.send(SessionEvent::Output {
            category: OutputCategory::Console,
            output: format!("malformed reply from debugger: {error}\n"),
        });
    }

    fn on_event(&self, event: transport::Event) {
        tracing::debug!(?event, "handling notification");
        match event {
            transport::Event::BreakpointHit { .. } => {
                self.entry_pending.store(false, Ordering::SeqCst);
                let _ = self.events.send(SessionEvent::Stopped {
                    reason: StopReason::Breakpoint,
                });
            }
            transport::Event::Suspended { .. } => {
                let reason = if self.entry_pending.swap(false, Ordering::SeqCst) {
                    StopReason::Entry
                } else {
                    StopReason::Step
                };
                let _ = self.events.send(SessionEvent::Stopped { reason });
            }
        }
    }

    /// Register interest in the next reply of `kind`, then write the command
    /// that triggers it. Registration comes first so the reply cannot arrive
    /// before its waiter exists.
    async fn request(&self, kind: DocumentKind, command: Command) -> eyre::Result<Document> {
        let rx = self.pending.lock().await.register(kind);
        self.client.execute(command).await?;
        rx.await.wrap_err("request superseded or connection closed")
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn set_breakpoints(
        &self,
        path: &Path,
        lines: &[usize],
    ) -> eyre::Result<Vec<types::Breakpoint>> {
        let placements: Vec<_> = lines
            .iter()
            .map(|&line| breakpoints::place(self.source.lines(), line))
            .collect();

        // the whole set for the path is replaced, not merged
        let stored = self.breakpoints.lock().await.replace(path, &placements);

        for breakpoint in &stored {
            self.client
                .execute(Command::Break {
                    file: path.to_path_buf(),
                    line: breakpoint.line,
                })
                .await
                .wrap_err("writing breakpoint command")?;
        }

        Ok(stored
            .iter()
            .map(|breakpoint| types::Breakpoint {
                id: Some(breakpoint.id),
                verified: breakpoint.verified,
                source: Some(source_for(path)),
                line: Some(breakpoint.line),
            })
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn stack_trace(&self) -> eyre::Result<Vec<types::StackFrame>> {
        let document = self.request(DocumentKind::Frames, Command::Where).await?;
        Ok(translate_frames(&self.source, &document))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn variables(
        &self,
        reference: types::VariablesReference,
    ) -> eyre::Result<Vec<types::Variable>> {
        let document = self
            .request(DocumentKind::Variables, Command::VarLocal)
            .await?;
        Ok(translate_variables(&document, reference))
    }

    pub(crate) async fn start(&self) -> eyre::Result<()> {
        self.client.execute(Command::Start).await
    }

    pub(crate) async fn resume(&self) -> eyre::Result<()> {
        self.client.execute(Command::Continue).await
    }

    pub(crate) async fn step_over(&self) -> eyre::Result<()> {
        self.client.execute(Command::Next).await
    }

    pub(crate) async fn step_in(&self) -> eyre::Result<()> {
        self.client.execute(Command::Step).await
    }

    pub(crate) async fn step_out(&self) -> eyre::Result<()> {
        // the wire protocol has no dedicated step-out command
        self.client.execute(Command::Next).await
    }

    pub(crate) async fn quit(&self) -> eyre::Result<()> {
        self.client.execute(Command::Quit).await
    }
}

/// Shape a `frames` reply into frontend stack frames.
///
/// Iteration stops at the first frame whose file belongs to the debugger:
/// everything below it is internal. Frames of unrecognised internal files
/// are not filtered.
fn translate_frames(source: &FileSource, document: &Document) -> Vec<types::StackFrame> {
    let mut frames = Vec::new();
    for (index, child) in document.root.children.iter().enumerate() {
        let Some(file) = child.attr("file") else {
            continue;
        };
        if is_internal_script(file) {
            break;
        }
        let line: usize = child
            .attr("line")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let label = source.line_text(line).unwrap_or_default().to_string();
        frames.push(types::StackFrame {
            id: index as types::StackFrameId,
            name: label,
            source: Some(source_for(Path::new(file))),
            line,
            column: 1,
        });
    }
    frames
}

/// Shape a `variables` reply into frontend variable records, tagged with the
/// container reference the caller asked about.
fn translate_variables(
    document: &Document,
    reference: types::VariablesReference,
) -> Vec<types::Variable> {
    document
        .root
        .children
        .iter()
        .filter_map(|child| {
            let name = child.attr("name")?;
            let value = child.attr("value")?;
            Some(types::Variable {
                name: name.to_string(),
                value: value.to_string(),
                variables_reference: reference,
            })
        })
        .collect()
}

fn source_for(path: &Path) -> types::Source {
    types::Source {
        name: path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string),
        path: Some(PathBuf::from(path)),
    }
}

fn is_internal_script(file: &str) -> bool {
    let base = Path::new(file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file);
    INTERNAL_SCRIPTS.contains(&base)
}
