//! Dispatch between the frontend request stream and the debugging session.
use std::sync::Arc;

use eyre::WrapErr;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use dap_codec::base_message::{BaseMessage, Sendable};
use dap_codec::events::{Event, OutputCategory, OutputEventBody, StoppedEventBody, StoppedReason};
use dap_codec::requests::RequestBody;
use dap_codec::responses::{
    Capabilities, ContinueResponse, EvaluateResponse, Response, ResponseBody, ScopesResponse,
    SetBreakpointsResponse, StackTraceResponse, ThreadsResponse, VariablesResponse,
};
use dap_codec::types::{Seq, Thread};
use dap_codec::{DapDecoder, DapEncoder};
use debugger::{Debugger, LaunchArguments, SessionEvent, StopReason, THREAD_ID};

/// Session-independent settings from the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub port: Option<u16>,
    pub debugger: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Run the adapter over the given frontend byte streams until the frontend
/// disconnects or closes its end.
///
/// Requests that wait on a debugger reply resolve on their own task and hand
/// the finished response back through the deferred channel, so a reply the
/// debugger never completes leaves only that request unanswered while events
/// and later requests keep flowing.
pub async fn run<R, W>(input: R, output: W, options: Options) -> eyre::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut requests = FramedRead::new(input, DapDecoder::default());
    let mut emitter = Emitter::new(output);
    let (deferred_tx, mut deferred_rx) = mpsc::unbounded_channel();
    let mut session: Option<Arc<Debugger>> = None;
    let mut session_events: Option<mpsc::UnboundedReceiver<SessionEvent>> = None;
    let mut terminated_sent = false;

    loop {
        tokio::select! {
            request = requests.next() => {
                match request {
                    Some(Ok(message)) => {
                        let flow = handle_request(
                            message,
                            &options,
                            &mut emitter,
                            &mut session,
                            &mut session_events,
                            &deferred_tx,
                        )
                        .await?;
                        if flow == Flow::Exit {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "bad message from frontend");
                    }
                    None => {
                        tracing::debug!("frontend closed its stream");
                        break;
                    }
                }
            }
            event = next_session_event(&mut session_events) => {
                match event {
                    Some(event) => {
                        handle_session_event(event, &mut emitter, &mut terminated_sent).await?;
                    }
                    None => session_events = None,
                }
            }
            Some(response) = deferred_rx.recv() => {
                emitter.respond(response).await?;
            }
        }
    }

    Ok(())
}

/// Wait on session events once a session exists; before launch, park so the
/// select only sees frontend requests.
async fn next_session_event(
    events: &mut Option<mpsc::UnboundedReceiver<SessionEvent>>,
) -> Option<SessionEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_request<W>(
    message: BaseMessage,
    options: &Options,
    emitter: &mut Emitter<W>,
    session: &mut Option<Arc<Debugger>>,
    session_events: &mut Option<mpsc::UnboundedReceiver<SessionEvent>>,
    deferred: &mpsc::UnboundedSender<Response>,
) -> eyre::Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    let request_seq = message.seq;
    let Sendable::Request(body) = message.message else {
        tracing::warn!("ignoring non-request message from frontend");
        return Ok(Flow::Continue);
    };
    tracing::debug!(?body, seq = request_seq, "handling request");

    match body {
        RequestBody::Initialize(_) => {
            emitter
                .respond(Response::success(
                    request_seq,
                    ResponseBody::Initialize(Capabilities {
                        supports_configuration_done_request: Some(true),
                        ..Default::default()
                    }),
                ))
                .await?;
        }
        RequestBody::Launch(launch) => {
            let mut arguments = LaunchArguments::from_path(launch.program);
            arguments.debugger = options.debugger.clone();
            arguments.stop_on_entry = launch.stop_on_entry.unwrap_or(false);
            let launched = match options.port {
                Some(port) => Debugger::launch_on_port(port, arguments).await,
                None => Debugger::launch(arguments).await,
            };
            match launched {
                Ok((debugger, events)) => {
                    *session = Some(Arc::new(debugger));
                    *session_events = Some(events);
                    emitter
                        .respond(Response::success(request_seq, ResponseBody::Launch))
                        .await?;
                }
                Err(e) => {
                    // a failed launch is diagnostic output, not an adapter crash
                    emitter
                        .event(Event::Output(OutputEventBody {
                            category: OutputCategory::Stderr,
                            output: format!("{e:#}\n"),
                        }))
                        .await?;
                    emitter
                        .respond(Response::error(request_seq, format!("{e:#}")))
                        .await?;
                }
            }
        }
        RequestBody::SetBreakpoints(arguments) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            let Some(path) = arguments.source.path.clone() else {
                emitter
                    .respond(Response::error(request_seq, "breakpoint source has no path"))
                    .await?;
                return Ok(Flow::Continue);
            };
            let lines: Vec<usize> = match (arguments.breakpoints, arguments.lines) {
                (Some(breakpoints), _) => breakpoints.iter().map(|b| b.line).collect(),
                (None, Some(lines)) => lines,
                (None, None) => Vec::new(),
            };
            match debugger.set_breakpoints(&path, &lines).await {
                Ok(breakpoints) => {
                    emitter
                        .respond(Response::success(
                            request_seq,
                            ResponseBody::SetBreakpoints(SetBreakpointsResponse { breakpoints }),
                        ))
                        .await?;
                }
                Err(e) => {
                    emitter
                        .respond(Response::error(request_seq, format!("{e:#}")))
                        .await?;
                }
            }
        }
        RequestBody::ConfigurationDone => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            match debugger.configuration_done().await {
                Ok(()) => {
                    emitter
                        .respond(Response::success(
                            request_seq,
                            ResponseBody::ConfigurationDone,
                        ))
                        .await?;
                }
                Err(e) => {
                    emitter
                        .respond(Response::error(request_seq, format!("{e:#}")))
                        .await?;
                }
            }
        }
        RequestBody::Threads => {
            let threads = match session.as_ref() {
                Some(debugger) => debugger.threads(),
                None => vec![Thread {
                    id: THREAD_ID,
                    name: "main".to_string(),
                }],
            };
            emitter
                .respond(Response::success(
                    request_seq,
                    ResponseBody::Threads(ThreadsResponse { threads }),
                ))
                .await?;
        }
        RequestBody::StackTrace(_) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            let debugger = Arc::clone(debugger);
            let deferred = deferred.clone();
            tokio::spawn(async move {
                let response = match debugger.stack_trace().await {
                    Ok(stack_frames) => Response::success(
                        request_seq,
                        ResponseBody::StackTrace(StackTraceResponse { stack_frames }),
                    ),
                    Err(e) => Response::error(request_seq, format!("{e:#}")),
                };
                let _ = deferred.send(response);
            });
        }
        RequestBody::Scopes(arguments) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            let scopes = debugger.scopes(arguments.frame_id);
            emitter
                .respond(Response::success(
                    request_seq,
                    ResponseBody::Scopes(ScopesResponse { scopes }),
                ))
                .await?;
        }
        RequestBody::Variables(arguments) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            let debugger = Arc::clone(debugger);
            let deferred = deferred.clone();
            tokio::spawn(async move {
                let response = match debugger.variables(arguments.variables_reference).await {
                    Ok(variables) => Response::success(
                        request_seq,
                        ResponseBody::Variables(VariablesResponse { variables }),
                    ),
                    Err(e) => Response::error(request_seq, format!("{e:#}")),
                };
                let _ = deferred.send(response);
            });
        }
        RequestBody::Continue(_) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            match debugger.r#continue().await {
                Ok(()) => {
                    emitter
                        .respond(Response::success(
                            request_seq,
                            ResponseBody::Continue(ContinueResponse {
                                all_threads_continued: Some(true),
                            }),
                        ))
                        .await?;
                }
                Err(e) => {
                    emitter
                        .respond(Response::error(request_seq, format!("{e:#}")))
                        .await?;
                }
            }
        }
        RequestBody::Next(_) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            match debugger.step_over().await {
                Ok(()) => {
                    emitter
                        .respond(Response::success(request_seq, ResponseBody::Next))
                        .await?;
                }
                Err(e) => {
                    emitter
                        .respond(Response::error(request_seq, format!("{e:#}")))
                        .await?;
                }
            }
        }
        RequestBody::StepIn(_) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            match debugger.step_in().await {
                Ok(()) => {
                    emitter
                        .respond(Response::success(request_seq, ResponseBody::StepIn))
                        .await?;
                }
                Err(e) => {
                    emitter
                        .respond(Response::error(request_seq, format!("{e:#}")))
                        .await?;
                }
            }
        }
        RequestBody::StepOut(_) => {
            let Some(debugger) = session.as_ref() else {
                return no_session(emitter, request_seq).await;
            };
            match debugger.step_out().await {
                Ok(()) => {
                    emitter
                        .respond(Response::success(request_seq, ResponseBody::StepOut))
                        .await?;
                }
                Err(e) => {
                    emitter
                        .respond(Response::error(request_seq, format!("{e:#}")))
                        .await?;
                }
            }
        }
        RequestBody::Evaluate(arguments) => {
            let result = match session.as_ref() {
                Some(debugger) => debugger.evaluate(&arguments.expression),
                None => arguments.expression.clone(),
            };
            emitter
                .respond(Response::success(
                    request_seq,
                    ResponseBody::Evaluate(EvaluateResponse {
                        result,
                        variables_reference: 0,
                    }),
                ))
                .await?;
        }
        RequestBody::Disconnect(_) => {
            // quit goes to the debugger before the acknowledgement
            if let Some(debugger) = session.as_ref() {
                if let Err(e) = debugger.disconnect().await {
                    tracing::warn!(error = %e, "asking the debugger to quit");
                }
            }
            emitter
                .respond(Response::success(request_seq, ResponseBody::Disconnect))
                .await?;
            return Ok(Flow::Exit);
        }
        RequestBody::Unknown(command) => {
            emitter
                .respond(Response::error(
                    request_seq,
                    format!("unsupported request '{command}'"),
                ))
                .await?;
        }
        // `RequestBody` is `#[non_exhaustive]`; every variant it currently
        // defines is handled above, so this arm only satisfies the compiler.
        _ => unreachable!("unhandled RequestBody variant"),
    }

    Ok(Flow::Continue)
}

async fn no_session<W>(emitter: &mut Emitter<W>, request_seq: Seq) -> eyre::Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    emitter
        .respond(Response::error(request_seq, "no active debug session"))
        .await?;
    Ok(Flow::Continue)
}

async fn handle_session_event<W>(
    event: SessionEvent,
    emitter: &mut Emitter<W>,
    terminated_sent: &mut bool,
) -> eyre::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match event {
        SessionEvent::Initialised => emitter.event(Event::Initialized).await,
        SessionEvent::Stopped { reason } => {
            emitter
                .event(Event::Stopped(StoppedEventBody {
                    reason: stop_reason(reason),
                    thread_id: THREAD_ID,
                }))
                .await
        }
        SessionEvent::Output { category, output } => {
            emitter
                .event(Event::Output(OutputEventBody { category, output }))
                .await
        }
        SessionEvent::Terminated => {
            // process exit and socket close can both report termination
            if *terminated_sent {
                return Ok(());
            }
            *terminated_sent = true;
            emitter.event(Event::Terminated).await
        }
    }
}

fn stop_reason(reason: StopReason) -> StoppedReason {
    match reason {
        StopReason::Breakpoint => StoppedReason::Breakpoint,
        StopReason::Step => StoppedReason::Step,
        StopReason::Entry => StoppedReason::Entry,
    }
}

struct Emitter<W> {
    sink: FramedWrite<W, DapEncoder>,
    seq: Seq,
}

impl<W> Emitter<W>
where
    W: AsyncWrite + Unpin,
{
    fn new(output: W) -> Self {
        Self {
            sink: FramedWrite::new(output, DapEncoder::default()),
            seq: 0,
        }
    }

    async fn respond(&mut self, response: Response) -> eyre::Result<()> {
        self.send(Sendable::Response(response)).await
    }

    async fn event(&mut self, event: Event) -> eyre::Result<()> {
        self.send(Sendable::Event(event)).await
    }

    async fn send(&mut self, message: Sendable) -> eyre::Result<()> {
        self.seq += 1;
        self.sink
            .send(BaseMessage {
                seq: self.seq,
                message,
            })
            .await
            .wrap_err("writing to frontend")
    }
}
