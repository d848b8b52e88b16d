//! Responses sent back to the DAP frontend in reply to [`crate::requests`]
use serde::{Deserialize, Serialize};

use crate::types::{self, Scope, Seq, StackFrame, Thread, Variable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(rename = "request_seq")]
    pub request_seq: Seq,
    pub success: bool,
    pub message: Option<String>,
    #[serde(flatten)]
    pub body: Option<ResponseBody>,
}

impl Response {
    /// A successful reply to the request with sequence number `request_seq`.
    pub fn success(request_seq: Seq, body: ResponseBody) -> Self {
        Self {
            request_seq,
            success: true,
            message: None,
            body: Some(body),
        }
    }

    /// A failed reply carrying a diagnostic message.
    pub fn error(request_seq: Seq, message: impl Into<String>) -> Self {
        Self {
            request_seq,
            success: false,
            message: Some(message.into()),
            body: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "body", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ResponseBody {
    Initialize(Capabilities),
    Launch,
    SetBreakpoints(SetBreakpointsResponse),
    ConfigurationDone,
    Threads(ThreadsResponse),
    StackTrace(StackTraceResponse),
    Scopes(ScopesResponse),
    Variables(VariablesResponse),
    Continue(ContinueResponse),
    Next,
    StepIn,
    StepOut,
    Evaluate(EvaluateResponse),
    Disconnect,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: Option<bool>,
    pub supports_function_breakpoints: Option<bool>,
    pub supports_conditional_breakpoints: Option<bool>,
    pub supports_evaluate_for_hovers: Option<bool>,
    pub supports_step_back: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponse {
    pub breakpoints: Vec<types::Breakpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponse {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponse {
    pub stack_frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponse {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponse {
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub result: String,
    pub variables_reference: types::VariablesReference,
}
