//! Requests received from a DAP frontend
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{SourceBreakpoint, StackFrameId, ThreadId, VariablesReference};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", content = "arguments", rename_all = "camelCase")]
#[non_exhaustive]
pub enum RequestBody {
    Initialize(Initialize),
    Launch(Launch),
    SetBreakpoints(SetBreakpoints),
    ConfigurationDone,
    Threads,
    StackTrace(StackTrace),
    Scopes(Scopes),
    Variables(Variables),
    Continue(Continue),
    Next(Next),
    StepIn(StepIn),
    StepOut(StepOut),
    Evaluate(Evaluate),
    Disconnect(Disconnect),
    // Catch-all for request commands this adapter does not handle - not part
    // of the serde tag/content
    #[serde(skip)]
    Unknown(String),
}

impl<'de> Deserialize<'de> for RequestBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        // Try to deserialize as a known request type first
        match serde_json::from_value::<RequestBodyHelper>(value.clone()) {
            Ok(helper) => Ok(helper.into()),
            Err(_) => {
                let command = value
                    .get("command")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                tracing::debug!(%command, "received unsupported request command");
                Ok(RequestBody::Unknown(command))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", content = "arguments", rename_all = "camelCase")]
enum RequestBodyHelper {
    Initialize(Initialize),
    Launch(Launch),
    SetBreakpoints(SetBreakpoints),
    ConfigurationDone,
    Threads,
    StackTrace(StackTrace),
    Scopes(Scopes),
    Variables(Variables),
    Continue(Continue),
    Next(Next),
    StepIn(StepIn),
    StepOut(StepOut),
    Evaluate(Evaluate),
    Disconnect(Disconnect),
}

impl From<RequestBodyHelper> for RequestBody {
    fn from(helper: RequestBodyHelper) -> Self {
        match helper {
            RequestBodyHelper::Initialize(args) => RequestBody::Initialize(args),
            RequestBodyHelper::Launch(args) => RequestBody::Launch(args),
            RequestBodyHelper::SetBreakpoints(args) => RequestBody::SetBreakpoints(args),
            RequestBodyHelper::ConfigurationDone => RequestBody::ConfigurationDone,
            RequestBodyHelper::Threads => RequestBody::Threads,
            RequestBodyHelper::StackTrace(args) => RequestBody::StackTrace(args),
            RequestBodyHelper::Scopes(args) => RequestBody::Scopes(args),
            RequestBodyHelper::Variables(args) => RequestBody::Variables(args),
            RequestBodyHelper::Continue(args) => RequestBody::Continue(args),
            RequestBodyHelper::Next(args) => RequestBody::Next(args),
            RequestBodyHelper::StepIn(args) => RequestBody::StepIn(args),
            RequestBodyHelper::StepOut(args) => RequestBody::StepOut(args),
            RequestBodyHelper::Evaluate(args) => RequestBody::Evaluate(args),
            RequestBodyHelper::Disconnect(args) => RequestBody::Disconnect(args),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Initialize {
    #[serde(rename = "adapterID")]
    pub adapter_id: Option<String>,
    #[serde(rename = "linesStartAt1")]
    pub lines_start_at_one: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Launch {
    pub program: PathBuf,
    #[serde(default)]
    pub stop_on_entry: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpoints {
    pub source: crate::types::Source,
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    pub lines: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scopes {
    pub frame_id: StackFrameId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    pub variables_reference: VariablesReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continue {
    pub thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Next {
    pub thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepIn {
    pub thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOut {
    pub thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub expression: String,
    pub frame_id: Option<StackFrameId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disconnect {
    pub restart: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_request_deserialization() {
        let body = serde_json::json!({
            "command": "setBreakpoints",
            "arguments": {
                "source": {"path": "/home/user/main.rb"},
                "lines": [4, 9],
            },
        });

        let parsed: RequestBody = serde_json::from_value(body).unwrap();
        let RequestBody::SetBreakpoints(args) = parsed else {
            panic!("unexpected request: {parsed:?}");
        };
        assert_eq!(args.lines, Some(vec![4, 9]));
    }

    #[test]
    fn bodyless_request_deserialization() {
        let body = serde_json::json!({"command": "configurationDone"});

        let parsed: RequestBody = serde_json::from_value(body).unwrap();
        assert!(matches!(parsed, RequestBody::ConfigurationDone));
    }

    #[test]
    fn unknown_request_deserialization() {
        let body = serde_json::json!({
            "command": "setExceptionBreakpoints",
            "arguments": {"filters": []},
        });

        let parsed: RequestBody = serde_json::from_value(body).unwrap();
        let RequestBody::Unknown(command) = parsed else {
            panic!("unexpected request: {parsed:?}");
        };
        assert_eq!(command, "setExceptionBreakpoints");
    }
}
