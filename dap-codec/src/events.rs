//! Events emitted towards the DAP frontend
use serde::{Deserialize, Serialize};

use crate::types::{self, ThreadId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
#[non_exhaustive]
pub enum Event {
    Initialized,
    Stopped(StoppedEventBody),
    Output(OutputEventBody),
    Breakpoint(BreakpointEventBody),
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoppedReason {
    Breakpoint,
    Step,
    Entry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StoppedReason,
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    pub category: OutputCategory,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    pub reason: String,
    pub breakpoint: types::Breakpoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_event_serialization() {
        let event = Event::Stopped(StoppedEventBody {
            reason: StoppedReason::Breakpoint,
            thread_id: 1,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "stopped");
        assert_eq!(value["body"]["reason"], "breakpoint");
        assert_eq!(value["body"]["threadId"], 1);
    }

    #[test]
    fn output_event_serialization() {
        let event = Event::Output(OutputEventBody {
            category: OutputCategory::Stderr,
            output: "Fast Debugger (ruby-debug-ide) listens on 127.0.0.1:1234\n".to_string(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "output");
        assert_eq!(value["body"]["category"], "stderr");
    }

    #[test]
    fn breakpoint_event_serialization() {
        let event = Event::Breakpoint(BreakpointEventBody {
            reason: "changed".to_string(),
            breakpoint: types::Breakpoint {
                id: Some(2),
                verified: true,
                source: None,
                line: Some(4),
            },
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "breakpoint");
        assert_eq!(value["body"]["breakpoint"]["verified"], true);
    }
}
