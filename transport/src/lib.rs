//! Wire protocol spoken by the debugger over its debug socket.
//!
//! Commands are newline-terminated text lines; replies come back as an
//! unframed stream of XML fragments which [`codec::MessageDecoder`]
//! reassembles into discrete [`codec::Message`] values.

/// The port the debugger listens on once it reports readiness.
pub const DEFAULT_DEBUGGER_PORT: u16 = 1234;

pub mod client;
pub mod codec;
pub mod commands;
pub mod element;

pub use client::Client;
pub use codec::{Document, DocumentKind, Event, Message, MessageDecoder, ProtocolError};
pub use commands::Command;
