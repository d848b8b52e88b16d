//! Reassembly of structured replies from the debugger's unframed byte stream.
//!
//! The socket delivers arbitrary chunks: one reply may span many reads, a
//! single read may carry several complete replies back to back, and a chunk
//! boundary may fall in the middle of a tag. Replies are classified by their
//! root tag alone. Standalone self-closed elements are notifications and are
//! surfaced as soon as their bytes are complete; `frames`, `variables` and
//! `breakpoints` trees accumulate until the matching root end tag arrives.
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::commands::Command;
use crate::element::{self, Element};

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("malformed reply: {0}")]
    Malformed(#[from] element::ParseError),
    #[error("closing tag without a matching open tag")]
    UnbalancedClose,
    #[error("unknown reply root '{0}'")]
    UnknownRoot(String),
    #[error("notification is missing its '{0}' attribute")]
    MissingAttribute(&'static str),
    #[error("invalid line attribute")]
    InvalidLine(#[from] std::num::ParseIntError),
    #[error("text outside of any reply: {0:?}")]
    StrayText(String),
    #[error("invalid utf8 in reply")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("reading underlying stream")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Frames,
    Variables,
    Breakpoints,
}

impl DocumentKind {
    fn from_root(name: &str) -> Option<Self> {
        match name {
            "frames" => Some(DocumentKind::Frames),
            "variables" => Some(DocumentKind::Variables),
            "breakpoints" => Some(DocumentKind::Breakpoints),
            _ => None,
        }
    }
}

/// One complete structured reply reconstructed from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub kind: DocumentKind,
    pub root: Element,
}

/// A standalone notification requiring no reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BreakpointHit { file: String, line: usize },
    Suspended { file: String, line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Event(Event),
    Document(Document),
}

/// Reassembly state: `Idle` between replies, otherwise the root kind of the
/// reply whose end tag has not arrived yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeState {
    #[default]
    Idle,
    Accumulating(DocumentKind),
}

#[derive(Debug, Default)]
pub struct MessageDecoder {
    state: DecodeState,
}

impl MessageDecoder {
    pub fn state(&self) -> DecodeState {
        self.state
    }
}

impl Decoder for MessageDecoder {
    type Item = Message;

    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // drop whitespace between replies
        let blank = src
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        src.advance(blank);
        if src.is_empty() {
            self.state = DecodeState::Idle;
            return Ok(None);
        }

        if src[0] != b'<' {
            let end = src
                .iter()
                .position(|&b| b == b'<')
                .unwrap_or(src.len());
            let stray = src.split_to(end);
            self.state = DecodeState::Idle;
            return Err(ProtocolError::StrayText(
                String::from_utf8_lossy(&stray).into_owned(),
            ));
        }

        match scan_reply(src) {
            Ok(Scan::Incomplete(kind)) => {
                self.state = match kind {
                    Some(kind) => DecodeState::Accumulating(kind),
                    None => DecodeState::Idle,
                };
                Ok(None)
            }
            Ok(Scan::Complete(len)) => {
                let raw = src.split_to(len);
                self.state = DecodeState::Idle;
                let text = std::str::from_utf8(&raw)?;
                let root = element::parse(text)?;
                classify(root).map(Some)
            }
            Err(e) => {
                // drop the unparseable accumulation so the stream can continue
                src.clear();
                self.state = DecodeState::Idle;
                Err(e)
            }
        }
    }
}

enum Scan {
    /// The reply's end tag has not arrived; the kind is known once the root
    /// open tag is complete.
    Incomplete(Option<DocumentKind>),
    /// A complete reply occupies the first `len` bytes of the buffer.
    Complete(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagShape {
    Open,
    Close,
    SelfClosed,
}

fn scan_reply(buf: &[u8]) -> Result<Scan, ProtocolError> {
    let mut pos = 0;
    let mut depth = 0usize;
    let mut kind = None;

    loop {
        // move to the next tag, skipping any bytes between child elements
        while pos < buf.len() && buf[pos] != b'<' {
            pos += 1;
        }
        if pos >= buf.len() {
            return Ok(Scan::Incomplete(kind));
        }
        let Some((shape, len)) = scan_tag(&buf[pos..]) else {
            // chunk boundary fell inside the tag
            return Ok(Scan::Incomplete(kind));
        };
        if depth == 0 && shape == TagShape::Open {
            kind = std::str::from_utf8(tag_name(&buf[pos..]))
                .ok()
                .and_then(DocumentKind::from_root);
        }
        pos += len;
        match shape {
            TagShape::Open => depth += 1,
            TagShape::SelfClosed => {
                if depth == 0 {
                    return Ok(Scan::Complete(pos));
                }
            }
            TagShape::Close => {
                if depth == 0 {
                    return Err(ProtocolError::UnbalancedClose);
                }
                depth -= 1;
                if depth == 0 {
                    return Ok(Scan::Complete(pos));
                }
            }
        }
    }
}

/// Scan one tag starting at `buf[0] == b'<'`. Returns `None` while the tag
/// is incomplete. A `>` inside a quoted attribute value does not end the tag.
fn scan_tag(buf: &[u8]) -> Option<(TagShape, usize)> {
    let closing = buf.len() > 1 && buf[1] == b'/';
    let mut quote: Option<u8> = None;
    let mut idx = 1;
    while idx < buf.len() {
        let byte = buf[idx];
        match quote {
            Some(q) => {
                if byte == q {
                    quote = None;
                }
            }
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'>' => {
                    let shape = if closing {
                        TagShape::Close
                    } else if buf[idx - 1] == b'/' {
                        TagShape::SelfClosed
                    } else {
                        TagShape::Open
                    };
                    return Some((shape, idx + 1));
                }
                _ => {}
            },
        }
        idx += 1;
    }
    None
}

fn tag_name(buf: &[u8]) -> &[u8] {
    let end = buf[1..]
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-'))
        .map(|offset| offset + 1)
        .unwrap_or(buf.len());
    &buf[1..end]
}

fn classify(root: Element) -> Result<Message, ProtocolError> {
    if root.name == "breakpoint" && root.children.is_empty() {
        return Ok(Message::Event(Event::BreakpointHit {
            file: required_attr(&root, "file")?,
            line: line_attr(&root)?,
        }));
    }
    if root.name == "suspended" {
        return Ok(Message::Event(Event::Suspended {
            file: required_attr(&root, "file")?,
            line: line_attr(&root)?,
        }));
    }
    match DocumentKind::from_root(&root.name) {
        Some(kind) => Ok(Message::Document(Document { kind, root })),
        None => Err(ProtocolError::UnknownRoot(root.name.clone())),
    }
}

fn required_attr(element: &Element, name: &'static str) -> Result<String, ProtocolError> {
    element
        .attr(name)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingAttribute(name))
}

fn line_attr(element: &Element) -> Result<usize, ProtocolError> {
    Ok(required_attr(element, "line")?.parse()?)
}

#[derive(Debug, Default)]
pub struct CommandEncoder {}

impl Encoder<Command> for CommandEncoder {
    type Error = ProtocolError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(format!("{item}\n").as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAMES: &str = concat!(
        "<frames>",
        "<frame no=\"1\" file=\"/src/user.rb\" line=\"2\"/>",
        "<frame no=\"2\" file=\"/src/user.rb\" line=\"9\"/>",
        "</frames>",
    );

    fn decode_all(decoder: &mut MessageDecoder, buffer: &mut BytesMut) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = decoder.decode(buffer).expect("decoding") {
            messages.push(message);
        }
        messages
    }

    fn decode_unfragmented(raw: &str) -> Message {
        let mut decoder = MessageDecoder::default();
        let mut buffer = BytesMut::from(raw.as_bytes());
        decoder
            .decode(&mut buffer)
            .expect("decoding")
            .expect("a complete message")
    }

    #[test]
    fn every_split_point_yields_the_unfragmented_document() {
        let expected = decode_unfragmented(FRAMES);
        let raw = FRAMES.as_bytes();

        for split in 1..raw.len() {
            let mut decoder = MessageDecoder::default();
            let mut buffer = BytesMut::new();

            buffer.extend_from_slice(&raw[..split]);
            let mut messages = decode_all(&mut decoder, &mut buffer);

            buffer.extend_from_slice(&raw[split..]);
            messages.extend(decode_all(&mut decoder, &mut buffer));

            assert_eq!(messages.len(), 1, "split at byte {split}");
            assert_eq!(messages[0], expected, "split at byte {split}");
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn multiple_documents_in_one_chunk() {
        let mut decoder = MessageDecoder::default();
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(
            format!("{FRAMES}\n<variables><variable name=\"i\" value=\"1\"/></variables>\n")
                .as_bytes(),
        );

        let messages = decode_all(&mut decoder, &mut buffer);
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0],
            Message::Document(Document { kind: DocumentKind::Frames, .. })
        ));
        assert!(matches!(
            &messages[1],
            Message::Document(Document { kind: DocumentKind::Variables, .. })
        ));
    }

    #[test]
    fn events_are_dispatched_before_a_document_completes() {
        let mut decoder = MessageDecoder::default();
        let mut buffer = BytesMut::new();

        // a complete notification followed by the start of a document
        buffer.extend_from_slice(b"<breakpoint file=\"/src/user.rb\" line=\"4\"/><frames><frame no=\"1\" fi");
        let messages = decode_all(&mut decoder, &mut buffer);
        assert_eq!(
            messages,
            vec![Message::Event(Event::BreakpointHit {
                file: "/src/user.rb".to_string(),
                line: 4,
            })]
        );
        assert_eq!(decoder.state(), DecodeState::Accumulating(DocumentKind::Frames));

        // the rest of the document, then another notification
        buffer.extend_from_slice(
            b"le=\"/src/user.rb\" line=\"2\"/></frames><suspended file=\"/src/user.rb\" line=\"2\"/>",
        );
        let messages = decode_all(&mut decoder, &mut buffer);
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0],
            Message::Document(Document { kind: DocumentKind::Frames, .. })
        ));
        assert_eq!(
            messages[1],
            Message::Event(Event::Suspended {
                file: "/src/user.rb".to_string(),
                line: 2,
            })
        );
        assert_eq!(decoder.state(), DecodeState::Idle);
    }

    #[test]
    fn breakpoint_children_stay_inside_the_acknowledgement() {
        let mut decoder = MessageDecoder::default();
        let mut buffer = BytesMut::from(
            "<breakpoints><breakpoint n=\"1\" file=\"/src/user.rb\" line=\"4\"/></breakpoints>"
                .as_bytes(),
        );

        let messages = decode_all(&mut decoder, &mut buffer);
        assert_eq!(messages.len(), 1);
        let Message::Document(document) = &messages[0] else {
            panic!("expected a document, got {:?}", messages[0]);
        };
        assert_eq!(document.kind, DocumentKind::Breakpoints);
        assert_eq!(document.root.children.len(), 1);
    }

    #[test]
    fn quoted_angle_bracket_does_not_end_a_tag() {
        let raw = "<variables><variable name=\"cmp\" value=\"a > b\"/></variables>";
        let Message::Document(document) = decode_unfragmented(raw) else {
            panic!("expected a document");
        };
        assert_eq!(document.root.children[0].attr("value"), Some("a > b"));
    }

    #[test]
    fn stray_text_is_consumed_and_reported() {
        let mut decoder = MessageDecoder::default();
        let mut buffer =
            BytesMut::from("oops<suspended file=\"/src/user.rb\" line=\"7\"/>".as_bytes());

        let error = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(error, ProtocolError::StrayText(_)));

        // the stream continues after the malformed bytes
        let message = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(matches!(message, Message::Event(Event::Suspended { .. })));
    }

    #[test]
    fn unknown_root_is_an_error() {
        let mut decoder = MessageDecoder::default();
        let mut buffer = BytesMut::from("<banana/>".as_bytes());

        let error = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(error, ProtocolError::UnknownRoot(name) if name == "banana"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn encoder_terminates_commands_with_a_newline() {
        let mut encoder = CommandEncoder::default();
        let mut buffer = BytesMut::new();
        encoder.encode(Command::Where, &mut buffer).unwrap();
        encoder
            .encode(
                Command::Break {
                    file: "/src/user.rb".into(),
                    line: 4,
                },
                &mut buffer,
            )
            .unwrap();

        assert_eq!(&buffer[..], b"where\nbreak /src/user.rb:4\n");
    }
}
