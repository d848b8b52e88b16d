//! Content-Length framed codec for the frontend protocol stream.
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub mod base_message;
pub mod events;
pub mod requests;
pub mod responses;
pub mod types;

use base_message::BaseMessage;

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("invalid utf8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("invalid integer")]
    InvalidInteger(#[from] std::num::ParseIntError),
    #[error("missing content-length header")]
    MissingContentLengthHeader,
    #[error("deserializing message content")]
    Deserializing(#[from] serde_json::Error),
    #[error("reading underlying stream")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
pub struct DapDecoder {}

impl Decoder for DapDecoder {
    type Item = BaseMessage;

    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // skip to the start of the first header
        let Some(start_pos) = src
            .windows("Content-Length".len())
            .position(|s| s == b"Content-Length")
        else {
            return Ok(None);
        };

        src.advance(start_pos);

        let Some(split_point) = src.windows(4).position(|s| s == b"\r\n\r\n") else {
            return Ok(None);
        };

        let headers = &src[..split_point];
        let header_len = headers.len();
        let content_length = 'cl: {
            let headers_str = std::str::from_utf8(headers)?;
            for header_str in headers_str.split("\r\n") {
                let Some((key, value)) = header_str.split_once(':') else {
                    continue;
                };
                if key.trim() == "Content-Length" {
                    break 'cl value.trim().parse::<usize>()?;
                }
            }
            return Err(CodecError::MissingContentLengthHeader);
        };

        // check the buffer has enough bytes (including \r\n\r\n)
        let message_len_bytes = header_len + 4 + content_length;
        if src.len() < message_len_bytes {
            return Ok(None);
        }

        // consume the frame before parsing so a bad body cannot shift later frames
        let body = serde_json::from_slice(&src[header_len + 4..message_len_bytes]);
        src.advance(message_len_bytes);
        Ok(Some(body?))
    }
}

#[derive(Debug, Default)]
pub struct DapEncoder {}

impl Encoder<BaseMessage> for DapEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: BaseMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_string(&item)?;
        let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        dst.extend_from_slice(framed.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;
    use futures::prelude::*;
    use tokio_util::codec::FramedRead;

    use super::base_message::Sendable;
    use super::requests::RequestBody;
    use super::*;

    fn construct_message(message: &serde_json::Value) -> Vec<u8> {
        let body = serde_json::to_string(message).unwrap();
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    macro_rules! create_test {
        ($name:ident, $extra:expr, $($input:expr => $expected:pat),+) => {
            #[tokio::test]
            async fn $name() {
                let mut messages = bytes::BytesMut::new();
                $(
                    let input = construct_message(&$input);
                    messages.put(&input[..]);
                )+

                messages.put(&$extra[..]);

                let mut framed_read = FramedRead::new(&messages[..], DapDecoder::default());

                $(
                    let Some(msg) = framed_read.next().await else {
                        panic!()
                    };

                    let msg = msg.unwrap();
                    assert!(matches!(msg.message, $expected), "got message {:?}", msg);
                )+
            }
        };

        ($name:ident, $($input:expr => $expected:pat),+) => {
            create_test!($name, b"", $($input => $expected),+);
        };
    }

    create_test!(
        initialize,
        serde_json::json!({
            "seq": 1,
            "type": "request",
            "command": "initialize",
            "arguments": {"adapterID": "rdbg"},
        }) => Sendable::Request(RequestBody::Initialize(_))
    );

    create_test!(
        two_requests,
        serde_json::json!({
            "seq": 1,
            "type": "request",
            "command": "threads",
        }) => Sendable::Request(RequestBody::Threads),
        serde_json::json!({
            "seq": 2,
            "type": "request",
            "command": "configurationDone",
        }) => Sendable::Request(RequestBody::ConfigurationDone)
    );

    create_test!(
        remaining_data,
        b"Content-Len",
        serde_json::json!({
            "seq": 1,
            "type": "request",
            "command": "threads",
        }) => Sendable::Request(RequestBody::Threads)
    );

    #[test]
    fn decode_across_chunk_boundaries() {
        let message = construct_message(&serde_json::json!({
            "seq": 4,
            "type": "request",
            "command": "stackTrace",
            "arguments": {"threadId": 1},
        }));

        let mut decoder = DapDecoder::default();
        let mut buffer = BytesMut::new();

        // feed all but the last byte: no complete message yet
        buffer.put(&message[..message.len() - 1]);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.put(&message[message.len() - 1..]);
        let decoded = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(decoded.seq, 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn encode_decode_round_trip() {
        use super::events::Event;

        let outgoing = BaseMessage {
            seq: 9,
            message: Sendable::Event(Event::Terminated),
        };

        let mut encoder = DapEncoder::default();
        let mut buffer = BytesMut::new();
        encoder.encode(outgoing, &mut buffer).unwrap();

        let mut decoder = DapDecoder::default();
        let decoded = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(decoded.seq, 9);
        assert!(matches!(decoded.message, Sendable::Event(Event::Terminated)));
    }
}
