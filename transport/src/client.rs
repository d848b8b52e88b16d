//! Handle around the actor owning the debugger socket
use bytes::BytesMut;
use futures::SinkExt;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedWrite};

use crate::codec::{CommandEncoder, Message, MessageDecoder, ProtocolError};
use crate::commands::Command;

/// Write half of the debugger connection.
///
/// Cloning the client shares the underlying connection. Reassembled replies
/// arrive on the channel given to [`Client::new`]; malformed replies are
/// delivered as errors so they can be surfaced without ending the session.
/// The channel closes when the socket does.
#[derive(Clone)]
pub struct Client {
    sender: mpsc::Sender<Command>,
}

impl Client {
    pub fn new(stream: TcpStream, messages: mpsc::Sender<Result<Message, ProtocolError>>) -> Self {
        let (sender, receiver) = mpsc::channel(100);
        tokio::spawn(handle_connection(stream, receiver, messages));
        Self { sender }
    }

    /// Write one command to the debugger.
    pub async fn execute(&self, command: Command) -> eyre::Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| eyre::eyre!("debugger connection closed"))
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut commands: mpsc::Receiver<Command>,
    messages: mpsc::Sender<Result<Message, ProtocolError>>,
) {
    let (mut read, write) = stream.into_split();
    let mut sink = FramedWrite::new(write, CommandEncoder::default());
    let mut decoder = MessageDecoder::default();
    let mut buffer = BytesMut::with_capacity(4096);

    'connection: loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                tracing::debug!(%command, "sending command");
                if let Err(e) = sink.send(command).await {
                    tracing::warn!(error = %e, "writing command");
                    break;
                }
            }
            result = read.read_buf(&mut buffer) => {
                match result {
                    // socket closed
                    Ok(0) => break,
                    Ok(_) => loop {
                        // the decoder consumes malformed bytes, so draining
                        // continues past an error
                        match decoder.decode(&mut buffer) {
                            Ok(Some(message)) => {
                                if messages.send(Ok(message)).await.is_err() {
                                    break 'connection;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                if messages.send(Err(e)).await.is_err() {
                                    break 'connection;
                                }
                            }
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "reading from debugger socket");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("debugger connection closed");
}
