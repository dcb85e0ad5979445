//! Message transports
//!
//! A [`Connection`] is a full-duplex socket split into a [`MessageSource`] and a
//! [`MessageSink`], each carrying one JSON document per message. Three framings
//! are provided: newline-delimited JSON over any tokio stream, WebSocket text
//! frames, and an in-memory endpoint pair used by tests and embedders.

use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

use super::error::TransportError;

/// Reading half of a socket.
pub trait MessageSource: Send + 'static {
    /// Receive one complete message. `None` means the peer closed the socket.
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>, TransportError>>;
}

/// Writing half of a socket.
pub trait MessageSink: Send + 'static {
    /// Transmit one complete message.
    fn send<'a>(&'a mut self, text: &'a str) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Close the socket.
    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// A full-duplex message socket.
pub struct Connection {
    pub(crate) source: Box<dyn MessageSource>,
    pub(crate) sink: Box<dyn MessageSink>,
}

impl Connection {
    /// Assemble a connection from its two halves.
    pub fn new(source: impl MessageSource, sink: impl MessageSink) -> Self {
        Self {
            source: Box::new(source),
            sink: Box::new(sink),
        }
    }

    /// Newline-delimited JSON over a byte stream.
    pub fn ndjson<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(
            NdjsonSource {
                reader: BufReader::new(reader),
                line: Vec::new(),
            },
            NdjsonSink { writer },
        )
    }

    /// One text frame per message over a WebSocket.
    pub fn websocket<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = stream.split();
        Self::new(WebSocketSource { stream }, WebSocketSink { sink })
    }
}

struct NdjsonSource<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
}

impl<R> MessageSource for NdjsonSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(async move {
            loop {
                self.line.clear();
                if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
                    return Ok(None);
                }
                let message = match std::str::from_utf8(&self.line) {
                    Ok(text) => text.trim(),
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping line that is not UTF-8");
                        continue;
                    }
                };
                if !message.is_empty() {
                    return Ok(Some(message.to_owned()));
                }
            }
        })
    }
}

struct NdjsonSink<W> {
    writer: W,
}

impl<W> MessageSink for NdjsonSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn send<'a>(&'a mut self, text: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.writer.write_all(text.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.writer.flush().await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.writer.shutdown().await?;
            Ok(())
        })
    }
}

struct WebSocketSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> MessageSource for WebSocketSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await {
                    None => return Ok(None),
                    Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => return Ok(Some(text)),
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping binary frame that is not UTF-8");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "peer closed WebSocket");
                        return Ok(None);
                    }
                    // Ping/pong are answered by tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(
                        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                    )) => return Ok(None),
                    Some(Err(err)) => return Err(err.into()),
                }
            }
        })
    }
}

struct WebSocketSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> MessageSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn send<'a>(&'a mut self, text: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.sink.send(Message::text(text.to_owned())).await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.sink.close().await?;
            Ok(())
        })
    }
}

/// One end of an in-memory socket pair.
///
/// Dropping an endpoint closes the socket for its peer.
#[derive(Debug)]
pub struct MemoryEndpoint {
    sender: mpsc::UnboundedSender<String>,
    receiver: mpsc::UnboundedReceiver<String>,
}

/// Create two connected in-memory endpoints.
pub fn memory_pair() -> (MemoryEndpoint, MemoryEndpoint) {
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();
    (
        MemoryEndpoint {
            sender: left_tx,
            receiver: right_rx,
        },
        MemoryEndpoint {
            sender: right_tx,
            receiver: left_rx,
        },
    )
}

impl MemoryEndpoint {
    /// Send a raw message to the peer.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.sender
            .send(text.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Send a JSON message to the peer.
    pub fn send_json(&self, value: &Value) -> Result<(), TransportError> {
        self.send_text(value.to_string())
    }

    /// Receive the next raw message, `None` once the peer is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Receive the next message and parse it as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.receiver.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Turn this endpoint into a relay connection.
    pub fn into_connection(self) -> Connection {
        Connection::new(
            MemorySource {
                receiver: self.receiver,
            },
            MemorySink {
                sender: Some(self.sender),
            },
        )
    }
}

struct MemorySource {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl MessageSource for MemorySource {
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(async move { Ok(self.receiver.recv().await) })
    }
}

struct MemorySink {
    sender: Option<mpsc::UnboundedSender<String>>,
}

impl MessageSink for MemorySink {
    fn send<'a>(&'a mut self, text: &'a str) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let sender = self.sender.as_ref().ok_or(TransportError::Closed)?;
            sender
                .send(text.to_owned())
                .map_err(|_| TransportError::Closed)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.sender.take();
            Ok(())
        })
    }
}
