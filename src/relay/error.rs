//! Error types for the relay layer
//!
//! Protocol errors are per-message and never end a connection. Transport and
//! handler errors are fatal and become the relay's shutdown cause.

use std::io;
use thiserror::Error;

use super::message::MessageId;

/// Failure reading or writing a socket.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error on the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer is gone
    #[error("Connection closed")]
    Closed,
}

/// Malformed or unexpected message shape. Logged and dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message is not valid JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Message is JSON but not an object
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// A required envelope field is absent
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// An envelope field has the wrong type
    #[error("Invalid field '{0}'")]
    InvalidField(&'static str),

    /// A response arrived for a command nobody is waiting on
    #[error("Response for unknown command {0}")]
    UnknownResponse(MessageId),
}

/// Fatal relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Socket-level failure on either side
    #[error("Transport error on {side}: {source}")]
    Transport {
        /// Which socket failed
        side: super::message::Side,
        /// Underlying failure
        #[source]
        source: TransportError,
    },

    /// A message handler failed; first failure wins
    #[error("Handler failed: {0:#}")]
    Handler(anyhow::Error),

    /// The relay shut down before the command was answered
    #[error("Relay closed before a response arrived")]
    Closed,
}

/// Convenience result alias for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;
