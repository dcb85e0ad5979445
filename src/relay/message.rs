//! Wire envelope types for the command/event/response protocol.
//!
//! Every inbound message is decoded exactly once into an [`Envelope`]; nothing
//! downstream re-inspects raw JSON to figure out what kind of message it is.

use serde_json::{Map, Value, json};
use std::fmt;

use super::error::ProtocolError;

/// Identifies one attached runtime target. The empty string is the default session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session identifier from its wire representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The default (unnamed) session.
    pub fn default_session() -> Self {
        Self(String::new())
    }

    /// Wire representation of the session.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the default session.
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    fn from_envelope(message: &Map<String, Value>) -> Self {
        message
            .get("sessionId")
            .and_then(Value::as_str)
            .map(SessionId::new)
            .unwrap_or_default()
    }

    fn write_into(&self, message: &mut Map<String, Value>) {
        if !self.is_default() {
            message.insert("sessionId".into(), Value::String(self.0.clone()));
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl AsRef<SessionId> for SessionId {
    fn as_ref(&self) -> &SessionId {
        self
    }
}

/// Correlation key for one in-flight command: `(session, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    /// Session the command belongs to.
    pub session: SessionId,
    /// Numeric command id, unique within the sender.
    pub id: i64,
}

impl MessageId {
    /// Build a message id.
    pub fn new(session: SessionId, id: i64) -> Self {
        Self { session, id }
    }
}

impl AsRef<SessionId> for MessageId {
    fn as_ref(&self) -> &SessionId {
        &self.session
    }
}

impl From<MessageId> for SessionId {
    fn from(id: MessageId) -> Self {
        id.session
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session, self.id)
    }
}

/// Outcome of a command: exactly one of a success value or an error value.
#[derive(Debug, Clone, PartialEq)]
pub enum CdpResult {
    /// The `result` payload of a successful response.
    Ok(Value),
    /// The `error` payload of a failed response.
    Err(Value),
}

impl CdpResult {
    /// Successful result, normalised into the error arm when the payload
    /// describes an evaluation error (`result.subtype == "error"`).
    pub fn ok(value: Value) -> Self {
        let is_error = value
            .get("result")
            .and_then(|inner| inner.get("subtype"))
            .and_then(Value::as_str)
            == Some("error");
        if is_error {
            CdpResult::Err(value)
        } else {
            CdpResult::Ok(value)
        }
    }

    /// Error result.
    pub fn err(value: Value) -> Self {
        CdpResult::Err(value)
    }

    /// Empty success (`{}`).
    pub fn empty() -> Self {
        CdpResult::Ok(Value::Object(Map::new()))
    }

    /// Error result carrying a code and message.
    pub fn error_code(code: i64, message: impl Into<String>) -> Self {
        CdpResult::Err(json!({ "code": code, "message": message.into() }))
    }

    /// Read the result arm from a response envelope.
    pub fn from_response(message: &Map<String, Value>) -> Self {
        match (message.get("result"), message.get("error")) {
            (_, Some(error)) if !error.is_null() => CdpResult::Err(error.clone()),
            (Some(result), _) => CdpResult::ok(result.clone()),
            _ => CdpResult::empty(),
        }
    }

    /// True if this is the success arm.
    pub fn is_ok(&self) -> bool {
        matches!(self, CdpResult::Ok(_))
    }

    /// True if this is the error arm.
    pub fn is_err(&self) -> bool {
        matches!(self, CdpResult::Err(_))
    }

    /// The success payload, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            CdpResult::Ok(value) => Some(value),
            CdpResult::Err(_) => None,
        }
    }

    /// The error payload, if any.
    pub fn error(&self) -> Option<&Value> {
        match self {
            CdpResult::Ok(_) => None,
            CdpResult::Err(error) => Some(error),
        }
    }

    /// `result.value` of a `Runtime.evaluate` response, if present.
    pub fn evaluated(&self) -> Option<&Value> {
        self.value()
            .and_then(|value| value.get("result"))
            .and_then(|result| result.get("value"))
    }

    /// Encode as the response to `target`.
    pub fn to_response(&self, target: &MessageId) -> Value {
        let mut message = Map::new();
        message.insert("id".into(), Value::from(target.id));
        target.session.write_into(&mut message);
        match self {
            CdpResult::Ok(value) => message.insert("result".into(), value.clone()),
            CdpResult::Err(error) => message.insert("error".into(), error.clone()),
        };
        Value::Object(message)
    }
}

impl fmt::Display for CdpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdpResult::Ok(value) => write!(f, "ok({value})"),
            CdpResult::Err(error) => write!(f, "err({error})"),
        }
    }
}

/// Which end of the relay a message travelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The debugger front-end.
    Ide,
    /// The browser-hosted runtime.
    Runtime,
}

impl Side {
    pub(crate) fn index(self) -> usize {
        match self {
            Side::Ide => 0,
            Side::Runtime => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Ide => f.write_str("ide"),
            Side::Runtime => f.write_str("runtime"),
        }
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A request carrying an id and expecting a response.
    Command {
        /// Correlation key.
        id: MessageId,
        /// Protocol method name.
        method: String,
        /// Method parameters (`{}` when absent).
        params: Value,
    },
    /// A notification without an id.
    Event {
        /// Originating session.
        session: SessionId,
        /// Protocol method name.
        method: String,
        /// Event parameters (`{}` when absent).
        params: Value,
    },
    /// The answer to an earlier command.
    Response {
        /// Correlation key of the answered command.
        id: MessageId,
        /// Outcome of the command.
        result: CdpResult,
    },
}

impl Envelope {
    /// Decode one message received on `side`.
    ///
    /// Messages from the IDE are always commands. Messages from the runtime are
    /// responses when they carry an id and events otherwise.
    pub fn decode(side: Side, text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(message) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let session = SessionId::from_envelope(&message);
        let id = match message.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(raw.as_i64().ok_or(ProtocolError::InvalidField("id"))?),
        };

        match (side, id) {
            (Side::Ide, Some(id)) => Ok(Envelope::Command {
                id: MessageId::new(session, id),
                method: method_of(&message)?,
                params: params_of(&message),
            }),
            (Side::Ide, None) => Err(ProtocolError::MissingField("id")),
            (Side::Runtime, Some(id)) => Ok(Envelope::Response {
                id: MessageId::new(session, id),
                result: CdpResult::from_response(&message),
            }),
            (Side::Runtime, None) => Ok(Envelope::Event {
                session,
                method: method_of(&message)?,
                params: params_of(&message),
            }),
        }
    }
}

fn method_of(message: &Map<String, Value>) -> Result<String, ProtocolError> {
    message
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ProtocolError::MissingField("method"))
}

fn params_of(message: &Map<String, Value>) -> Value {
    match message.get("params") {
        Some(Value::Object(params)) => Value::Object(params.clone()),
        _ => Value::Object(Map::new()),
    }
}

/// Encode a command envelope `{sessionId?, id, method, params}`.
pub fn encode_command(id: &MessageId, method: &str, params: Value) -> Value {
    let mut message = Map::new();
    id.session.write_into(&mut message);
    message.insert("id".into(), Value::from(id.id));
    message.insert("method".into(), Value::String(method.to_owned()));
    message.insert("params".into(), params);
    Value::Object(message)
}

/// Encode an event envelope `{sessionId?, method, params}`.
pub fn encode_event(session: &SessionId, method: &str, params: Value) -> Value {
    let mut message = Map::new();
    session.write_into(&mut message);
    message.insert("method".into(), Value::String(method.to_owned()));
    message.insert("params".into(), params);
    Value::Object(message)
}
