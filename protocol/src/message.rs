//! JSON-RPC 2.0 message model.
//!
//! Outgoing messages ([`Request`], [`Notification`], [`Response`]) are
//! validated at construction, so anything wrapped in a [`Message`] can be
//! framed. Incoming frames are decoded into the schema-light [`RawMessage`]
//! and classified by field presence via [`RawMessage::classify`].

use std::fmt;
use std::num::NonZeroU64;

use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("method name must not be empty")]
    EmptyMethod,
    #[error("params for '{method}' must be an object or array, got {kind}")]
    UnstructuredParams { method: String, kind: &'static str },
    #[error("response must not carry both result and error")]
    ResultAndError,
}

/// Client-assigned request id. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(NonZeroU64);

impl RequestId {
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn from_u64(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_call(method: &str, params: Option<&Value>) -> Result<(), MessageError> {
    if method.is_empty() {
        return Err(MessageError::EmptyMethod);
    }
    match params {
        None | Some(Value::Object(_) | Value::Array(_)) => Ok(()),
        Some(other) => Err(MessageError::UnstructuredParams {
            method: method.to_string(),
            kind: value_kind(other),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    jsonrpc: &'static str,
    id: RequestId,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl Request {
    pub fn new(
        id: RequestId,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Self, MessageError> {
        let method = method.into();
        validate_call(&method, params.as_ref())?;
        Ok(Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        })
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Result<Self, MessageError> {
        let method = method.into();
        validate_call(&method, params.as_ref())?;
        Ok(Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        })
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }
}

/// A response, either built locally (replies to server requests) or decoded
/// from the server.
///
/// `id` is `Value::Null` for malformed or unsolicited responses. Decoded
/// responses may carry neither or both of `result`/`error`; locally built
/// ones carry exactly one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl Response {
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(serde_json::json!({
                "code": code,
                "message": message.into(),
            })),
        }
    }

    /// Reply for a server-to-client request the harness does not implement.
    #[must_use]
    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::failure(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    fn from_parts(id: Option<Value>, result: Option<Value>, error: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.unwrap_or(Value::Null),
            result,
            error,
        }
    }

    #[must_use]
    pub fn id(&self) -> &Value {
        &self.id
    }

    /// The id as one of our own request ids, if it is one.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.id.as_u64().and_then(RequestId::from_u64)
    }

    /// The `result` member. An explicit JSON `null` result is `Some(Value::Null)`.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// `"<code>: <message>"` for error responses.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        Some(match error.get("code").and_then(Value::as_i64) {
            Some(code) => format!("{code}: {message}"),
            None => message.to_string(),
        })
    }

    fn validate(&self) -> Result<(), MessageError> {
        if self.result.is_some() && self.error.is_some() {
            return Err(MessageError::ResultAndError);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    /// Re-check the construction invariants. Called by the encoder before
    /// anything reaches the wire.
    pub fn validate(&self) -> Result<(), MessageError> {
        match self {
            Message::Request(req) => validate_call(&req.method, req.params.as_ref()),
            Message::Notification(notif) => validate_call(&notif.method, notif.params.as_ref()),
            Message::Response(resp) => resp.validate(),
        }
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::Request(value)
    }
}

impl From<Notification> for Message {
    fn from(value: Notification) -> Self {
        Message::Notification(value)
    }
}

impl From<Response> for Message {
    fn from(value: Response) -> Self {
        Message::Response(value)
    }
}

/// The generic shape of a decoded frame: every member optional.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawMessage {
    pub id: Option<Value>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl RawMessage {
    /// Split a JSON object into its JSON-RPC members.
    ///
    /// Returns `None` if `value` is not an object. A non-string `method` is
    /// treated as absent.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        Some(Self {
            id: map.remove("id"),
            method: match map.remove("method") {
                Some(Value::String(method)) => Some(method),
                _ => None,
            },
            params: map.remove("params"),
            result: map.remove("result"),
            error: map.remove("error"),
        })
    }

    /// Classify by member presence.
    ///
    /// A `method` makes it a call (non-null `id`) or a notification. Without
    /// `method`, an `id`, `result` or `error` makes it a response.
    #[must_use]
    pub fn classify(self) -> Incoming {
        let has_outcome = self.result.is_some() || self.error.is_some();
        match (self.method, self.id) {
            (Some(method), Some(id)) if !id.is_null() => Incoming::ServerRequest {
                id,
                method,
                params: self.params,
            },
            (Some(method), _) => Incoming::Notification {
                method,
                params: self.params,
            },
            (None, Some(id)) => {
                Incoming::Response(Response::from_parts(Some(id), self.result, self.error))
            }
            (None, None) if has_outcome => {
                Incoming::Response(Response::from_parts(None, self.result, self.error))
            }
            (None, None) => Incoming::Unclassified(RawMessage {
                params: self.params,
                ..RawMessage::default()
            }),
        }
    }
}

/// A classified server-to-client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A call from the server that expects a reply.
    ServerRequest {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response(Response),
    /// Neither a call nor a response.
    Unclassified(RawMessage),
}

impl Incoming {
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Incoming::ServerRequest { method, .. } | Incoming::Notification { method, .. } => {
                Some(method)
            }
            Incoming::Response(_) | Incoming::Unclassified(_) => None,
        }
    }

    #[must_use]
    pub fn params(&self) -> Option<&Value> {
        match self {
            Incoming::ServerRequest { params, .. } | Incoming::Notification { params, .. } => {
                params.as_ref()
            }
            Incoming::Response(_) | Incoming::Unclassified(_) => None,
        }
    }
}
