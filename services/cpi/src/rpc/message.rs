//! Wire messages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::dispatch::DispatchError;
use crate::error::{CpiError, ErrorKind};

/// A single CPI request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub method: String,
    pub arguments: Vec<Value>,
    /// Opaque orchestrator context, passed through untouched.
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<u32>,
}

impl ActionRequest {
    /// Request id assigned by the orchestrator, when present.
    pub fn request_id(&self) -> Option<&str> {
        self.context.get("request_id").and_then(Value::as_str)
    }
}

/// Error details reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub ok_to_retry: bool,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            ok_to_retry: kind.ok_to_retry(),
        }
    }
}

impl From<&DispatchError> for ErrorEnvelope {
    fn from(err: &DispatchError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<&CpiError> for ErrorEnvelope {
    fn from(err: &CpiError) -> Self {
        Self::new(err.kind(), err.message())
    }
}

/// A single CPI response: a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    /// Success. The value may itself be `null`.
    Result(Value),
    Error(ErrorEnvelope),
}

impl ActionResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ActionResponse::Error(_))
    }
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorEnvelope>,
    #[serde(default)]
    log: String,
}

impl Serialize for ActionResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            ActionResponse::Result(value) => WireResponse {
                result: value.clone(),
                error: None,
                log: String::new(),
            },
            ActionResponse::Error(envelope) => WireResponse {
                result: Value::Null,
                error: Some(envelope.clone()),
                log: String::new(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ActionResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = WireResponse::deserialize(deserializer)?;
        Ok(match wire.error {
            Some(envelope) => ActionResponse::Error(envelope),
            None => ActionResponse::Result(wire.result),
        })
    }
}
