//! Messages crossing the isolation boundary.
//!
//! The previewed document talks to the host only through a one-way channel of
//! JSON values. Anything may arrive on it, so values are validated into
//! [`DiagnosticMessage`] before dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// Kind tag of a forwarded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Log,
    Error,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::Log => "log",
            DiagnosticKind::Error => "error",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "log" => Some(DiagnosticKind::Log),
            "error" => Some(DiagnosticKind::Error),
            _ => None,
        }
    }
}

/// `{ "type": "log" | "error", "msg": string }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    #[serde(rename = "msg")]
    pub text: String,
}

impl DiagnosticMessage {
    pub fn log(text: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Log,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            text: text.into(),
        }
    }

    /// Validate an untrusted value from the channel.
    ///
    /// Returns `None` unless `value` is an object whose `type` is a known
    /// kind. A missing `msg` reads as empty; non-string `msg` values are kept
    /// in their JSON form.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let kind = DiagnosticKind::parse(object.get("type")?.as_str()?)?;
        let text = match object.get("msg") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };
        Some(Self { kind, text })
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "type": self.kind.as_str(), "msg": self.text })
    }
}

impl fmt::Display for DiagnosticMessage {
    /// The log-sink line, e.g. `[error] boom`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.text)
    }
}

/// Sending half, handed to whatever runs the previewed document.
#[derive(Debug, Clone)]
pub struct MessagePort {
    tx: UnboundedSender<Value>,
}

impl MessagePort {
    /// Post a raw value to the host. Silently dropped once the host is gone.
    pub fn post(&self, value: Value) {
        let _ = self.tx.send(value);
    }
}

/// Receiving half, owned by the preview host.
#[derive(Debug)]
pub struct MessageInbox {
    rx: UnboundedReceiver<Value>,
}

impl MessageInbox {
    /// Next queued value, without waiting.
    pub fn try_next(&mut self) -> Option<Value> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Create a connected port/inbox pair.
pub fn message_channel() -> (MessagePort, MessageInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MessagePort { tx }, MessageInbox { rx })
}
