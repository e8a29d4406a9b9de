//! Inbound and outbound message envelopes
//!
//! The engine treats payloads as opaque except for `Tasked` (restore a
//! long-term task) and `Error` (emitted when a turn fails).

use crate::url::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tagged message body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Text {
        text: String,
    },
    Error {
        code: String,
        message: String,
    },
    Json {
        data: Value,
    },
    /// Hint to bring a long-term task back into focus.
    Tasked {
        tid: String,
        url: Url,
    },
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn json(data: Value) -> Self {
        Self::Json { data }
    }

    pub fn tasked(tid: impl Into<String>, url: Url) -> Self {
        Self::Tasked {
            tid: tid.into(),
            url,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Routing information carried by every input and copied onto its outputs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub clone_id: String,
    #[serde(default)]
    pub shell_id: String,
    #[serde(default)]
    pub shell_kind: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

impl Trace {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// A message entering the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    pub mid: String,
    pub trace: Trace,
    pub payload: Message,
    /// Explicit target; when present the turn starts with an intention to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    #[serde(default)]
    pub is_async: bool,
    pub created_at: i64,
}

impl Input {
    pub fn new(trace: Trace, payload: Message) -> Self {
        Self {
            mid: uuid::Uuid::new_v4().to_string(),
            trace,
            payload,
            url: None,
            is_async: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn text(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Trace::new(session_id), Message::text(text))
    }

    pub fn with_url(mut self, url: impl Into<Url>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    pub fn as_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.trace.session_id
    }

    pub fn text_payload(&self) -> Option<&str> {
        self.payload.as_text()
    }
}

/// A batch of messages produced by one task during a turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Output {
    pub mid: String,
    pub trace: Trace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub is_async: bool,
    pub created_at: i64,
}

impl Output {
    pub fn new(mid: impl Into<String>, trace: Trace, tid: Option<String>) -> Self {
        Self {
            mid: mid.into(),
            trace,
            tid,
            messages: Vec::new(),
            is_async: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Output answering `input` directly, not attributed to any task.
    pub fn reply(input: &Input, message: Message) -> Self {
        let mut output = Self::new(uuid::Uuid::new_v4().to_string(), input.trace.clone(), None);
        output.is_async = input.is_async;
        output.messages.push(message);
        output
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Concatenated text of all text messages.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .filter_map(Message::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
