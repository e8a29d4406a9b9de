//! Events delivered to stages

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// The task entered a stage (activation, forward, repeat).
    Activating,
    /// The current task got the turn's input.
    Received,
    /// The task took focus back from another task.
    Preempted,
    /// A task this one was waiting on has finished.
    Callback { from: String, result: Value },
    /// The task is leaving its stage; a reply cancels the move.
    Withdrawing,
    Canceling,
    Quitting,
    Failed { reason: String },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activating => "activating",
            Self::Received => "received",
            Self::Preempted => "preempted",
            Self::Callback { .. } => "callback",
            Self::Withdrawing => "withdrawing",
            Self::Canceling => "canceling",
            Self::Quitting => "quitting",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub tid: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(tid: impl Into<String>, kind: EventKind) -> Self {
        Self {
            tid: tid.into(),
            kind,
        }
    }

    pub fn activating(tid: impl Into<String>) -> Self {
        Self::new(tid, EventKind::Activating)
    }

    pub fn received(tid: impl Into<String>) -> Self {
        Self::new(tid, EventKind::Received)
    }

    pub fn preempted(tid: impl Into<String>) -> Self {
        Self::new(tid, EventKind::Preempted)
    }

    pub fn callback(tid: impl Into<String>, from: impl Into<String>, result: Value) -> Self {
        Self::new(
            tid,
            EventKind::Callback {
                from: from.into(),
                result,
            },
        )
    }

    pub fn withdrawing(tid: impl Into<String>) -> Self {
        Self::new(tid, EventKind::Withdrawing)
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}
