//! Operators: reified engine instructions
//!
//! A stage answers an event with an optional operator; the kernel runs it and
//! gets back the next one, until an operator ends the turn.

use crate::event::{Event, EventKind};
use ghost_core::Url;
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    /// Route the turn's input to the current task.
    Receive,
    Activate { tid: String },
    /// Move through `stages` in order; finishes the task once none are left.
    Forward { tid: String, stages: Vec<String> },
    /// Park the task until the next input. Ends the turn.
    Awaits { tid: String },
    Repeat { tid: String },
    /// Drop everything this turn produced. Ends the turn.
    Rewind,
    Restart { tid: String },
    Finish { tid: String, result: Value },
    /// `notify_self` also delivers the event to `tid` itself.
    Cancel { tid: String, notify_self: bool },
    Quit { tid: String, notify_self: bool },
    Fail {
        tid: String,
        reason: String,
        notify_self: bool,
    },
    DependOn { tid: String, url: Url },
    Redirect { tid: String, url: Url },
    Intend { tid: String, url: Url },
    Preempt { tid: String },

    /// Deliver `event`; continue with `then` when the stage has no answer.
    Dispatch { event: Event, then: Box<Operator> },
    /// Callback fan-out of a finished task.
    Callbacks(Callbacks),
    /// Cancel, quit or fail walk over a task and its ancestors.
    Withdrawing(Withdraw),
}

impl Operator {
    /// Task the operator acts on, if any.
    pub fn tid(&self) -> Option<&str> {
        match self {
            Self::Receive | Self::Rewind => None,
            Self::Activate { tid }
            | Self::Forward { tid, .. }
            | Self::Awaits { tid }
            | Self::Repeat { tid }
            | Self::Restart { tid }
            | Self::Finish { tid, .. }
            | Self::Cancel { tid, .. }
            | Self::Quit { tid, .. }
            | Self::Fail { tid, .. }
            | Self::DependOn { tid, .. }
            | Self::Redirect { tid, .. }
            | Self::Intend { tid, .. }
            | Self::Preempt { tid } => Some(tid),
            Self::Dispatch { event, .. } => Some(&event.tid),
            Self::Callbacks(cb) => Some(&cb.from),
            Self::Withdrawing(w) => w.pending.front().or(w.walked.last()).map(String::as_str),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Activate { .. } => "activate",
            Self::Forward { .. } => "forward",
            Self::Awaits { .. } => "awaits",
            Self::Repeat { .. } => "repeat",
            Self::Rewind => "rewind",
            Self::Restart { .. } => "restart",
            Self::Finish { .. } => "finish",
            Self::Cancel { .. } => "cancel",
            Self::Quit { .. } => "quit",
            Self::Fail { .. } => "fail",
            Self::DependOn { .. } => "depend_on",
            Self::Redirect { .. } => "redirect",
            Self::Intend { .. } => "intend",
            Self::Preempt { .. } => "preempt",
            Self::Dispatch { .. } => "dispatch",
            Self::Callbacks(_) => "callbacks",
            Self::Withdrawing(_) => "withdrawing",
        }
    }

    pub(crate) fn dispatch(event: Event, then: Operator) -> Self {
        Self::Dispatch {
            event,
            then: Box::new(then),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Callbacks {
    pub from: String,
    pub result: Value,
    pub pending: VecDeque<String>,
    /// First registered callback; resumed when nobody answers.
    pub first: Option<String>,
    pub chosen: Option<Box<Operator>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawKind {
    Cancel,
    Quit,
    Fail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Withdraw {
    pub kind: WithdrawKind,
    pub reason: Option<String>,
    /// Tasks still to be asked, top first.
    pub pending: VecDeque<String>,
    /// Tasks already asked, or skipped as the issuer.
    pub walked: Vec<String>,
}

impl Withdraw {
    pub fn event_for(&self, tid: &str) -> Event {
        let kind = match self.kind {
            WithdrawKind::Cancel => EventKind::Canceling,
            WithdrawKind::Quit => EventKind::Quitting,
            WithdrawKind::Fail => EventKind::Failed {
                reason: self.reason.clone().unwrap_or_default(),
            },
        };
        Event::new(tid, kind)
    }
}
