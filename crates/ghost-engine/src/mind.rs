//! Operator constructors bound to one task

use crate::operator::Operator;
use ghost_core::Url;
use ghost_runtime::Task;
use serde_json::Value;

/// Builds operators for the task a stage is running as.
///
/// ```ignore
/// fn on_received(&self, ctx: &mut Context<'_>, this: &mut Task) -> StageResult {
///     Ok(Some(Mind::new(this).forward(["confirm"])))
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Mind {
    tid: String,
}

impl Mind {
    pub fn new(this: &Task) -> Self {
        Self {
            tid: this.tid.clone(),
        }
    }

    pub fn of(tid: impl Into<String>) -> Self {
        Self { tid: tid.into() }
    }

    pub fn tid(&self) -> &str {
        &self.tid
    }

    pub fn forward<I, S>(&self, stages: I) -> Operator
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operator::Forward {
            tid: self.tid.clone(),
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }

    /// Move to the next queued stage, or finish when there is none.
    pub fn next(&self) -> Operator {
        self.forward(Vec::<String>::new())
    }

    pub fn awaits(&self) -> Operator {
        Operator::Awaits {
            tid: self.tid.clone(),
        }
    }

    pub fn repeat(&self) -> Operator {
        Operator::Repeat {
            tid: self.tid.clone(),
        }
    }

    pub fn rewind(&self) -> Operator {
        Operator::Rewind
    }

    pub fn restart(&self) -> Operator {
        Operator::Restart {
            tid: self.tid.clone(),
        }
    }

    pub fn finish(&self, result: Value) -> Operator {
        Operator::Finish {
            tid: self.tid.clone(),
            result,
        }
    }

    pub fn cancel(&self) -> Operator {
        Operator::Cancel {
            tid: self.tid.clone(),
            notify_self: false,
        }
    }

    pub fn quit(&self) -> Operator {
        Operator::Quit {
            tid: self.tid.clone(),
            notify_self: false,
        }
    }

    pub fn fail(&self, reason: impl Into<String>) -> Operator {
        Operator::Fail {
            tid: self.tid.clone(),
            reason: reason.into(),
            notify_self: false,
        }
    }

    pub fn depend_on(&self, url: impl Into<Url>) -> Operator {
        Operator::DependOn {
            tid: self.tid.clone(),
            url: url.into(),
        }
    }

    pub fn redirect(&self, url: impl Into<Url>) -> Operator {
        Operator::Redirect {
            tid: self.tid.clone(),
            url: url.into(),
        }
    }

    pub fn intend(&self, url: impl Into<Url>) -> Operator {
        Operator::Intend {
            tid: self.tid.clone(),
            url: url.into(),
        }
    }
}
