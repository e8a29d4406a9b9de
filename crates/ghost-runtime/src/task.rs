//! Tasks: runtime instances of thinks parked at a stage

use ghost_core::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    Running,
    Awaiting,
    /// Yielded to another task, resumes through `OnPreempted`.
    Waiting,
    /// Blocked on the result of the task named by `depending`.
    Depending,
    Finished,
    Canceled,
    Failed,
    Dead,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Canceled | Self::Failed | Self::Dead
        )
    }

    pub fn is_sleeping(&self) -> bool {
        matches!(self, Self::Waiting | Self::Depending)
    }

    pub fn is_alive(&self) -> bool {
        !self.is_terminal()
    }
}

/// Who may address a task through global attentions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLevel {
    /// Contributes its attentions to every turn of the process.
    Public,
    #[default]
    Protected,
    Private,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub tid: String,
    pub url: Url,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: f64,
    /// Seconds until the task may be forgotten by the store.
    #[serde(default)]
    pub overdue: u64,
    #[serde(default)]
    pub is_long_term: bool,
    #[serde(default)]
    pub is_forgettable: bool,
    #[serde(default)]
    pub level: TaskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<Value>,
    /// Vars hydrated for this turn.
    #[serde(skip)]
    pub instanced: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depending: Option<String>,
    /// Set once finished. A `null` result stays `Some(Null)` across a save.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Stages still to visit after the current one.
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub stages: VecDeque<String>,
    /// Process round in which the task was last touched.
    #[serde(default)]
    pub round: u64,
    #[serde(skip)]
    pub touched: bool,
}

/// A field that is present deserialises to `Some`, even when it is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Task {
    pub fn new(url: Url) -> Self {
        let tid = Self::make_tid(&url, None);
        Self::with_tid(tid, url)
    }

    pub fn with_tid(tid: impl Into<String>, url: Url) -> Self {
        Self {
            tid: tid.into(),
            url,
            status: TaskStatus::New,
            priority: 0.0,
            overdue: 0,
            is_long_term: false,
            is_forgettable: false,
            level: TaskLevel::default(),
            vars: None,
            instanced: false,
            callbacks: Vec::new(),
            depending: None,
            result: None,
            stages: VecDeque::new(),
            round: 0,
            touched: false,
        }
    }

    /// Stable id of the think at `url`, optionally discriminated by `extra`.
    ///
    /// The stage is not part of the identity: a task keeps its id while it
    /// moves between stages.
    pub fn make_tid(url: &Url, extra: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.think.as_bytes());
        if let Some(extra) = extra {
            hasher.update([0u8]);
            hasher.update(extra.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_sleeping(&self) -> bool {
        self.status.is_sleeping()
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    pub fn think(&self) -> &str {
        &self.url.think
    }

    pub fn stage(&self) -> &str {
        &self.url.stage
    }

    pub fn add_callback(&mut self, tid: &str) {
        if !self.callbacks.iter().any(|t| t == tid) {
            self.callbacks.push(tid.to_string());
        }
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    pub fn depend_on(&mut self, tid: &str) {
        self.status = TaskStatus::Depending;
        self.depending = Some(tid.to_string());
    }

    pub fn finish(&mut self, result: Value) {
        self.status = TaskStatus::Finished;
        self.result = Some(result);
        self.depending = None;
    }

    /// Mark the task as changed in `round`.
    pub fn touch(&mut self, round: u64) {
        self.round = round;
        self.touched = true;
    }

    /// Typed view of the vars.
    pub fn vars_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.vars
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_vars<T: Serialize>(&mut self, vars: &T) -> serde_json::Result<()> {
        self.vars = Some(serde_json::to_value(vars)?);
        Ok(())
    }

    /// Copy without vars, as written into the process record for long-term tasks.
    pub fn without_vars(&self) -> Self {
        let mut task = self.clone();
        task.vars = None;
        task
    }
}
