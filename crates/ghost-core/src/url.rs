//! Addressing of thinks and their stages

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Location of a stage within a think.
///
/// Two urls are equal when they name the same think and stage; `args` is
/// payload only. An empty stage means the think's entry stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Url {
    pub think: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stage: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

impl Url {
    pub fn new(think: impl Into<String>) -> Self {
        Self {
            think: think.into(),
            stage: String::new(),
            args: Map::new(),
        }
    }

    pub fn stage(think: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            think: think.into(),
            stage: stage.into(),
            args: Map::new(),
        }
    }

    /// Parse `think#stage`; the stage part is optional.
    pub fn parse(s: &str) -> Self {
        match s.split_once('#') {
            Some((think, stage)) => Self::stage(think, stage),
            None => Self::new(s),
        }
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Same think, another stage, args kept.
    pub fn to_stage(&self, stage: impl Into<String>) -> Self {
        Self {
            think: self.think.clone(),
            stage: stage.into(),
            args: self.args.clone(),
        }
    }

    pub fn is_entry(&self) -> bool {
        self.stage.is_empty()
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }
}

impl PartialEq for Url {
    fn eq(&self, other: &Self) -> bool {
        self.think == other.think && self.stage == other.stage
    }
}

impl Eq for Url {}

impl Hash for Url {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.think.hash(state);
        self.stage.hash(state);
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stage.is_empty() {
            write!(f, "{}", self.think)
        } else {
            write!(f, "{}#{}", self.think, self.stage)
        }
    }
}

impl From<&str> for Url {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Url {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}
