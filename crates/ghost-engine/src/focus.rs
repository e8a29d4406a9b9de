//! Focus: intention matching
//!
//! Intentions are grouped by precedence (stage, public tasks, globals). The
//! first group with a match wins; inside a group drivers are asked in
//! registration order and intentions in declaration order.

use dashmap::DashMap;
use ghost_core::{Input, Url};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Quit,
    Cancel,
    Restart,
    Repeat,
    Rewind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Think(Url),
    /// Named reaction of the current stage.
    Reaction(String),
    Signal(Signal),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Intention {
    /// Driver kind that understands `pattern`.
    pub kind: String,
    pub name: String,
    pub pattern: String,
    pub target: Target,
}

impl Intention {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        pattern: impl Into<String>,
        target: Target,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            pattern: pattern.into(),
            target,
        }
    }

    /// `/name ...` command.
    pub fn command(name: impl Into<String>, target: Target) -> Self {
        let name = name.into();
        Self::new(CommandDriver::KIND, name.clone(), name, target)
    }

    pub fn regex(name: impl Into<String>, pattern: impl Into<String>, target: Target) -> Self {
        Self::new(RegexDriver::KIND, name, pattern, target)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Matched {
    pub intention: Intention,
    pub args: Map<String, Value>,
}

impl Matched {
    /// Think target with the matched args merged over the url's own.
    pub fn url(&self) -> Option<Url> {
        match &self.intention.target {
            Target::Think(url) => {
                let mut url = url.clone();
                for (k, v) in &self.args {
                    url.args.insert(k.clone(), v.clone());
                }
                Some(url)
            }
            _ => None,
        }
    }
}

pub trait FocusDriver: Send + Sync {
    fn kind(&self) -> &str;

    /// First intention in `intentions` matching the input.
    fn match_input(&self, input: &Input, intentions: &[&Intention]) -> Option<Matched>;
}

#[derive(Default)]
pub struct Focus {
    drivers: Vec<Arc<dyn FocusDriver>>,
    globals: Vec<Intention>,
}

impl Focus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus with the `command` and `regex` drivers registered.
    pub fn with_default_drivers() -> Self {
        let mut focus = Self::new();
        focus.register_driver(Arc::new(CommandDriver));
        focus.register_driver(Arc::new(RegexDriver::new()));
        focus
    }

    /// Register a driver. Replaces a driver of the same kind in place.
    pub fn register_driver(&mut self, driver: Arc<dyn FocusDriver>) {
        match self.drivers.iter().position(|d| d.kind() == driver.kind()) {
            Some(pos) => self.drivers[pos] = driver,
            None => self.drivers.push(driver),
        }
    }

    pub fn register_global_intention(&mut self, intention: Intention) {
        self.globals.push(intention);
    }

    pub fn globals(&self) -> &[Intention] {
        &self.globals
    }

    pub fn driver_kinds(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.kind()).collect()
    }

    pub fn match_group(&self, input: &Input, group: &[Intention]) -> Option<Matched> {
        for driver in &self.drivers {
            let candidates: Vec<&Intention> =
                group.iter().filter(|i| i.kind == driver.kind()).collect();
            if candidates.is_empty() {
                continue;
            }
            if let Some(matched) = driver.match_input(input, &candidates) {
                return Some(matched);
            }
        }
        None
    }

    pub fn match_groups(&self, input: &Input, groups: &[Vec<Intention>]) -> Option<Matched> {
        groups.iter().find_map(|group| self.match_group(input, group))
    }
}

/// Matches `/name positional --key=value --flag`.
///
/// Positional words land in `args` as a list; `--key=value` as strings and
/// bare `--flag` as `true`.
pub struct CommandDriver;

impl CommandDriver {
    pub const KIND: &'static str = "command";

    pub fn parse(text: &str) -> Option<(String, Map<String, Value>)> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let mut words = rest.split_whitespace();
        let name = words.next()?.to_string();

        let mut args = Map::new();
        let mut positional = Vec::new();
        for word in words {
            match word.strip_prefix("--") {
                Some(flag) if !flag.is_empty() => match flag.split_once('=') {
                    Some((k, v)) => {
                        args.insert(k.to_string(), Value::String(v.to_string()));
                    }
                    None => {
                        args.insert(flag.to_string(), Value::Bool(true));
                    }
                },
                _ => positional.push(Value::String(word.to_string())),
            }
        }
        if !positional.is_empty() {
            args.insert("args".into(), Value::Array(positional));
        }
        Some((name, args))
    }
}

impl FocusDriver for CommandDriver {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn match_input(&self, input: &Input, intentions: &[&Intention]) -> Option<Matched> {
        let (name, args) = Self::parse(input.text_payload()?)?;
        intentions
            .iter()
            .find(|i| i.pattern.trim_start_matches('/') == name)
            .map(|i| Matched {
                intention: (*i).clone(),
                args,
            })
    }
}

/// Matches text against a regular expression; named captures become args.
#[derive(Default)]
pub struct RegexDriver {
    compiled: DashMap<String, Option<Regex>>,
}

impl RegexDriver {
    pub const KIND: &'static str = "regex";

    pub fn new() -> Self {
        Self::default()
    }

    fn regex(&self, pattern: &str) -> Option<Regex> {
        if let Some(cached) = self.compiled.get(pattern) {
            return cached.clone();
        }
        let compiled = match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Invalid intention pattern {:?}: {}", pattern, e);
                None
            }
        };
        self.compiled.insert(pattern.to_string(), compiled.clone());
        compiled
    }
}

impl FocusDriver for RegexDriver {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn match_input(&self, input: &Input, intentions: &[&Intention]) -> Option<Matched> {
        let text = input.text_payload()?;
        for intention in intentions {
            let Some(re) = self.regex(&intention.pattern) else {
                continue;
            };
            let Some(caps) = re.captures(text) else {
                continue;
            };
            let mut args = Map::new();
            for name in re.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    args.insert(name.to_string(), Value::String(m.as_str().to_string()));
                }
            }
            return Some(Matched {
                intention: (*intention).clone(),
                args,
            });
        }
        None
    }
}
