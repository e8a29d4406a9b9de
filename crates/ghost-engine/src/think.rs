//! Thinks, stages and reactions
//!
//! A think is a dialogue capability made of named stages. Stages receive
//! every event through `on_event`, which fans out to one method per event
//! kind; override the ones you need.

use crate::context::Context;
use crate::event::{Event, EventKind};
use crate::focus::{Intention, Target};
use crate::operator::Operator;
use ghost_core::Result;
use ghost_runtime::{Task, TaskLevel};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// What a stage answers to an event. `None` lets the engine continue with
/// its default.
pub type StageResult = Result<Option<Operator>>;

pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, ctx: &mut Context<'_>, this: &mut Task, event: &Event) -> StageResult {
        match &event.kind {
            EventKind::Activating => self.on_activating(ctx, this),
            EventKind::Received => self.on_received(ctx, this),
            EventKind::Preempted => self.on_preempted(ctx, this),
            EventKind::Callback { from, result } => self.on_callback(ctx, this, from, result),
            EventKind::Withdrawing => self.on_withdrawing(ctx, this),
            EventKind::Canceling => self.on_canceling(ctx, this),
            EventKind::Quitting => self.on_quitting(ctx, this),
            EventKind::Failed { reason } => self.on_failed(ctx, this, reason),
        }
    }

    fn on_activating(&self, _ctx: &mut Context<'_>, _this: &mut Task) -> StageResult {
        Ok(None)
    }

    fn on_received(&self, _ctx: &mut Context<'_>, _this: &mut Task) -> StageResult {
        Ok(None)
    }

    fn on_preempted(&self, _ctx: &mut Context<'_>, _this: &mut Task) -> StageResult {
        Ok(None)
    }

    fn on_callback(
        &self,
        _ctx: &mut Context<'_>,
        _this: &mut Task,
        _from: &str,
        _result: &Value,
    ) -> StageResult {
        Ok(None)
    }

    fn on_withdrawing(&self, _ctx: &mut Context<'_>, _this: &mut Task) -> StageResult {
        Ok(None)
    }

    fn on_canceling(&self, _ctx: &mut Context<'_>, _this: &mut Task) -> StageResult {
        Ok(None)
    }

    fn on_quitting(&self, _ctx: &mut Context<'_>, _this: &mut Task) -> StageResult {
        Ok(None)
    }

    fn on_failed(&self, _ctx: &mut Context<'_>, _this: &mut Task, _reason: &str) -> StageResult {
        Ok(None)
    }

    /// Asked when a task above did not handle the input.
    fn fallback(&self, _ctx: &mut Context<'_>, _this: &mut Task) -> StageResult {
        Ok(None)
    }

    fn reactions(&self) -> Vec<Arc<dyn Reaction>> {
        Vec::new()
    }

    /// Intentions only active while this stage is current.
    fn attentions(&self) -> Vec<Intention> {
        Vec::new()
    }
}

/// Stage-local shortcut, matched before anything else.
pub trait Reaction: Send + Sync {
    fn name(&self) -> &str;

    /// How the reaction is triggered. Defaults to the `/name` command.
    fn intention(&self) -> Intention {
        Intention::command(self.name(), Target::Reaction(self.name().to_string()))
    }

    fn react(
        &self,
        ctx: &mut Context<'_>,
        this: &mut Task,
        args: &Map<String, Value>,
    ) -> StageResult;
}

/// Defaults applied to every task created for a think.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    pub priority: f64,
    pub overdue: u64,
    pub long_term: bool,
    pub forgettable: bool,
    pub level: TaskLevel,
}

impl TaskOptions {
    pub fn apply(&self, task: &mut Task) {
        task.priority = self.priority;
        task.overdue = self.overdue;
        task.is_long_term = self.long_term;
        task.is_forgettable = self.forgettable;
        task.level = self.level;
    }
}

pub trait Think: Send + Sync {
    fn name(&self) -> &str;

    fn entry(&self) -> &str {
        "start"
    }

    fn fetch_stage(&self, stage: &str) -> Option<Arc<dyn Stage>>;

    /// Initial vars of a new task.
    fn new_vars(&self, _args: &Map<String, Value>) -> Option<Value> {
        None
    }

    fn options(&self) -> TaskOptions {
        TaskOptions::default()
    }

    /// Intentions offered to the whole process while a task of this think
    /// is alive and public.
    fn attentions(&self) -> Vec<Intention> {
        Vec::new()
    }
}

/// Stored description of a think, materialised by the driver for `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThinkMeta {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl ThinkMeta {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            config,
        }
    }
}

pub trait ThinkDriver: Send + Sync {
    fn kind(&self) -> &str;

    fn create(&self, meta: &ThinkMeta) -> Result<Arc<dyn Think>>;
}

type Handler = Box<dyn Fn(&mut Context<'_>, &mut Task, &Event) -> StageResult + Send + Sync>;

fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context<'_>, &mut Task, &Event) -> StageResult + Send + Sync + 'static,
{
    Box::new(f)
}

/// Stage assembled from closures keyed by event kind.
pub struct FnStage {
    name: String,
    handlers: HashMap<&'static str, Handler>,
    fallback: Option<Handler>,
    reactions: Vec<Arc<dyn Reaction>>,
    attentions: Vec<Intention>,
}

impl FnStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
            fallback: None,
            reactions: Vec::new(),
            attentions: Vec::new(),
        }
    }

    fn on<F>(mut self, kind: &'static str, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task, &Event) -> StageResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind, handler(f));
        self
    }

    pub fn activating<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task) -> StageResult + Send + Sync + 'static,
    {
        self.on("activating", move |ctx, this, _| f(ctx, this))
    }

    pub fn received<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task) -> StageResult + Send + Sync + 'static,
    {
        self.on("received", move |ctx, this, _| f(ctx, this))
    }

    pub fn preempted<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task) -> StageResult + Send + Sync + 'static,
    {
        self.on("preempted", move |ctx, this, _| f(ctx, this))
    }

    pub fn callback<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task, &str, &Value) -> StageResult + Send + Sync + 'static,
    {
        self.on("callback", move |ctx, this, event| match &event.kind {
            EventKind::Callback { from, result } => f(ctx, this, from, result),
            _ => Ok(None),
        })
    }

    pub fn withdrawing<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task) -> StageResult + Send + Sync + 'static,
    {
        self.on("withdrawing", move |ctx, this, _| f(ctx, this))
    }

    pub fn canceling<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task) -> StageResult + Send + Sync + 'static,
    {
        self.on("canceling", move |ctx, this, _| f(ctx, this))
    }

    pub fn quitting<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task) -> StageResult + Send + Sync + 'static,
    {
        self.on("quitting", move |ctx, this, _| f(ctx, this))
    }

    pub fn failed<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task, &str) -> StageResult + Send + Sync + 'static,
    {
        self.on("failed", move |ctx, this, event| match &event.kind {
            EventKind::Failed { reason } => f(ctx, this, reason),
            _ => Ok(None),
        })
    }

    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &mut Task) -> StageResult + Send + Sync + 'static,
    {
        self.fallback = Some(handler(move |ctx, this, _| f(ctx, this)));
        self
    }

    pub fn with_reaction(mut self, reaction: Arc<dyn Reaction>) -> Self {
        self.reactions.push(reaction);
        self
    }

    pub fn with_attention(mut self, intention: Intention) -> Self {
        self.attentions.push(intention);
        self
    }
}

impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, ctx: &mut Context<'_>, this: &mut Task, event: &Event) -> StageResult {
        match self.handlers.get(event.name()) {
            Some(on_event) => on_event(ctx, this, event),
            None => Ok(None),
        }
    }

    fn fallback(&self, ctx: &mut Context<'_>, this: &mut Task) -> StageResult {
        match &self.fallback {
            Some(fallback) => {
                let event = Event::received(this.tid.clone());
                fallback(ctx, this, &event)
            }
            None => Ok(None),
        }
    }

    fn reactions(&self) -> Vec<Arc<dyn Reaction>> {
        self.reactions.clone()
    }

    fn attentions(&self) -> Vec<Intention> {
        self.attentions.clone()
    }
}

/// Think built from a set of stages.
pub struct StageThink {
    name: String,
    entry: String,
    stages: HashMap<String, Arc<dyn Stage>>,
    options: TaskOptions,
    attentions: Vec<Intention>,
    vars: Option<Value>,
}

impl StageThink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: "start".into(),
            stages: HashMap::new(),
            options: TaskOptions::default(),
            attentions: Vec::new(),
            vars: None,
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.insert(stage.name().to_string(), Arc::new(stage));
        self
    }

    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_attention(mut self, intention: Intention) -> Self {
        self.attentions.push(intention);
        self
    }

    /// Vars every new task starts with; url args are merged over them.
    pub fn with_vars(mut self, vars: Value) -> Self {
        self.vars = Some(vars);
        self
    }
}

impl Think for StageThink {
    fn name(&self) -> &str {
        &self.name
    }

    fn entry(&self) -> &str {
        &self.entry
    }

    fn fetch_stage(&self, stage: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(stage).cloned()
    }

    fn new_vars(&self, args: &Map<String, Value>) -> Option<Value> {
        match (&self.vars, args.is_empty()) {
            (Some(Value::Object(base)), _) => {
                let mut vars = base.clone();
                for (k, v) in args {
                    vars.insert(k.clone(), v.clone());
                }
                Some(Value::Object(vars))
            }
            (Some(other), _) => Some(other.clone()),
            (None, true) => None,
            (None, false) => Some(Value::Object(args.clone())),
        }
    }

    fn options(&self) -> TaskOptions {
        self.options.clone()
    }

    fn attentions(&self) -> Vec<Intention> {
        self.attentions.clone()
    }
}
