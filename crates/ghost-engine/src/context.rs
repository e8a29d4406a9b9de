//! Per-turn context handed to stages
//!
//! Built fresh for every turn and dropped when it ends. Owns the working copy
//! of the process and buffers everything the turn produces until the
//! scheduler commits it.

use crate::container::Container;
use crate::focus::Focus;
use crate::mindset::Mindset;
use ghost_core::{GhostConfig, Input, Message, Output, Url};
use ghost_runtime::{Process, RuntimeDriver, Session, Task};
use serde_json::Value;
use std::sync::Arc;

pub struct Context<'a> {
    input: &'a Input,
    session: &'a Session,
    container: &'a Container,
    mindset: &'a Mindset,
    focus: &'a Focus,
    runtime: &'a dyn RuntimeDriver,
    config: &'a GhostConfig,
    process: Process,
    outputs: Vec<Output>,
    async_inputs: Vec<Input>,
    rewound: bool,
}

/// What a finished turn leaves behind.
pub struct TurnResult {
    pub process: Process,
    pub outputs: Vec<Output>,
    pub async_inputs: Vec<Input>,
    pub rewound: bool,
}

impl<'a> Context<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: &'a Input,
        session: &'a Session,
        process: Process,
        container: &'a Container,
        mindset: &'a Mindset,
        focus: &'a Focus,
        runtime: &'a dyn RuntimeDriver,
        config: &'a GhostConfig,
    ) -> Self {
        Self {
            input,
            session,
            container,
            mindset,
            focus,
            runtime,
            config,
            process,
            outputs: Vec::new(),
            async_inputs: Vec::new(),
            rewound: false,
        }
    }

    pub fn input(&self) -> &'a Input {
        self.input
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }

    pub fn mindset(&self) -> &'a Mindset {
        self.mindset
    }

    pub fn focus(&self) -> &'a Focus {
        self.focus
    }

    pub fn runtime(&self) -> &'a dyn RuntimeDriver {
        self.runtime
    }

    pub fn config(&self) -> &'a GhostConfig {
        self.config
    }

    pub fn clone_id(&self) -> Option<&'a str> {
        let clone_id = self.input.trace.clone_id.as_str();
        (!clone_id.is_empty()).then_some(clone_id)
    }

    /// Shortcut for `container().get::<T>()`.
    pub fn service<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.container.get::<T>()
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut Process {
        &mut self.process
    }

    /// Text of the turn's input, if it is a text message.
    pub fn text(&self) -> Option<&'a str> {
        self.input.text_payload()
    }

    /// Start sending messages on behalf of `task`.
    pub fn send_at(&mut self, task: &Task) -> Sender<'_, 'a> {
        self.send_as(task.tid.clone())
    }

    /// Send on behalf of a task known by id. An empty id sends unattributed.
    pub fn send_as(&mut self, tid: impl Into<String>) -> Sender<'_, 'a> {
        Sender {
            tid: tid.into(),
            ctx: self,
        }
    }

    /// Schedule an input to be delivered after this turn commits.
    pub fn async_input(&mut self, payload: Message, url: Option<Url>) {
        let mut input = Input::new(self.input.trace.clone(), payload).as_async();
        input.url = url;
        self.async_inputs.push(input);
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn async_inputs(&self) -> &[Input] {
        &self.async_inputs
    }

    /// Drop the turn's buffered outputs and async inputs; nothing is saved.
    pub fn rewind(&mut self) {
        self.outputs.clear();
        self.async_inputs.clear();
        self.rewound = true;
    }

    pub fn is_rewound(&self) -> bool {
        self.rewound
    }

    pub fn finish(self) -> TurnResult {
        TurnResult {
            process: self.process,
            outputs: self.outputs,
            async_inputs: self.async_inputs,
            rewound: self.rewound,
        }
    }

    fn push_message(&mut self, tid: &str, message: Message) {
        let tid = (!tid.is_empty()).then(|| tid.to_string());
        if let Some(last) = self.outputs.last_mut() {
            if last.tid == tid {
                last.push(message);
                return;
            }
        }
        let mut output = Output::new(
            self.session.new_message_id(),
            self.input.trace.clone(),
            tid,
        );
        output.is_async = self.input.is_async;
        output.push(message);
        self.outputs.push(output);
    }
}

/// Chained message builder returned by `Context::send_at`.
///
/// Consecutive messages from the same task share one output.
pub struct Sender<'c, 'a> {
    ctx: &'c mut Context<'a>,
    tid: String,
}

impl<'c, 'a> Sender<'c, 'a> {
    pub fn message(self, message: Message) -> Self {
        self.ctx.push_message(&self.tid, message);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.message(Message::text(text))
    }

    pub fn json(self, data: Value) -> Self {
        self.message(Message::json(data))
    }

    pub fn error(self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.message(Message::error(code, message))
    }
}
