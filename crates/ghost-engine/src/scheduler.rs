//! Ghost scheduler: one call to `handle` is one turn
//!
//! A turn locks the session's process, loads it, runs the operator loop,
//! persists the result and unlocks. Turns on different sessions run in
//! parallel; turns on the same session are serialised by the process lock.

use crate::container::Container;
use crate::context::{Context, TurnResult};
use crate::focus::Focus;
use crate::kernel;
use crate::mindset::Mindset;
use ghost_core::{Error, ErrorKind, GhostConfig, Input, Message, Output, Result};
use ghost_runtime::{
    Cache, CacheRuntime, MessageQueue, Process, RuntimeDriver, RuntimeFactory, Session, Task,
};
use std::sync::Arc;

/// Everything a turn produced.
#[derive(Debug, Default)]
pub struct Reply {
    pub outputs: Vec<Output>,
    pub async_inputs: Vec<Input>,
}

impl Reply {
    pub fn single(output: Output) -> Self {
        Self {
            outputs: vec![output],
            async_inputs: Vec::new(),
        }
    }

    /// Text of all outputs, one line per output.
    pub fn text(&self) -> String {
        self.outputs
            .iter()
            .map(Output::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct Ghost {
    config: GhostConfig,
    cache: Arc<dyn Cache>,
    runtimes: Arc<dyn RuntimeFactory>,
    mindset: Arc<Mindset>,
    focus: Arc<Focus>,
    container: Arc<Container>,
    queue: Option<Arc<dyn MessageQueue>>,
}

pub struct GhostBuilder {
    config: GhostConfig,
    cache: Option<Arc<dyn Cache>>,
    runtimes: Option<Arc<dyn RuntimeFactory>>,
    mindset: Option<Arc<Mindset>>,
    focus: Option<Arc<Focus>>,
    container: Option<Arc<Container>>,
    queue: Option<Arc<dyn MessageQueue>>,
}

impl GhostBuilder {
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override how per-turn runtime drivers are made. Defaults to a
    /// `CacheRuntime` over the configured cache.
    pub fn runtime_factory(mut self, factory: Arc<dyn RuntimeFactory>) -> Self {
        self.runtimes = Some(factory);
        self
    }

    pub fn mindset(mut self, mindset: Mindset) -> Self {
        self.mindset = Some(Arc::new(mindset));
        self
    }

    pub fn focus(mut self, focus: Focus) -> Self {
        self.focus = Some(Arc::new(focus));
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.container = Some(Arc::new(container));
        self
    }

    pub fn queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn build(self) -> Result<Ghost> {
        let cache = self
            .cache
            .ok_or_else(|| Error::bootstrap("ghost needs a cache"))?;
        let mindset = self
            .mindset
            .ok_or_else(|| Error::bootstrap("ghost needs a mindset"))?;
        let runtimes: Arc<dyn RuntimeFactory> = match self.runtimes {
            Some(factory) => factory,
            None => Arc::new(CacheRuntime::factory(
                cache.clone(),
                self.config.process_default_overdue,
            )),
        };
        Ok(Ghost {
            config: self.config,
            cache,
            runtimes,
            mindset,
            focus: self
                .focus
                .unwrap_or_else(|| Arc::new(Focus::with_default_drivers())),
            container: self.container.unwrap_or_default(),
            queue: self.queue,
        })
    }
}

impl Ghost {
    pub fn builder(config: GhostConfig) -> GhostBuilder {
        GhostBuilder {
            config,
            cache: None,
            runtimes: None,
            mindset: None,
            focus: None,
            container: None,
            queue: None,
        }
    }

    pub fn config(&self) -> &GhostConfig {
        &self.config
    }

    pub fn mindset(&self) -> &Mindset {
        &self.mindset
    }

    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Run one turn for `input`. Never fails: engine errors come back as a
    /// single error output.
    pub fn handle(&self, input: Input) -> Reply {
        let session = Session::new(&input.trace, self.cache.clone(), self.config.session_overdue);
        let runtime = self.runtimes.create();

        let pid = match self.resolve_process_id(&input, &session, runtime.as_ref()) {
            Ok(pid) => pid,
            Err(e) => return self.failed_turn(&input, e),
        };
        match runtime.lock_process(&session.session_id, &pid, self.config.process_lock_overdue) {
            Ok(true) => {}
            Ok(false) => return self.failed_turn(&input, Error::busy(&session.session_id)),
            Err(e) => return self.failed_turn(&input, e),
        }

        tracing::info!(session = %session.session_id, pid = %pid, mid = %input.mid, "Turn started");
        let result = self.run_turn(&input, &session, runtime.as_ref(), &pid);

        if let Err(e) = runtime.unlock_process(&session.session_id, &pid) {
            tracing::warn!(session = %session.session_id, "Failed to release process lock: {}", e);
        }

        match result {
            Ok(reply) => {
                tracing::info!(
                    session = %session.session_id,
                    outputs = reply.outputs.len(),
                    async_inputs = reply.async_inputs.len(),
                    "Turn finished"
                );
                reply
            }
            Err(e) => self.failed_turn(&input, e),
        }
    }

    /// Push async inputs to the message queue, in order.
    pub fn deliver(&self, inputs: Vec<Input>) -> Result<usize> {
        if inputs.is_empty() {
            return Ok(0);
        }
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| Error::bootstrap("no message queue configured for async inputs"))?;
        let count = inputs.len();
        for input in inputs {
            queue.push(input)?;
        }
        Ok(count)
    }

    fn resolve_process_id(
        &self,
        input: &Input,
        session: &Session,
        runtime: &dyn RuntimeDriver,
    ) -> Result<String> {
        if let Some(pid) = input.trace.process_id.as_ref().filter(|p| !p.is_empty()) {
            return Ok(pid.clone());
        }
        match runtime.get_process_id(&session.session_id)? {
            Some(pid) => Ok(pid),
            None => runtime.claim_process_id(
                &session.session_id,
                &session.new_process_id(),
                self.config.process_lock_overdue,
            ),
        }
    }

    fn new_process(&self, session: &Session, pid: &str, clone_id: Option<&str>) -> Result<Process> {
        let root_url = self.config.root_url.clone();
        let think = self.mindset.fetch(&root_url.think, clone_id).ok_or_else(|| {
            Error::bootstrap(format!("root think {} is not registered", root_url.think))
        })?;
        let mut root = Task::new(root_url);
        think.options().apply(&mut root);
        tracing::info!(session = %session.session_id, pid, "New process rooted at {}", root.url);
        Ok(Process::new(&session.session_id, pid, root))
    }

    fn run_turn(
        &self,
        input: &Input,
        session: &Session,
        runtime: &dyn RuntimeDriver,
        pid: &str,
    ) -> Result<Reply> {
        let clone_id = Some(input.trace.clone_id.as_str()).filter(|c| !c.is_empty());
        let process = match runtime.fetch_process(&session.session_id, pid)? {
            Some(process) => process,
            None => self.new_process(session, pid, clone_id)?,
        };
        let process = process.new_round();

        let mut ctx = Context::new(
            input,
            session,
            process,
            &self.container,
            &self.mindset,
            &self.focus,
            runtime,
            &self.config,
        );
        let op = kernel::seed(&mut ctx)?;
        let steps = kernel::run_loop(&mut ctx, op)?;
        tracing::debug!(session = %session.session_id, steps, "Operator loop finished");

        let TurnResult {
            mut process,
            mut outputs,
            async_inputs,
            rewound,
        } = ctx.finish();

        if rewound {
            tracing::info!(session = %session.session_id, "Turn rewound, nothing saved");
            return Ok(Reply::default());
        }

        if process.quitting {
            let long_term: Vec<&Task> = process.tasks.iter().filter(|t| t.is_long_term).collect();
            runtime.save_task_data(&process.sid, &process.pid, &long_term)?;
            runtime.remove_process(&process)?;
            tracing::info!(session = %session.session_id, pid, "Process quit");
        } else {
            let dropped = process.gc(self.config.process_max_tasks);
            process.validate()?;
            runtime.save_process_data(&process)?;
            let long_term: Vec<&Task> = process
                .tasks
                .iter()
                .chain(dropped.iter())
                .filter(|t| t.is_long_term)
                .collect();
            runtime.save_task_data(&process.sid, &process.pid, &long_term)?;
        }

        if input.is_async {
            for output in &mut outputs {
                output.is_async = true;
            }
        }
        Ok(Reply {
            outputs,
            async_inputs,
        })
    }

    /// Single error output for a turn that could not complete. Nothing the
    /// turn produced is kept.
    fn failed_turn(&self, input: &Input, error: Error) -> Reply {
        let kind = error.kind();
        let message = match kind {
            ErrorKind::Busy => {
                tracing::info!(session = %input.session_id(), "Session busy");
                Message::text(self.config.on_busy.clone())
            }
            ErrorKind::Bootstrap => {
                tracing::error!(session = %input.session_id(), "Bootstrap error: {}", error);
                Message::error(kind.as_str(), error.to_string())
            }
            _ => {
                tracing::error!(
                    session = %input.session_id(),
                    kind = kind.as_str(),
                    "Turn failed: {}",
                    error
                );
                Message::error(kind.as_str(), self.config.on_unexpected.clone())
            }
        };
        if kind != ErrorKind::Busy {
            for (depth, frame) in error
                .traceback(self.config.exception_traceback_limit)
                .iter()
                .enumerate()
            {
                tracing::debug!(depth, "  {}", frame);
            }
        }
        Reply::single(Output::reply(input, message))
    }
}
