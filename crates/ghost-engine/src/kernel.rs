//! Operator kernel
//!
//! `run_loop` keeps applying operators until one ends the turn. Each
//! operator may deliver events to stages, rewrite the task stack, and hand
//! back the operator to run next.
//!
//! Stage-level errors never leave the kernel: they become a failure walk
//! starting at the task that raised them. Everything else aborts the turn.

use crate::context::Context;
use crate::event::{Event, EventKind};
use crate::focus::{Intention, Matched, Signal, Target};
use crate::operator::{Callbacks, Operator, Withdraw, WithdrawKind};
use crate::think::{Stage, StageResult, Think};
use ghost_core::{Error, Message, Result, Url};
use ghost_runtime::{Task, TaskLevel, TaskStatus};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Run operators starting at `op` until the turn ends. Returns the number of
/// steps taken.
pub fn run_loop(ctx: &mut Context<'_>, op: Operator) -> Result<usize> {
    let cap = ctx.config().operator_depth_cap;
    let mut next = Some(op);
    let mut steps = 0;
    while let Some(op) = next {
        steps += 1;
        if steps > cap {
            return Err(Error::OperatorDepthExceeded { limit: cap });
        }
        tracing::debug!(
            step = steps,
            op = op.name(),
            tid = op.tid().unwrap_or("-"),
            "Running operator"
        );
        next = step(ctx, op)?;
    }
    Ok(steps)
}

/// First operator of a turn, chosen from the input.
pub fn seed(ctx: &mut Context<'_>) -> Result<Operator> {
    let input = ctx.input();
    let current = ctx.process().current.clone();
    if let Message::Tasked { tid, url } = &input.payload {
        return match restore(ctx, tid, url) {
            Err(e) if !e.is_fatal() => {
                tracing::warn!(tid = %tid, "Cannot restore task: {}", e);
                Ok(Operator::Fail {
                    tid: current,
                    reason: e.to_string(),
                    notify_self: true,
                })
            }
            other => other,
        };
    }
    if let Some(url) = &input.url {
        return Ok(Operator::Intend {
            tid: current,
            url: url.clone(),
        });
    }
    Ok(Operator::Receive)
}

/// Deliver `event` to the stage its task is parked at.
pub fn dispatch(ctx: &mut Context<'_>, event: &Event) -> Result<Option<Operator>> {
    call_stage(ctx, event, |stage, ctx, task| stage.on_event(ctx, task, event))
}

/// Apply one operator, turning stage-level errors into a failure walk.
fn step(ctx: &mut Context<'_>, op: Operator) -> Result<Option<Operator>> {
    let origin = op
        .tid()
        .map(str::to_string)
        .unwrap_or_else(|| ctx.process().current.clone());
    match run_operator(ctx, op) {
        Err(e) if !e.is_fatal() => {
            tracing::warn!(tid = %origin, "Operator failed: {}", e);
            Ok(Some(Operator::Fail {
                tid: origin,
                reason: e.to_string(),
                notify_self: true,
            }))
        }
        other => other,
    }
}

pub fn run_operator(ctx: &mut Context<'_>, op: Operator) -> Result<Option<Operator>> {
    match op {
        Operator::Receive => receive(ctx),
        Operator::Activate { tid } => activate(ctx, &tid),
        Operator::Forward { tid, stages } => forward(ctx, &tid, stages),
        Operator::Awaits { tid } => {
            ctx.process_mut().set_status(&tid, TaskStatus::Awaiting)?;
            ctx.process_mut().pop_to(&tid)?;
            Ok(None)
        }
        Operator::Repeat { tid } => {
            ctx.process_mut().set_status(&tid, TaskStatus::Running)?;
            Ok(Some(activating(tid)))
        }
        Operator::Rewind => {
            tracing::debug!("Turn rewound");
            ctx.rewind();
            Ok(None)
        }
        Operator::Restart { tid } => restart(ctx, &tid),
        Operator::Finish { tid, result } => finish(ctx, &tid, result),
        Operator::Cancel { tid, notify_self } => Ok(Some(withdraw(
            ctx,
            WithdrawKind::Cancel,
            None,
            tid,
            notify_self,
        ))),
        Operator::Quit { tid, notify_self } => Ok(Some(withdraw(
            ctx,
            WithdrawKind::Quit,
            None,
            tid,
            notify_self,
        ))),
        Operator::Fail {
            tid,
            reason,
            notify_self,
        } => Ok(Some(withdraw(
            ctx,
            WithdrawKind::Fail,
            Some(reason),
            tid,
            notify_self,
        ))),
        Operator::DependOn { tid, url } => depend_on(ctx, &tid, url),
        Operator::Redirect { tid, url } => redirect(ctx, &tid, url),
        Operator::Intend { tid, url } => intend(ctx, &tid, url),
        Operator::Preempt { tid } => {
            ctx.process_mut().pop_to(&tid)?;
            ctx.process_mut().set_status(&tid, TaskStatus::Running)?;
            Ok(Some(Operator::dispatch(
                Event::preempted(tid.clone()),
                Operator::Awaits { tid },
            )))
        }
        Operator::Dispatch { event, then } => Ok(Some(dispatch(ctx, &event)?.unwrap_or(*then))),
        Operator::Callbacks(pending) => callbacks(ctx, pending),
        Operator::Withdrawing(walk) => withdrawing(ctx, walk),
    }
}

// ---------------------------------------------------------------------------
// Stage plumbing
// ---------------------------------------------------------------------------

fn task_of(ctx: &Context<'_>, tid: &str) -> Result<Task> {
    ctx.process()
        .get(tid)
        .cloned()
        .ok_or_else(|| Error::logic(format!("task {} is not in process", tid)))
}

fn think_of(ctx: &Context<'_>, think: &str) -> Result<Arc<dyn Think>> {
    ctx.mindset()
        .fetch(think, ctx.clone_id())
        .ok_or_else(|| Error::think_not_found(think))
}

fn stage_of(ctx: &Context<'_>, task: &Task) -> Result<(Arc<dyn Think>, Arc<dyn Stage>)> {
    let think = think_of(ctx, task.think())?;
    let name = if task.stage().is_empty() {
        think.entry().to_string()
    } else {
        task.stage().to_string()
    };
    match think.fetch_stage(&name) {
        Some(stage) => Ok((think, stage)),
        None => Err(Error::stage_not_found(task.think(), name)),
    }
}

/// Load the vars of a task seen for the first time this turn.
fn instance(ctx: &Context<'_>, task: &mut Task, think: &dyn Think) -> Result<()> {
    if task.instanced {
        return Ok(());
    }
    if task.is_long_term {
        let sid = &ctx.process().sid;
        if let Some(vars) = ctx.runtime().fetch_task_data(sid, &task.tid)? {
            task.vars = Some(vars);
        }
    }
    if task.vars.is_none() {
        task.vars = think.new_vars(&task.url.args);
    }
    task.instanced = true;
    Ok(())
}

/// Task for `url` with its think's options applied.
fn new_task(ctx: &Context<'_>, tid: String, url: Url) -> Result<Task> {
    let think = think_of(ctx, &url.think)?;
    let mut task = Task::with_tid(tid, url);
    think.options().apply(&mut task);
    Ok(task)
}

/// Run `f` against the stage of `event.tid` on a working copy of the task,
/// then write the copy back.
fn call_stage<F>(ctx: &mut Context<'_>, event: &Event, f: F) -> Result<Option<Operator>>
where
    F: FnOnce(&dyn Stage, &mut Context<'_>, &mut Task) -> StageResult,
{
    let mut task = task_of(ctx, &event.tid)?;
    let outcome = match stage_of(ctx, &task) {
        Ok((think, stage)) => match instance(ctx, &mut task, think.as_ref()) {
            Ok(()) => {
                tracing::debug!(
                    tid = %task.tid,
                    url = %task.url,
                    event = event.name(),
                    "Dispatching event"
                );
                f(stage.as_ref(), ctx, &mut task)
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    if ctx.process().contains(&task.tid) {
        ctx.process_mut().replace(task)?;
    }
    absorb(event, outcome)
}

/// Stage errors become a failure of the raising task. A failure raised while
/// handling a failure is dropped.
fn absorb(event: &Event, outcome: StageResult) -> Result<Option<Operator>> {
    match outcome {
        Ok(op) => Ok(op),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            if matches!(event.kind, EventKind::Failed { .. }) {
                tracing::warn!(tid = %event.tid, "Error while handling failure: {}", e);
                return Ok(None);
            }
            tracing::warn!(tid = %event.tid, event = event.name(), "Stage error: {}", e);
            Ok(Some(Operator::Fail {
                tid: event.tid.clone(),
                reason: e.to_string(),
                notify_self: true,
            }))
        }
    }
}

fn activating(tid: String) -> Operator {
    Operator::dispatch(Event::activating(tid.clone()), Operator::Awaits { tid })
}

fn set_waiting(ctx: &mut Context<'_>, tid: &str) -> Result<()> {
    match ctx.process().get(tid) {
        Some(task) if task.is_alive() => ctx.process_mut().set_status(tid, TaskStatus::Waiting),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Input routing
// ---------------------------------------------------------------------------

fn receive(ctx: &mut Context<'_>) -> Result<Option<Operator>> {
    let current = ctx.process().current.clone();
    let task = task_of(ctx, &current)?;
    if task.status == TaskStatus::New {
        return Ok(Some(Operator::Activate { tid: current }));
    }

    if let Some(matched) = match_intentions(ctx, &task)? {
        tracing::debug!(
            intention = %matched.intention.name,
            kind = %matched.intention.kind,
            "Input matched intention"
        );
        let url = matched.url();
        match matched.intention.target {
            Target::Reaction(name) => return react(ctx, &current, &name, &matched.args),
            Target::Signal(signal) => return Ok(Some(signal_operator(signal, current))),
            Target::Think(_) => {
                if let Some(url) = url {
                    return Ok(Some(Operator::Intend { tid: current, url }));
                }
            }
        }
    }

    if let Some(op) = dispatch(ctx, &Event::received(current.clone()))? {
        return Ok(Some(op));
    }
    for tid in ctx.process().ancestors_of(&current) {
        let event = Event::received(tid);
        if let Some(op) = call_stage(ctx, &event, |stage, ctx, task| stage.fallback(ctx, task))? {
            return Ok(Some(op));
        }
    }
    Ok(Some(Operator::Awaits { tid: current }))
}

/// Intention groups in precedence order: the current stage, public tasks
/// top-down, then globals.
fn match_intentions(ctx: &Context<'_>, current: &Task) -> Result<Option<Matched>> {
    let mut groups: Vec<Vec<Intention>> = Vec::new();

    match stage_of(ctx, current) {
        Ok((_, stage)) => {
            let mut local = stage.attentions();
            local.extend(stage.reactions().iter().map(|r| r.intention()));
            groups.push(local);
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => tracing::warn!(tid = %current.tid, "No stage attentions: {}", e),
    }

    for task in ctx
        .process()
        .tasks
        .iter()
        .filter(|t| t.is_alive() && t.level == TaskLevel::Public)
    {
        if let Some(think) = ctx.mindset().fetch(task.think(), ctx.clone_id()) {
            let attentions = think.attentions();
            if !attentions.is_empty() {
                groups.push(attentions);
            }
        }
    }

    groups.push(ctx.focus().globals().to_vec());
    Ok(ctx.focus().match_groups(ctx.input(), &groups))
}

fn react(
    ctx: &mut Context<'_>,
    tid: &str,
    name: &str,
    args: &serde_json::Map<String, Value>,
) -> Result<Option<Operator>> {
    let event = Event::received(tid.to_string());
    let reply = call_stage(ctx, &event, |stage, ctx, task| {
        match stage.reactions().into_iter().find(|r| r.name() == name) {
            Some(reaction) => reaction.react(ctx, task, args),
            None => {
                tracing::warn!(tid = %task.tid, "Reaction {} not found on stage", name);
                Ok(None)
            }
        }
    })?;
    Ok(Some(reply.unwrap_or(Operator::Awaits {
        tid: tid.to_string(),
    })))
}

fn signal_operator(signal: Signal, tid: String) -> Operator {
    match signal {
        Signal::Quit => Operator::Quit {
            tid,
            notify_self: true,
        },
        Signal::Cancel => Operator::Cancel {
            tid,
            notify_self: true,
        },
        Signal::Restart => Operator::Restart { tid },
        Signal::Repeat => Operator::Repeat { tid },
        Signal::Rewind => Operator::Rewind,
    }
}

// ---------------------------------------------------------------------------
// Stage movement
// ---------------------------------------------------------------------------

fn activate(ctx: &mut Context<'_>, tid: &str) -> Result<Option<Operator>> {
    let mut task = task_of(ctx, tid)?;
    let think = think_of(ctx, task.think())?;
    instance(ctx, &mut task, think.as_ref())?;
    if task.url.is_entry() {
        task.url.stage = think.entry().to_string();
    }
    if think.fetch_stage(task.stage()).is_none() {
        return Err(Error::stage_not_found(task.think(), task.stage()));
    }
    task.status = TaskStatus::Running;
    ctx.process_mut().push(task);
    Ok(Some(activating(tid.to_string())))
}

fn forward(ctx: &mut Context<'_>, tid: &str, stages: Vec<String>) -> Result<Option<Operator>> {
    let mut task = task_of(ctx, tid)?;
    for stage in stages.into_iter().rev() {
        task.stages.push_front(stage);
    }
    let Some(next) = task.stages.pop_front() else {
        return Ok(Some(Operator::Finish {
            tid: tid.to_string(),
            result: Value::Null,
        }));
    };
    ctx.process_mut().replace(task)?;

    if let Some(op) = dispatch(ctx, &Event::withdrawing(tid.to_string()))? {
        // The old stage keeps the task; the move is put back in the queue.
        if let Some(task) = ctx.process_mut().get_mut(tid) {
            task.stages.push_front(next);
        }
        return Ok(Some(op));
    }

    let mut task = task_of(ctx, tid)?;
    tracing::debug!(tid, from = %task.url, to = %next, "Forwarding");
    task.url.stage = next;
    task.status = TaskStatus::Running;
    ctx.process_mut().replace(task)?;
    Ok(Some(activating(tid.to_string())))
}

fn restart(ctx: &mut Context<'_>, tid: &str) -> Result<Option<Operator>> {
    if let Some(op) = dispatch(ctx, &Event::withdrawing(tid.to_string()))? {
        return Ok(Some(op));
    }
    let mut task = task_of(ctx, tid)?;
    let think = think_of(ctx, task.think())?;
    task.url.stage.clear();
    task.stages.clear();
    task.vars = think.new_vars(&task.url.args);
    task.instanced = true;
    task.result = None;
    task.depending = None;
    task.status = TaskStatus::New;
    ctx.process_mut().replace(task)?;
    Ok(Some(Operator::Activate {
        tid: tid.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Completion and callbacks
// ---------------------------------------------------------------------------

fn finish(ctx: &mut Context<'_>, tid: &str, result: Value) -> Result<Option<Operator>> {
    let mut task = task_of(ctx, tid)?;
    task.finish(result.clone());
    let mut callbacks = std::mem::take(&mut task.callbacks);
    ctx.process_mut().replace(task)?;
    tracing::debug!(tid, callbacks = callbacks.len(), "Task finished");

    if callbacks.is_empty() {
        return Ok(resume_previous(ctx, tid));
    }
    let process = ctx.process();
    callbacks.sort_by_key(|cb| process.position(cb).unwrap_or(usize::MAX));
    Ok(Some(Operator::Callbacks(Callbacks {
        from: tid.to_string(),
        result,
        first: callbacks.first().cloned(),
        pending: callbacks.into(),
        chosen: None,
    })))
}

/// Give focus back to the previous live task; with none left the process ends.
fn resume_previous(ctx: &mut Context<'_>, tid: &str) -> Option<Operator> {
    match ctx.process().previous_live(tid) {
        Some(prev) => Some(Operator::Preempt {
            tid: prev.tid.clone(),
        }),
        None => {
            tracing::debug!(tid, "No live task left, process quitting");
            ctx.process_mut().quitting = true;
            None
        }
    }
}

fn callbacks(ctx: &mut Context<'_>, mut cb: Callbacks) -> Result<Option<Operator>> {
    let Some(tid) = cb.pending.pop_front() else {
        if let Some(op) = cb.chosen {
            return Ok(Some(*op));
        }
        let first_alive = cb
            .first
            .filter(|first| ctx.process().get(first).is_some_and(Task::is_alive));
        return Ok(match first_alive {
            Some(first) => Some(Operator::Preempt { tid: first }),
            None => resume_previous(ctx, &cb.from),
        });
    };

    match ctx.process_mut().get_mut(&tid) {
        Some(task) if task.is_alive() => {
            if task.status == TaskStatus::Depending {
                task.status = TaskStatus::Waiting;
                task.depending = None;
            }
        }
        _ => {
            tracing::warn!(tid = %tid, from = %cb.from, "Callback target is gone");
            return Ok(Some(Operator::Callbacks(cb)));
        }
    }

    let event = Event::callback(tid.clone(), cb.from.clone(), cb.result.clone());
    if let Some(op) = dispatch(ctx, &event)? {
        if cb.chosen.is_none() {
            cb.chosen = Some(Box::new(op));
        } else {
            tracing::warn!(
                tid = %tid,
                op = op.name(),
                "Dropping callback reply, another task already took over"
            );
        }
    }
    Ok(Some(Operator::Callbacks(cb)))
}

fn depend_on(ctx: &mut Context<'_>, tid: &str, url: Url) -> Result<Option<Operator>> {
    let target = Task::make_tid(&url, None);
    if target == tid {
        return Err(Error::stage(&url.think, &url.stage, "a task cannot depend on itself"));
    }

    let existing = ctx.process().get(&target).map(|t| (t.status, t.result.clone()));
    match existing {
        Some((TaskStatus::Finished, result)) => Ok(Some(Operator::dispatch(
            Event::callback(tid.to_string(), target, result.unwrap_or(Value::Null)),
            Operator::Awaits {
                tid: tid.to_string(),
            },
        ))),
        Some((status, _)) if status.is_alive() => {
            if let Some(task) = ctx.process_mut().get_mut(&target) {
                task.add_callback(tid);
            }
            depend(ctx, tid, &target)?;
            let stage = retarget(ctx, &target, url);
            resume_at(ctx, target, stage)
        }
        _ => {
            let mut task = new_task(ctx, target.clone(), url)?;
            task.add_callback(tid);
            depend(ctx, tid, &target)?;
            ctx.process_mut().push(task);
            Ok(Some(Operator::Activate { tid: target }))
        }
    }
}

fn depend(ctx: &mut Context<'_>, tid: &str, target: &str) -> Result<()> {
    let round = ctx.process().round;
    let task = ctx
        .process_mut()
        .get_mut(tid)
        .ok_or_else(|| Error::logic(format!("task {} is not in process", tid)))?;
    task.depend_on(target);
    task.touch(round);
    Ok(())
}

fn redirect(ctx: &mut Context<'_>, tid: &str, url: Url) -> Result<Option<Operator>> {
    let target = Task::make_tid(&url, None);
    if target == tid {
        return Ok(Some(move_self(ctx, tid, url)));
    }
    let live = ctx.process().get(&target).is_some_and(Task::is_alive);
    if live {
        set_waiting(ctx, tid)?;
        if let Some(existing) = ctx.process_mut().get_mut(&target) {
            existing.add_callback(tid);
        }
        let stage = retarget(ctx, &target, url);
        return resume_at(ctx, target, stage);
    }

    let mut task = new_task(ctx, target.clone(), url)?;
    set_waiting(ctx, tid)?;
    task.add_callback(tid);
    ctx.process_mut().push(task);
    Ok(Some(Operator::Activate { tid: target }))
}

fn intend(ctx: &mut Context<'_>, tid: &str, url: Url) -> Result<Option<Operator>> {
    let target = Task::make_tid(&url, None);
    if target == tid {
        return Ok(Some(move_self(ctx, tid, url)));
    }
    if ctx.process().get(&target).is_some_and(Task::is_alive) {
        set_waiting(ctx, tid)?;
        let stage = retarget(ctx, &target, url);
        return resume_at(ctx, target, stage);
    }
    Ok(Some(Operator::Redirect {
        tid: tid.to_string(),
        url,
    }))
}

/// Carry `url` over to a task that already exists. Its args are merged into
/// the task's; a named stage other than the one the task is at is returned.
fn retarget(ctx: &mut Context<'_>, target: &str, url: Url) -> Option<String> {
    let task = ctx.process_mut().get_mut(target)?;
    task.url.args.extend(url.args);
    (!url.stage.is_empty() && url.stage != task.url.stage).then_some(url.stage)
}

/// A task addressed by its own url moves to the named stage, or repeats.
fn move_self(ctx: &mut Context<'_>, tid: &str, url: Url) -> Operator {
    let tid = tid.to_string();
    match retarget(ctx, &tid, url) {
        Some(stage) => Operator::Forward {
            tid,
            stages: vec![stage],
        },
        None => Operator::Repeat { tid },
    }
}

/// Give focus to live `target`, moving it to `stage` when one is named.
fn resume_at(
    ctx: &mut Context<'_>,
    target: String,
    stage: Option<String>,
) -> Result<Option<Operator>> {
    match stage {
        Some(stage) => {
            ctx.process_mut().pop_to(&target)?;
            Ok(Some(Operator::Forward {
                tid: target,
                stages: vec![stage],
            }))
        }
        None => Ok(Some(Operator::Preempt { tid: target })),
    }
}

/// Bring a long-term task back: preempt it when present, otherwise recreate
/// it under its stored id and activate it.
fn restore(ctx: &mut Context<'_>, tid: &str, url: &Url) -> Result<Operator> {
    let current = ctx.process().current.clone();
    if current != tid {
        set_waiting(ctx, &current)?;
    }
    if ctx.process().get(tid).is_some_and(Task::is_alive) {
        return Ok(Operator::Preempt {
            tid: tid.to_string(),
        });
    }
    let task = new_task(ctx, tid.to_string(), url.clone())?;
    ctx.process_mut().push(task);
    Ok(Operator::Activate {
        tid: tid.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Cancel / quit / fail walks
// ---------------------------------------------------------------------------

fn withdraw(
    ctx: &Context<'_>,
    kind: WithdrawKind,
    reason: Option<String>,
    tid: String,
    notify_self: bool,
) -> Operator {
    let mut pending = VecDeque::new();
    let mut walked = Vec::new();
    let ancestors = ctx.process().ancestors_of(&tid);
    if notify_self {
        pending.push_back(tid);
    } else {
        walked.push(tid);
    }
    pending.extend(ancestors);
    Operator::Withdrawing(Withdraw {
        kind,
        reason,
        pending,
        walked,
    })
}

fn withdrawing(ctx: &mut Context<'_>, mut walk: Withdraw) -> Result<Option<Operator>> {
    let Some(tid) = walk.pending.pop_front() else {
        collapse(ctx, &walk)?;
        return Ok(None);
    };
    if !ctx.process().get(&tid).is_some_and(Task::is_alive) {
        return Ok(Some(Operator::Withdrawing(walk)));
    }

    match dispatch(ctx, &walk.event_for(&tid))? {
        Some(op) => {
            tracing::debug!(tid = %tid, walked = walk.walked.len(), "Withdraw intercepted");
            terminate(ctx, &walk.walked, walk.kind)?;
            Ok(Some(op))
        }
        None => {
            walk.walked.push(tid);
            Ok(Some(Operator::Withdrawing(walk)))
        }
    }
}

fn terminal_status(kind: WithdrawKind) -> TaskStatus {
    match kind {
        WithdrawKind::Cancel => TaskStatus::Canceled,
        WithdrawKind::Quit => TaskStatus::Dead,
        WithdrawKind::Fail => TaskStatus::Failed,
    }
}

/// End a task for good. It will never finish, so nobody waits on it.
fn kill(ctx: &mut Context<'_>, tid: &str, status: TaskStatus) -> Result<()> {
    if !ctx.process().contains(tid) {
        return Ok(());
    }
    ctx.process_mut().set_status(tid, status)?;
    if let Some(task) = ctx.process_mut().get_mut(tid) {
        task.callbacks.clear();
        task.depending = None;
    }
    Ok(())
}

fn terminate(ctx: &mut Context<'_>, tids: &[String], kind: WithdrawKind) -> Result<()> {
    let status = terminal_status(kind);
    for tid in tids {
        kill(ctx, tid, status)?;
    }
    Ok(())
}

/// Nobody intercepted: every task goes down with the process.
fn collapse(ctx: &mut Context<'_>, walk: &Withdraw) -> Result<()> {
    let status = terminal_status(walk.kind);
    let alive: Vec<String> = ctx
        .process()
        .tasks
        .iter()
        .filter(|t| t.is_alive())
        .map(|t| t.tid.clone())
        .collect();
    for tid in &alive {
        kill(ctx, tid, status)?;
    }
    ctx.process_mut().quitting = true;
    tracing::debug!(kind = ?walk.kind, tasks = alive.len(), "Process collapsed");

    if walk.kind == WithdrawKind::Fail {
        let origin = walk.walked.first().cloned().unwrap_or_default();
        let reason = walk.reason.clone().unwrap_or_default();
        ctx.send_as(origin).error("failed", reason);
    }
    Ok(())
}
