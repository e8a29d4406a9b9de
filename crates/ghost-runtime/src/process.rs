//! Process: the ordered task stack owned by a session
//!
//! Tasks are kept top-first: index 0 is the current task. The root task can
//! be moved but never removed.

use crate::task::{Task, TaskStatus};
use ghost_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Process {
    pub sid: String,
    pub pid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub round: u64,
    pub root: String,
    pub current: String,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub quitting: bool,
}

impl Process {
    pub fn new(sid: impl Into<String>, pid: impl Into<String>, root: Task) -> Self {
        let tid = root.tid.clone();
        Self {
            sid: sid.into(),
            pid: pid.into(),
            parent_id: None,
            round: 0,
            root: tid.clone(),
            current: tid,
            tasks: vec![root],
            quitting: false,
        }
    }

    /// Copy for the next turn: round advanced, transient marks cleared.
    pub fn new_round(&self) -> Self {
        let mut next = self.clone();
        next.round += 1;
        for task in &mut next.tasks {
            task.touched = false;
        }
        next
    }

    pub fn get(&self, tid: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.tid == tid)
    }

    pub fn get_mut(&mut self, tid: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.tid == tid)
    }

    pub fn contains(&self, tid: &str) -> bool {
        self.position(tid).is_some()
    }

    pub fn position(&self, tid: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.tid == tid)
    }

    pub fn root_task(&self) -> Option<&Task> {
        self.get(&self.root)
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.get(&self.current)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Put `task` on top of the stack, replacing any older copy.
    pub fn push(&mut self, mut task: Task) {
        if let Some(pos) = self.position(&task.tid) {
            self.tasks.remove(pos);
        }
        task.touch(self.round);
        self.current = task.tid.clone();
        self.tasks.insert(0, task);
    }

    /// Upsert each task and bring it to the top, in the given order.
    pub fn store_task(&mut self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            self.push(task);
        }
    }

    /// Write back a task in place without changing the stack order.
    pub fn replace(&mut self, mut task: Task) -> Result<()> {
        task.touch(self.round);
        match self.get_mut(&task.tid) {
            Some(slot) => {
                *slot = task;
                Ok(())
            }
            None => Err(Error::logic(format!("task {} is not in process", task.tid))),
        }
    }

    /// Bring `tid` to the top, keeping the order of everything else.
    pub fn pop_to(&mut self, tid: &str) -> Result<()> {
        let pos = self
            .position(tid)
            .ok_or_else(|| Error::logic(format!("cannot pop to missing task {}", tid)))?;
        if pos > 0 {
            let task = self.tasks.remove(pos);
            self.tasks.insert(0, task);
        }
        self.current = tid.to_string();
        Ok(())
    }

    pub fn set_status(&mut self, tid: &str, status: TaskStatus) -> Result<()> {
        let round = self.round;
        let task = self
            .get_mut(tid)
            .ok_or_else(|| Error::logic(format!("task {} is not in process", tid)))?;
        task.status = status;
        task.touch(round);
        Ok(())
    }

    /// First task other than `exclude` that can take focus again.
    pub fn previous_live(&self, exclude: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| {
            t.tid != exclude
                && matches!(
                    t.status,
                    TaskStatus::Waiting
                        | TaskStatus::Awaiting
                        | TaskStatus::Running
                        | TaskStatus::New
                )
        })
    }

    /// Live tasks below `tid` in stack order.
    pub fn ancestors_of(&self, tid: &str) -> Vec<String> {
        let start = self.position(tid).map(|p| p + 1).unwrap_or(0);
        self.tasks[start..]
            .iter()
            .filter(|t| t.is_alive())
            .map(|t| t.tid.clone())
            .collect()
    }

    /// Tasks that must survive garbage collection.
    fn essential(&self) -> HashSet<String> {
        let mut keep = HashSet::new();
        keep.insert(self.root.clone());
        keep.insert(self.current.clone());
        for task in &self.tasks {
            if task.has_callbacks() {
                keep.insert(task.tid.clone());
                keep.extend(task.callbacks.iter().cloned());
            }
        }
        keep
    }

    /// Drop finished and forgettable tasks, then cap the stack at
    /// `max_tasks`, evicting the oldest non-essential tasks first.
    /// Returns the dropped tasks.
    pub fn gc(&mut self, max_tasks: usize) -> Vec<Task> {
        let essential = self.essential();
        let mut dropped = Vec::new();

        let (kept, removed): (Vec<Task>, Vec<Task>) =
            std::mem::take(&mut self.tasks).into_iter().partition(|t| {
                essential.contains(&t.tid)
                    || t.is_sleeping()
                    || (!t.is_forgettable && t.is_alive())
            });
        self.tasks = kept;
        dropped.extend(removed);

        while self.tasks.len() > max_tasks {
            let victim = self
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, t)| !essential.contains(&t.tid))
                .min_by(|(pa, a), (pb, b)| a.round.cmp(&b.round).then(pb.cmp(pa)))
                .map(|(pos, _)| pos);
            match victim {
                Some(pos) => dropped.push(self.tasks.remove(pos)),
                None => break,
            }
        }

        if !dropped.is_empty() {
            let gone: HashSet<&str> = dropped.iter().map(|t| t.tid.as_str()).collect();
            for task in &mut self.tasks {
                task.callbacks.retain(|cb| !gone.contains(cb.as_str()));
            }
            tracing::debug!(
                pid = %self.pid,
                dropped = dropped.len(),
                remaining = self.tasks.len(),
                "Process garbage collected"
            );
        }
        dropped
    }

    /// Checks the stack invariants; used before persisting.
    pub fn validate(&self) -> Result<()> {
        if !self.contains(&self.root) {
            return Err(Error::logic(format!("root {} missing from process", self.root)));
        }
        if !self.contains(&self.current) {
            return Err(Error::logic(format!(
                "current {} missing from process",
                self.current
            )));
        }
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.tid.as_str()) {
                return Err(Error::logic(format!("duplicate task {}", task.tid)));
            }
            if task.status == TaskStatus::Depending && task.depending.is_none() {
                return Err(Error::logic(format!(
                    "task {} is depending on nothing",
                    task.tid
                )));
            }
        }
        Ok(())
    }
}
