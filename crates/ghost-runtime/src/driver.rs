//! Runtime driver: process persistence and locking on top of a `Cache`
//!
//! Key layout:
//!
//!   runtime:session:{sid}:process_id               current pid pointer
//!   runtime:session:{sid}:process:{pid}            process record (JSON)
//!   runtime:session:{sid}:task:{tid}               long-term task vars (JSON)
//!   runtime:session:{sid}:process:{pid}:locker     process mutex

use crate::cache::Cache;
use crate::process::Process;
use crate::task::Task;
use ghost_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub trait RuntimeDriver: Send + Sync {
    fn get_process_id(&self, sid: &str) -> Result<Option<String>>;

    /// Point a session that has no process yet at `pid`, unless a concurrent
    /// turn got there first. Returns the pid the session now points at.
    fn claim_process_id(&self, sid: &str, pid: &str, overdue: u64) -> Result<String>;

    fn fetch_process(&self, sid: &str, pid: &str) -> Result<Option<Process>>;

    /// Acquire the process mutex. Idempotent for the instance holding it.
    fn lock_process(&self, sid: &str, pid: &str, overdue: u64) -> Result<bool>;

    fn unlock_process(&self, sid: &str, pid: &str) -> Result<bool>;

    /// Persist the process record and point the session at it.
    fn save_process_data(&self, process: &Process) -> Result<()>;

    /// Persist the vars of long-term tasks under their own keys. Requires
    /// the lock of process `pid`.
    fn save_task_data(&self, sid: &str, pid: &str, tasks: &[&Task]) -> Result<()>;

    fn fetch_task_data(&self, sid: &str, tid: &str) -> Result<Option<Value>>;

    fn remove_process(&self, process: &Process) -> Result<()>;
}

/// Produces one runtime driver per turn, so lock ownership never leaks
/// between concurrent turns.
pub trait RuntimeFactory: Send + Sync {
    fn create(&self) -> Box<dyn RuntimeDriver>;
}

impl<F> RuntimeFactory for F
where
    F: Fn() -> Box<dyn RuntimeDriver> + Send + Sync,
{
    fn create(&self) -> Box<dyn RuntimeDriver> {
        self()
    }
}

static LOCK_SEQ: AtomicU64 = AtomicU64::new(1);

pub fn process_id_key(sid: &str) -> String {
    format!("runtime:session:{}:process_id", sid)
}

pub fn process_key(sid: &str, pid: &str) -> String {
    format!("runtime:session:{}:process:{}", sid, pid)
}

pub fn task_key(sid: &str, tid: &str) -> String {
    format!("runtime:session:{}:task:{}", sid, tid)
}

pub fn locker_key(sid: &str, pid: &str) -> String {
    format!("runtime:session:{}:process:{}:locker", sid, pid)
}

pub struct CacheRuntime {
    cache: Arc<dyn Cache>,
    instance: String,
    default_overdue: u64,
    /// locker key -> token held by this instance
    held: Mutex<HashMap<String, String>>,
}

impl CacheRuntime {
    pub fn new(cache: Arc<dyn Cache>, default_overdue: u64) -> Self {
        Self {
            cache,
            instance: uuid::Uuid::new_v4().to_string(),
            default_overdue,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Factory creating a fresh `CacheRuntime` over `cache` for every turn.
    pub fn factory(cache: Arc<dyn Cache>, default_overdue: u64) -> impl RuntimeFactory {
        move || -> Box<dyn RuntimeDriver> {
            Box::new(CacheRuntime::new(cache.clone(), default_overdue))
        }
    }

    fn held(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_token(&self) -> String {
        let seq = LOCK_SEQ.fetch_add(1, Ordering::SeqCst);
        format!("{}:{}", self.instance, seq)
    }

    /// Fails unless this instance still owns the process mutex.
    fn ensure_locked(&self, sid: &str, pid: &str) -> Result<()> {
        let key = locker_key(sid, pid);
        let token = self.held().get(&key).cloned();
        match token {
            Some(token) if self.cache.get(&key)?.as_deref() == Some(token.as_str()) => Ok(()),
            _ => Err(Error::LockLost { key }),
        }
    }

    fn overdue_or_default(&self, overdue: u64) -> u64 {
        if overdue > 0 {
            overdue
        } else {
            self.default_overdue
        }
    }
}

impl RuntimeDriver for CacheRuntime {
    fn get_process_id(&self, sid: &str) -> Result<Option<String>> {
        self.cache.get(&process_id_key(sid))
    }

    fn claim_process_id(&self, sid: &str, pid: &str, overdue: u64) -> Result<String> {
        let key = process_id_key(sid);
        let ttl = self.overdue_or_default(overdue);
        // The pointer can expire between a lost claim and the read.
        for _ in 0..3 {
            if self.cache.lock(&key, pid, ttl)? {
                tracing::debug!(sid, pid, "Process id claimed");
                return Ok(pid.to_string());
            }
            if let Some(existing) = self.cache.get(&key)? {
                return Ok(existing);
            }
        }
        Err(Error::cache(format!("could not claim {}", key)))
    }

    fn fetch_process(&self, sid: &str, pid: &str) -> Result<Option<Process>> {
        match self.cache.get(&process_key(sid, pid))? {
            Some(data) => {
                let mut process: Process = serde_json::from_str(&data)?;
                for task in &mut process.tasks {
                    // Long-term vars live in their own slot and are hydrated lazily.
                    task.instanced = !task.is_long_term;
                }
                Ok(Some(process))
            }
            None => Ok(None),
        }
    }

    fn lock_process(&self, sid: &str, pid: &str, overdue: u64) -> Result<bool> {
        let key = locker_key(sid, pid);
        if let Some(token) = self.held().get(&key).cloned() {
            if self.cache.get(&key)?.as_deref() == Some(token.as_str()) {
                return Ok(true);
            }
        }
        let token = self.next_token();
        let locked = self.cache.lock(&key, &token, overdue)?;
        if locked {
            tracing::debug!(sid, pid, "Process locked");
            self.held().insert(key, token);
        }
        Ok(locked)
    }

    fn unlock_process(&self, sid: &str, pid: &str) -> Result<bool> {
        let key = locker_key(sid, pid);
        let token = self.held().remove(&key);
        match token {
            Some(token) => self.cache.unlock(&key, &token),
            None => Ok(false),
        }
    }

    fn save_process_data(&self, process: &Process) -> Result<()> {
        self.ensure_locked(&process.sid, &process.pid)?;
        let mut record = process.clone();
        for task in &mut record.tasks {
            if task.is_long_term {
                task.vars = None;
            }
        }
        let ttl = self.overdue_or_default(process.root_task().map(|t| t.overdue).unwrap_or(0));
        let data = serde_json::to_string(&record)?;
        self.cache
            .set(&process_key(&process.sid, &process.pid), &data, Some(ttl))?;
        self.cache
            .set(&process_id_key(&process.sid), &process.pid, Some(ttl))?;
        Ok(())
    }

    fn save_task_data(&self, sid: &str, pid: &str, tasks: &[&Task]) -> Result<()> {
        self.ensure_locked(sid, pid)?;
        for task in tasks.iter().filter(|t| t.is_long_term) {
            let Some(vars) = task.vars.as_ref() else {
                continue;
            };
            let data = serde_json::to_string(vars)?;
            let ttl = self.overdue_or_default(task.overdue);
            self.cache.set(&task_key(sid, &task.tid), &data, Some(ttl))?;
        }
        Ok(())
    }

    fn fetch_task_data(&self, sid: &str, tid: &str) -> Result<Option<Value>> {
        match self.cache.get(&task_key(sid, tid))? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn remove_process(&self, process: &Process) -> Result<()> {
        self.ensure_locked(&process.sid, &process.pid)?;
        let pointer_key = process_id_key(&process.sid);
        let mut keys = vec![process_key(&process.sid, &process.pid)];
        if self.cache.get(&pointer_key)?.as_deref() == Some(process.pid.as_str()) {
            keys.push(pointer_key);
        }
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.cache.remove(&refs)?;
        Ok(())
    }
}
