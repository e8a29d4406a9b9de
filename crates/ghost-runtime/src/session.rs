//! Session: addressable conversation thread and its scratch store

use crate::cache::Cache;
use ghost_core::{Result, Trace};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub struct Session {
    pub session_id: String,
    pub clone_id: String,
    /// Seconds the scratch store survives without a refresh.
    pub overdue: u64,
    cache: Arc<dyn Cache>,
}

impl Session {
    pub fn new(trace: &Trace, cache: Arc<dyn Cache>, overdue: u64) -> Self {
        Self {
            session_id: trace.session_id.clone(),
            clone_id: trace.clone_id.clone(),
            overdue,
            cache,
        }
    }

    pub fn new_process_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn new_message_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn scratch_key(&self) -> String {
        format!("session:{}:scratch", self.session_id)
    }

    /// Read a scratch value. A value that no longer decodes as `T` reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get_member(&self.scratch_key(), key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!(session = %self.session_id, key, "Dropping unreadable scratch value: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let scratch = self.scratch_key();
        self.cache.set_member(&scratch, key, &raw)?;
        self.cache.expire(&scratch, self.overdue)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.cache.remove_member(&self.scratch_key(), key)
    }

    /// Push the scratch expiry forward by `overdue`.
    pub fn refresh(&self) -> Result<bool> {
        self.cache.expire(&self.scratch_key(), self.overdue)
    }
}
