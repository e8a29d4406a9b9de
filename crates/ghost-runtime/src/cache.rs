//! Cache abstraction shared by every session
//!
//! The cache is the only store the engine shares across turns. Values are
//! strings; TTLs are in seconds. `MemoryCache` is the in-process reference
//! implementation used by tests and the console harness.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use ghost_core::{Error, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value. `None` TTL keeps it until removed.
    fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()>;

    /// Remove keys, returning how many existed.
    fn remove(&self, keys: &[&str]) -> Result<usize>;

    /// Atomically take `key` for `token` unless someone else holds it.
    fn lock(&self, key: &str, token: &str, ttl: u64) -> Result<bool>;

    /// Release `key` if it is still held by `token`.
    fn unlock(&self, key: &str, token: &str) -> Result<bool>;

    fn get_member(&self, key: &str, member: &str) -> Result<Option<String>>;

    fn set_member(&self, key: &str, member: &str, value: &str) -> Result<()>;

    fn remove_member(&self, key: &str, member: &str) -> Result<bool>;

    /// Reset the TTL of an existing key.
    fn expire(&self, key: &str, ttl: u64) -> Result<bool>;
}

#[derive(Debug, Clone)]
enum Stored {
    Value(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    stored: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(stored: Stored, ttl: Option<u64>) -> Self {
        Self {
            stored,
            expires_at: ttl.map(|secs| Instant::now() + Duration::from_secs(secs)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys starting with `prefix`, sorted.
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_expired(now) && e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.live(key) {
            Some(Entry {
                stored: Stored::Value(v),
                ..
            }) => Ok(Some(v)),
            Some(_) => Err(Error::cache(format!("{} holds a hash, not a value", key))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        self.entries
            .insert(key.to_string(), Entry::new(Stored::Value(value.to_string()), ttl));
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<usize> {
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(*key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn lock(&self, key: &str, token: &str, ttl: u64) -> Result<bool> {
        let now = Instant::now();
        let fresh = Entry::new(Stored::Value(token.to_string()), Some(ttl));
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    fn unlock(&self, key: &str, token: &str) -> Result<bool> {
        let now = Instant::now();
        let removed = self.entries.remove_if(key, |_, e| {
            !e.is_expired(now) && matches!(&e.stored, Stored::Value(v) if v == token)
        });
        Ok(removed.is_some())
    }

    fn get_member(&self, key: &str, member: &str) -> Result<Option<String>> {
        match self.live(key) {
            Some(Entry {
                stored: Stored::Hash(fields),
                ..
            }) => Ok(fields.get(member).cloned()),
            Some(_) => Err(Error::cache(format!("{} holds a value, not a hash", key))),
            None => Ok(None),
        }
    }

    fn set_member(&self, key: &str, member: &str, value: &str) -> Result<()> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Stored::Hash(HashMap::new()), None));
        if entry.is_expired(now) {
            *entry = Entry::new(Stored::Hash(HashMap::new()), None);
        }
        match &mut entry.stored {
            Stored::Hash(fields) => {
                fields.insert(member.to_string(), value.to_string());
                Ok(())
            }
            Stored::Value(_) => Err(Error::cache(format!("{} holds a value, not a hash", key))),
        }
    }

    fn remove_member(&self, key: &str, member: &str) -> Result<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => match &mut entry.stored {
                Stored::Hash(fields) => Ok(fields.remove(member).is_some()),
                Stored::Value(_) => Err(Error::cache(format!("{} holds a value, not a hash", key))),
            },
            _ => Ok(false),
        }
    }

    fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Some(0)).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_lock_can_be_retaken() {
        let cache = MemoryCache::new();
        assert!(cache.lock("l", "a", 0).unwrap());
        assert!(cache.lock("l", "b", 30).unwrap());
        assert!(!cache.unlock("l", "a").unwrap());
        assert!(cache.unlock("l", "b").unwrap());
    }

    #[test]
    fn hash_and_value_do_not_mix() {
        let cache = MemoryCache::new();
        cache.set_member("h", "f", "1").unwrap();
        assert!(cache.get("h").is_err());
        cache.set("v", "1", None).unwrap();
        assert!(cache.set_member("v", "f", "1").is_err());
    }
}
