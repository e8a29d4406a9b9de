//! Mindset: name -> think resolution
//!
//! Lookup order is own singletons, then stored metas materialised through
//! their kind's driver, then parent mindsets. A name found earlier hides the
//! same name further down.

use crate::think::{Stage, Think, ThinkDriver, ThinkMeta};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub trait ThinkMetaStorage: Send + Sync {
    fn fetch_meta(&self, name: &str, clone_id: Option<&str>) -> Option<ThinkMeta>;

    fn iter_metas(&self, clone_id: Option<&str>) -> Vec<ThinkMeta>;

    fn register_meta(&self, meta: ThinkMeta, clone_id: Option<&str>);
}

/// Metas keyed by (clone id, meta id). Clone-specific metas shadow shared ones.
#[derive(Default)]
pub struct MemoryMetaStorage {
    metas: DashMap<(String, String), ThinkMeta>,
}

impl MemoryMetaStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(clone_id: Option<&str>, name: &str) -> (String, String) {
        (clone_id.unwrap_or_default().to_string(), name.to_string())
    }
}

impl ThinkMetaStorage for MemoryMetaStorage {
    fn fetch_meta(&self, name: &str, clone_id: Option<&str>) -> Option<ThinkMeta> {
        if clone_id.is_some() {
            if let Some(meta) = self.metas.get(&Self::key(clone_id, name)) {
                return Some(meta.value().clone());
            }
        }
        self.metas.get(&Self::key(None, name)).map(|m| m.value().clone())
    }

    fn iter_metas(&self, clone_id: Option<&str>) -> Vec<ThinkMeta> {
        let scope = clone_id.unwrap_or_default();
        let mut own: Vec<ThinkMeta> = Vec::new();
        let mut shared: Vec<ThinkMeta> = Vec::new();
        for entry in self.metas.iter() {
            let (owner, _) = entry.key();
            if !scope.is_empty() && owner == scope {
                own.push(entry.value().clone());
            } else if owner.is_empty() {
                shared.push(entry.value().clone());
            }
        }
        let seen: HashSet<String> = own.iter().map(|m| m.id.clone()).collect();
        shared.retain(|m| !seen.contains(&m.id));
        own.extend(shared);
        own.sort_by(|a, b| a.id.cmp(&b.id));
        own
    }

    fn register_meta(&self, meta: ThinkMeta, clone_id: Option<&str>) {
        self.metas.insert(Self::key(clone_id, &meta.id), meta);
    }
}

#[derive(Default)]
pub struct Mindset {
    thinks: HashMap<String, Arc<dyn Think>>,
    /// Registration order of `thinks`.
    order: Vec<String>,
    drivers: HashMap<String, Arc<dyn ThinkDriver>>,
    storage: Option<Arc<dyn ThinkMetaStorage>>,
    parents: Vec<Arc<Mindset>>,
}

impl Mindset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a singleton think. Replaces any think with the same name.
    pub fn register_think(&mut self, think: Arc<dyn Think>) {
        let name = think.name().to_string();
        if self.thinks.insert(name.clone(), think).is_none() {
            self.order.push(name);
        }
    }

    pub fn with_think(mut self, think: impl Think + 'static) -> Self {
        self.register_think(Arc::new(think));
        self
    }

    pub fn register_driver(&mut self, driver: Arc<dyn ThinkDriver>) {
        self.drivers.insert(driver.kind().to_string(), driver);
    }

    pub fn with_driver(mut self, driver: impl ThinkDriver + 'static) -> Self {
        self.register_driver(Arc::new(driver));
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ThinkMetaStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_parent(mut self, parent: Arc<Mindset>) -> Self {
        self.parents.push(parent);
        self
    }

    fn materialize(&self, meta: &ThinkMeta) -> Option<Arc<dyn Think>> {
        let Some(driver) = self.drivers.get(&meta.kind) else {
            tracing::warn!("No think driver for kind {} (meta {})", meta.kind, meta.id);
            return None;
        };
        match driver.create(meta) {
            Ok(think) => Some(think),
            Err(e) => {
                tracing::warn!("Think driver {} failed on {}: {}", meta.kind, meta.id, e);
                None
            }
        }
    }

    /// Resolve a think by name. Missing thinks are `None`; the caller decides
    /// whether that is an error.
    pub fn fetch(&self, name: &str, clone_id: Option<&str>) -> Option<Arc<dyn Think>> {
        if let Some(think) = self.thinks.get(name) {
            return Some(think.clone());
        }
        if let Some(meta) = self
            .storage
            .as_ref()
            .and_then(|s| s.fetch_meta(name, clone_id))
        {
            if let Some(think) = self.materialize(&meta) {
                return Some(think);
            }
        }
        self.parents
            .iter()
            .find_map(|parent| parent.fetch(name, clone_id))
    }

    /// Stage of a think; an empty stage name means the think's entry stage.
    pub fn fetch_stage(
        &self,
        think: &str,
        stage: &str,
        clone_id: Option<&str>,
    ) -> Option<Arc<dyn Stage>> {
        let think = self.fetch(think, clone_id)?;
        let stage = if stage.is_empty() { think.entry() } else { stage };
        think.fetch_stage(stage)
    }

    pub fn contains(&self, name: &str, clone_id: Option<&str>) -> bool {
        self.fetch(name, clone_id).is_some()
    }

    /// Every reachable think, each name once, own entries first.
    pub fn foreach_think(&self, clone_id: Option<&str>) -> Vec<Arc<dyn Think>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect_thinks(clone_id, &mut seen, &mut out);
        out
    }

    fn collect_thinks(
        &self,
        clone_id: Option<&str>,
        seen: &mut HashSet<String>,
        out: &mut Vec<Arc<dyn Think>>,
    ) {
        for name in &self.order {
            if let Some(think) = self.thinks.get(name) {
                if seen.insert(name.clone()) {
                    out.push(think.clone());
                }
            }
        }
        if let Some(storage) = &self.storage {
            for meta in storage.iter_metas(clone_id) {
                if seen.contains(&meta.id) {
                    continue;
                }
                if let Some(think) = self.materialize(&meta) {
                    seen.insert(meta.id.clone());
                    out.push(think);
                }
            }
        }
        for parent in &self.parents {
            parent.collect_thinks(clone_id, seen, out);
        }
    }
}
