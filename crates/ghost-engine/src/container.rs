//! Typed registry of long-lived collaborators
//!
//! Stages reach shared services (clients, stores, clocks) through the
//! container instead of capturing them in the per-turn context.

use ghost_core::{Error, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Container {
    bindings: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a service; replaces any earlier binding of the same type.
    pub fn bind<T: Any + Send + Sync>(&mut self, service: Arc<T>) {
        self.bindings.insert(TypeId::of::<T>(), service);
    }

    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.bind(Arc::new(service));
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.bindings
            .get(&TypeId::of::<T>())
            .and_then(|s| s.clone().downcast::<T>().ok())
    }

    /// Like `get`, but a missing binding is a bootstrap error.
    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.get::<T>().ok_or_else(|| {
            Error::bootstrap(format!(
                "no {} bound in container",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock(u64);

    #[test]
    fn bind_and_require() {
        let container = Container::new().with(Clock(7));
        assert_eq!(container.require::<Clock>().unwrap().0, 7);
        assert!(container.get::<String>().is_none());
        assert!(matches!(
            container.require::<String>(),
            Err(Error::Bootstrap(_))
        ));
    }
}
