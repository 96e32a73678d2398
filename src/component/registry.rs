//! Name → component lookup shared across the gateway.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::component::Service;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component {0} is already registered")]
    Duplicate(String),

    #[error("component {0} is not registered")]
    NotFound(String),

    #[error("component {name} is not a {expected}")]
    WrongType { name: String, expected: &'static str },
}

/// Conversion to `Any` for downcasting registered services.
pub trait AsAny: Any + Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Collects services during bootstrap.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, Arc<dyn Service>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, service: Arc<dyn Service>) -> Result<(), RegistryError> {
        if self.entries.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.entries.insert(name.to_string(), service);
        Ok(())
    }

    pub fn freeze(self) -> Arc<Registry> {
        Arc::new(Registry {
            entries: self.entries,
        })
    }
}

/// Read-only registry, frozen once every service is constructed.
pub struct Registry {
    entries: HashMap<String, Arc<dyn Service>>,
}

impl Registry {
    pub fn empty() -> Arc<Self> {
        RegistryBuilder::new().freeze()
    }

    /// Look up `name` as concrete type `T`.
    pub fn get<T: Service>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        let service = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Arc::clone(service)
            .as_any_arc()
            .downcast::<T>()
            .map_err(|_| RegistryError::WrongType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn get_dyn(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("entries", &names).finish()
    }
}
