// src/node_factory.rs
//
// Signal-graph collaborator: targets created by type name plus settings.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::distributor::BoxedTarget;

/// Settings record passed to a factory, keyed by setting name.
pub type Settings = HashMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown node type {0:?}")]
    UnknownType(String),

    #[error("node type {type_name:?} has no setting {key:?}")]
    UnknownSetting { type_name: String, key: String },

    #[error("setting {key:?} of node type {type_name:?} is out of range: {value}")]
    InvalidSetting {
        type_name: String,
        key: String,
        value: f64,
    },
}

/// A factory capable of creating fresh targets.
///
/// Only used while the target hierarchy is being built.
pub trait NodeFactory: Send {
    /// Create one target. `clock` is the scheduling epoch of the graph.
    fn create(&self, clock: &Arc<dyn Clock>, settings: &Settings) -> Result<BoxedTarget, RegistryError>;
}

/// Convenience factory wrapping a closure.
pub struct SimpleNodeFactory<F>
where
    F: Fn(&Arc<dyn Clock>, &Settings) -> Result<BoxedTarget, RegistryError> + Send,
{
    create_fn: F,
}

impl<F> SimpleNodeFactory<F>
where
    F: Fn(&Arc<dyn Clock>, &Settings) -> Result<BoxedTarget, RegistryError> + Send,
{
    pub fn new(create_fn: F) -> Self {
        Self { create_fn }
    }
}

impl<F> NodeFactory for SimpleNodeFactory<F>
where
    F: Fn(&Arc<dyn Clock>, &Settings) -> Result<BoxedTarget, RegistryError> + Send,
{
    fn create(&self, clock: &Arc<dyn Clock>, settings: &Settings) -> Result<BoxedTarget, RegistryError> {
        (self.create_fn)(clock, settings)
    }
}

/// Node types available to a graph, by name.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Box<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `type_name`, replacing any previous one.
    pub fn register(&mut self, type_name: &str, factory: impl NodeFactory + 'static) {
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(
        &self,
        type_name: &str,
        clock: &Arc<dyn Clock>,
        settings: &Settings,
    ) -> Result<BoxedTarget, RegistryError> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?;
        let target = factory.create(clock, settings)?;
        log::debug!("created {} node", type_name);
        Ok(target)
    }
}
