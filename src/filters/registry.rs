//! Processor registry mapping stage names to implementations.

use crate::core::error::RegistryError;
use crate::core::node::{Category, Processor, ProcessorMetadata};
use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};

/// Factory function for creating processor instances.
pub type ProcessorFactory = Arc<dyn Fn() -> Box<dyn Processor> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: ProcessorFactory,
    /// Cached metadata (avoids creating instance just to get metadata).
    pub metadata: ProcessorMetadata,
}

/// Registry for all available processors.
///
/// Populated once, then only read. Registering a name that is already
/// present is a no-op, so the first registration wins.
pub struct ProcessorRegistry {
    /// Processors indexed by name, in registration order.
    processors: IndexMap<String, RegistryEntry>,
}

static GLOBAL: OnceLock<Arc<ProcessorRegistry>> = OnceLock::new();

impl ProcessorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            processors: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with built-in processors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry);
        registry
    }

    /// The process-wide registry of built-in processors.
    ///
    /// Built on first use and immutable afterwards, so concurrent pipelines
    /// can share it freely.
    pub fn global() -> Arc<ProcessorRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::with_builtins())))
    }

    /// Register a processor type. Returns `false` if the name was taken.
    pub fn register<F>(&mut self, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Processor> + Send + Sync + 'static,
    {
        let metadata = factory().metadata();
        if self.processors.contains_key(&metadata.name) {
            log::debug!("Processor '{}' already registered, ignoring", metadata.name);
            return false;
        }

        let name = metadata.name.clone();
        self.processors.insert(
            name,
            RegistryEntry {
                factory: Arc::new(factory),
                metadata,
            },
        );
        true
    }

    /// Create a new instance of a processor by name.
    pub fn lookup(&self, name: &str) -> Result<Box<dyn Processor>, RegistryError> {
        self.processors
            .get(name)
            .map(|e| (e.factory)())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Get metadata for a processor without creating an instance.
    pub fn get_metadata(&self, name: &str) -> Option<&ProcessorMetadata> {
        self.processors.get(name).map(|e| &e.metadata)
    }

    /// Check if a processor is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// All registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(|s| s.as_str())
    }

    /// Names of the processors in one category.
    pub fn processors_by_category(&self, category: Category) -> Vec<&str> {
        self.processors
            .values()
            .filter(|e| e.metadata.category == category)
            .map(|e| e.metadata.name.as_str())
            .collect()
    }

    /// Get the total number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
