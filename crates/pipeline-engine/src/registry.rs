//! Process type registry
//!
//! Maps process type strings to descriptors and factories, so pipelines can
//! be assembled from type names. A registry is an ordinary value owned by
//! the caller; nothing registers itself globally.
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = ProcessRegistry::new();
//! registry.register_fn(|| Box::new(Scale::default()));
//!
//! let process = registry.create("scale")?;
//! pipeline.add_process("double", process, Config::new().with("factor", 2))?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::process::{Process, ProcessDescriptor};

/// Creates fresh instances of one process type
pub trait ProcessFactory: Send + Sync {
    fn create(&self) -> Box<dyn Process>;
}

/// Factory backed by a closure
struct FnFactory<F>(F);

impl<F> ProcessFactory for FnFactory<F>
where
    F: Fn() -> Box<dyn Process> + Send + Sync,
{
    fn create(&self) -> Box<dyn Process> {
        (self.0)()
    }
}

/// A registration entry combining a descriptor with its factory
struct RegistryEntry {
    descriptor: ProcessDescriptor,
    factory: Arc<dyn ProcessFactory>,
}

/// Registry of process types
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = builtin_registry();
/// registry.merge(plugin_registry); // Add plugin processes
/// ```
#[derive(Default)]
pub struct ProcessRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ProcessRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a process type with its descriptor and a factory
    pub fn register(&mut self, descriptor: ProcessDescriptor, factory: Arc<dyn ProcessFactory>) {
        log::debug!("Registering process type '{}'", descriptor.process_type);
        self.entries.insert(
            descriptor.process_type.clone(),
            RegistryEntry { descriptor, factory },
        );
    }

    /// Register a process type from a constructor closure
    ///
    /// The descriptor is taken from one instance built up front.
    pub fn register_fn<F>(&mut self, create: F)
    where
        F: Fn() -> Box<dyn Process> + Send + Sync + 'static,
    {
        let descriptor = create().descriptor();
        self.register(descriptor, Arc::new(FnFactory(create)));
    }

    /// Build a new instance of a process type
    pub fn create(&self, process_type: &str) -> Result<Box<dyn Process>> {
        self.entries
            .get(process_type)
            .map(|entry| entry.factory.create())
            .ok_or_else(|| PipelineError::UnknownProcessType(process_type.to_string()))
    }

    /// Get the descriptor for a process type
    pub fn descriptor(&self, process_type: &str) -> Option<&ProcessDescriptor> {
        self.entries.get(process_type).map(|e| &e.descriptor)
    }

    /// Get all registered descriptors
    pub fn all_descriptors(&self) -> Vec<&ProcessDescriptor> {
        self.entries.values().map(|e| &e.descriptor).collect()
    }

    /// Check if a process type is registered
    pub fn has_type(&self, process_type: &str) -> bool {
        self.entries.contains_key(process_type)
    }

    /// List all registered process types, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same type.
    pub fn merge(&mut self, other: ProcessRegistry) {
        self.entries.extend(other.entries);
    }
}
