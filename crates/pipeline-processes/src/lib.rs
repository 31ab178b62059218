//! Pipeline Processes
//!
//! Built-in process implementations for the pipeline engine.
//! Each process is a self-contained stage that can be wired into pipelines.
//!
//! # Categories
//!
//! - **Sources**: Processes that originate streams (`color-source`, `number-source`)
//! - **Transforms**: Processes that derive new values (`scale`, `blend`)
//! - **Sinks**: Processes that terminate streams (`collector`, `discard`)

pub mod sinks;
pub mod sources;
pub mod transforms;

#[cfg(test)]
mod pipeline_tests;

use pipeline_engine::ProcessRegistry;

// Re-export all processes for convenience
pub use sinks::*;
pub use sources::*;
pub use transforms::*;

/// A registry containing every built-in process type
pub fn builtin_registry() -> ProcessRegistry {
    let mut registry = ProcessRegistry::new();
    registry.register_fn(|| Box::new(ColorSource::new()));
    registry.register_fn(|| Box::new(NumberSource::new()));
    registry.register_fn(|| Box::new(Scale::new()));
    registry.register_fn(|| Box::new(Blend::new()));
    registry.register_fn(|| Box::new(Collector::new()));
    registry.register_fn(|| Box::new(Discard::new()));
    registry
}
