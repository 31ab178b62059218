//! Fluent builder for pipelines
//!
//! Provides a chained API for assembling a [`Pipeline`] in code. The first
//! assembly error is kept and returned from [`PipelineBuilder::build`], so
//! call sites don't need a `?` per line.

use crate::config::{Config, EdgeConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::groups::Group;
use crate::pipeline::Pipeline;
use crate::port::PortFlags;
use crate::process::Process;
use crate::registry::ProcessRegistry;

/// Fluent builder for constructing pipelines
///
/// # Example
///
/// ```ignore
/// let pipeline = PipelineBuilder::new()
///     .with_registry(&registry)
///     .add("numbers", "number_source", Config::new().with("count", 5))
///     .add("double", "scale", Config::new().with("factor", 2))
///     .add("collect", "collector", Config::new())
///     .connect("numbers", "number", "double", "number")
///     .connect("double", "number", "collect", "value")
///     .build_and_setup()?;
/// ```
pub struct PipelineBuilder<'a> {
    pipeline: Pipeline,
    registry: Option<&'a ProcessRegistry>,
    error: Option<PipelineError>,
}

impl Default for PipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> PipelineBuilder<'a> {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            pipeline: Pipeline::with_config(config),
            registry: None,
            error: None,
        }
    }

    /// Registry used by [`add`](Self::add) to create processes by type
    pub fn with_registry(mut self, registry: &'a ProcessRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    fn apply(mut self, op: impl FnOnce(&mut Pipeline) -> Result<()>) -> Self {
        if self.error.is_none() {
            if let Err(err) = op(&mut self.pipeline) {
                self.error = Some(err);
            }
        }
        self
    }

    /// Add a process instance
    pub fn add_process(
        self,
        name: impl Into<String>,
        process: Box<dyn Process>,
        config: Config,
    ) -> Self {
        self.apply(|p| p.add_process(name, process, config))
    }

    /// Add a process created from the registry by type name
    pub fn add(self, name: impl Into<String>, process_type: &str, config: Config) -> Self {
        let process = match self.registry {
            Some(registry) => registry.create(process_type),
            None => Err(PipelineError::UnknownProcessType(process_type.to_string())),
        };
        self.apply(|p| p.add_process(name, process?, config))
    }

    pub fn add_group(self, group: Group) -> Self {
        self.apply(|p| p.add_group(group))
    }

    /// Connect two ports with default edge settings
    pub fn connect(
        self,
        upstream: impl Into<String>,
        upstream_port: impl Into<String>,
        downstream: impl Into<String>,
        downstream_port: impl Into<String>,
    ) -> Self {
        self.apply(|p| p.connect(upstream, upstream_port, downstream, downstream_port))
    }

    /// Connect two ports with explicit edge settings
    pub fn connect_with(
        self,
        upstream: impl Into<String>,
        upstream_port: impl Into<String>,
        downstream: impl Into<String>,
        downstream_port: impl Into<String>,
        edge: EdgeConfig,
    ) -> Self {
        self.apply(|p| p.connect_with(upstream, upstream_port, downstream, downstream_port, edge))
    }

    pub fn map_input(
        self,
        group: &str,
        group_port: impl Into<String>,
        process: impl Into<String>,
        process_port: impl Into<String>,
        flags: PortFlags,
    ) -> Self {
        self.apply(|p| p.map_input_port(group, group_port, process, process_port, flags))
    }

    pub fn map_output(
        self,
        group: &str,
        group_port: impl Into<String>,
        process: impl Into<String>,
        process_port: impl Into<String>,
        flags: PortFlags,
    ) -> Self {
        self.apply(|p| p.map_output_port(group, group_port, process, process_port, flags))
    }

    /// Return the assembled pipeline, or the first assembly error
    pub fn build(self) -> Result<Pipeline> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.pipeline),
        }
    }

    /// Build and run `setup_pipeline`
    pub fn build_and_setup(self) -> Result<Pipeline> {
        let mut pipeline = self.build()?;
        pipeline.setup_pipeline()?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingSink, Doubler, NumberSource};

    #[test]
    fn test_builder_basic() {
        let pipeline = PipelineBuilder::new()
            .add_process("a", Box::new(NumberSource::new(2)), Config::new())
            .add_process("b", Box::new(Doubler), Config::new())
            .connect("a", "out", "b", "in")
            .build_and_setup()
            .unwrap();

        assert!(pipeline.is_setup());
        assert_eq!(pipeline.downstream_for_process("a"), vec!["b"]);
    }

    #[test]
    fn test_builder_keeps_first_error() {
        let err = PipelineBuilder::new()
            .add_process("a", Box::new(Doubler), Config::new())
            .connect("a", "out", "ghost", "in")
            .add_process("a", Box::new(Doubler), Config::new())
            .build()
            .err()
            .unwrap();

        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_builder_uses_registry() {
        let mut registry = ProcessRegistry::new();
        registry.register_fn(|| Box::new(CountingSink::default()));

        let pipeline = PipelineBuilder::new()
            .with_registry(&registry)
            .add("sink", "counting-sink", Config::new())
            .build()
            .unwrap();
        assert_eq!(pipeline.process_names(), vec!["sink"]);

        let err = PipelineBuilder::new()
            .with_registry(&registry)
            .add("x", "missing", Config::new())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::UnknownProcessType(_)));
    }
}
