//! The process contract and its engine-side runtime
//!
//! Concrete stages implement [`Process`]. The engine wraps each one in a
//! [`ProcessNode`], which owns the lifecycle state machine, the connected
//! edges (through [`StepContext`]) and the completion rules:
//!
//! - a required input that drains to `Complete` completes the process
//!   without calling `step` again;
//! - a process whose outputs are all downstream-complete is completed;
//! - a failed step moves the process to `Failed` and completes its edges so
//!   the rest of the graph drains instead of hanging.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::{self, Config, ConfigKey};
use crate::datum::{Datum, EdgeDatum};
use crate::edge::{Demand, Edge};
use crate::error::{ConfigError, EdgeError, StepError};
use crate::port::{PortDirection, PortFlag, PortInfo};
use crate::stamp::Stamp;

/// Ports and configuration keys a process type exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDescriptor {
    /// Type identifier (e.g. "scale")
    pub process_type: String,
    pub description: String,
    pub inputs: Vec<PortInfo>,
    pub outputs: Vec<PortInfo>,
    pub config: Vec<ConfigKey>,
}

impl ProcessDescriptor {
    pub fn new(process_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            process_type: process_type.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, port: PortInfo) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: PortInfo) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn with_config(mut self, key: ConfigKey) -> Self {
        self.config.push(key);
        self
    }

    pub fn input_port(&self, name: &str) -> Option<&PortInfo> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_port(&self, name: &str) -> Option<&PortInfo> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn port(&self, name: &str, direction: PortDirection) -> Option<&PortInfo> {
        match direction {
            PortDirection::Input => self.input_port(name),
            PortDirection::Output => self.output_port(name),
        }
    }
}

/// Lifecycle state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Created,
    Configured,
    Initialized,
    Running,
    Complete,
    Failed,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// What a step asks the scheduler to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Complete,
}

/// A processing stage
///
/// `descriptor` is read once when the process is added to a pipeline.
/// `configure` and `init` run during `setup_pipeline`; `step` is only ever
/// called by a scheduler, never concurrently with itself, and never after
/// the process reached `Complete` or `Failed`.
///
/// # Example
///
/// ```ignore
/// struct Doubler;
///
/// #[async_trait]
/// impl Process for Doubler {
///     fn descriptor(&self) -> ProcessDescriptor {
///         ProcessDescriptor::new("doubler", "Doubles numbers")
///             .with_input(PortInfo::input("in", PortType::named("number"), "").required())
///             .with_output(PortInfo::output("out", PortType::named("number"), ""))
///     }
///
///     async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
///         if let Some(n) = ctx.grab_value::<f64>("in").await? {
///             ctx.push_value("out", *n * 2.0).await?;
///         }
///         Ok(StepResult::Continue)
///     }
/// }
/// ```
#[async_trait]
pub trait Process: Send {
    /// Ports and configuration keys of this process
    fn descriptor(&self) -> ProcessDescriptor;

    /// Validate and store configuration (defaults already applied)
    fn configure(&mut self, _config: &Config) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Called once after every edge is connected
    fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    /// One unit of work
    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError>;

    /// Called once when the process reaches `Complete`
    fn on_complete(&mut self) {}
}

/// A process's view of its connected edges during `init` and `step`
pub struct StepContext {
    process: String,
    required_inputs: HashSet<String>,
    nodep_inputs: HashSet<String>,
    declared_inputs: HashSet<String>,
    declared_outputs: HashSet<String>,
    inputs: HashMap<String, Arc<Edge>>,
    outputs: HashMap<String, Vec<Arc<Edge>>>,
    own_stamp: Stamp,
    step_stamp: Option<Stamp>,
    pushed: bool,
    input_completed: bool,
}

impl StepContext {
    pub(crate) fn new(
        process: impl Into<String>,
        descriptor: &ProcessDescriptor,
        inputs: HashMap<String, Arc<Edge>>,
        outputs: HashMap<String, Vec<Arc<Edge>>>,
    ) -> Self {
        Self {
            process: process.into(),
            required_inputs: port_names(&descriptor.inputs, |p| p.is_required()),
            nodep_inputs: port_names(&descriptor.inputs, |p| p.has_flag(PortFlag::NoDependency)),
            declared_inputs: port_names(&descriptor.inputs, |_| true),
            declared_outputs: port_names(&descriptor.outputs, |_| true),
            inputs,
            outputs,
            own_stamp: Stamp::new(),
            step_stamp: None,
            pushed: false,
            input_completed: false,
        }
    }

    /// Name of the owning process
    pub fn name(&self) -> &str {
        &self.process
    }

    pub fn input_edge(&self, port: &str) -> Option<&Arc<Edge>> {
        self.inputs.get(port)
    }

    /// Edges fed by an output port (empty if unconnected)
    pub fn output_edges(&self, port: &str) -> &[Arc<Edge>] {
        self.outputs.get(port).map(|e| e.as_slice()).unwrap_or(&[])
    }

    pub fn is_input_connected(&self, port: &str) -> bool {
        self.inputs.contains_key(port)
    }

    pub fn is_output_connected(&self, port: &str) -> bool {
        !self.output_edges(port).is_empty()
    }

    /// Stamp attached to data pushed during the current step
    pub fn stamp(&self) -> Stamp {
        self.step_stamp.unwrap_or(self.own_stamp)
    }

    /// Stamp at the head of an input edge, without consuming it
    pub fn peek_stamp(&self, port: &str) -> Option<Stamp> {
        self.inputs.get(port).and_then(|edge| edge.peek_stamp())
    }

    /// Pull the next datum and its stamp from an input port
    pub async fn grab_with_stamp(&mut self, port: &str) -> Result<EdgeDatum, StepError> {
        if !self.declared_inputs.contains(port) {
            return Err(StepError::UnknownPort(port.to_string()));
        }
        let edge = self
            .inputs
            .get(port)
            .cloned()
            .ok_or_else(|| StepError::Unconnected(port.to_string()))?;

        let item = edge.pop().await;
        if item.datum.is_complete() {
            if self.required_inputs.contains(port) {
                self.input_completed = true;
            }
        } else if self.step_stamp.is_none() {
            self.step_stamp = Some(item.stamp);
        }
        Ok(item)
    }

    /// Pull the next datum from an input port
    pub async fn grab(&mut self, port: &str) -> Result<Datum, StepError> {
        Ok(self.grab_with_stamp(port).await?.datum)
    }

    /// Pull from an optional input; `None` when the port has no edge
    pub async fn grab_optional(&mut self, port: &str) -> Result<Option<Datum>, StepError> {
        if self.declared_inputs.contains(port) && !self.inputs.contains_key(port) {
            return Ok(None);
        }
        self.grab(port).await.map(Some)
    }

    /// Pull a typed payload
    ///
    /// Control markers (`Empty`, `Flush`, `Complete`) yield `None`; an
    /// upstream `Error` datum or a payload of another type is an error.
    pub async fn grab_value<T: Any + Send + Sync>(
        &mut self,
        port: &str,
    ) -> Result<Option<Arc<T>>, StepError> {
        let datum = self.grab(port).await?;
        downcast_datum(port, datum)
    }

    /// Push a datum to every edge of an output port
    ///
    /// Data for an unconnected output is discarded. Edges whose consumer has
    /// already finished are skipped. Pushing `Datum::Complete` ends the
    /// stream on that port; pushing data there afterwards is an error.
    pub async fn push(&mut self, port: &str, datum: Datum) -> Result<(), StepError> {
        if !self.declared_outputs.contains(port) {
            return Err(StepError::UnknownPort(port.to_string()));
        }
        let Some(edges) = self.outputs.get(port).cloned() else {
            return Ok(());
        };

        let stamp = self.stamp();
        if !datum.is_complete() {
            self.pushed = true;
        }
        for edge in edges {
            match edge.push(datum.clone(), stamp).await {
                Ok(()) => {}
                Err(EdgeError::UpstreamComplete(_)) => {
                    return Err(StepError::OutputCompleted(port.to_string()));
                }
                Err(err @ EdgeError::DownstreamComplete(_)) => {
                    log::trace!("Process '{}': receiver finished, {}", self.process, err);
                }
            }
        }
        Ok(())
    }

    /// Push a typed payload
    pub async fn push_value<T: Any + Send + Sync>(
        &mut self,
        port: &str,
        value: T,
    ) -> Result<(), StepError> {
        self.push(port, Datum::new(value)).await
    }

    /// Suspend until some output edge needs data or all are finished
    ///
    /// Sources use this instead of polling their edges.
    pub async fn wait_for_demand(&self) -> Demand {
        let edges: Vec<Arc<Edge>> = self.outputs.values().flatten().cloned().collect();
        Edge::wait_for_demand(&edges).await
    }

    fn begin_step(&mut self) {
        self.step_stamp = None;
        self.pushed = false;
    }

    fn end_step(&mut self) {
        if self.pushed && self.step_stamp.is_none() {
            self.own_stamp = self.own_stamp.increment();
        }
    }

    /// Inputs the engine waits on before stepping, and whether any one of
    /// them draining completes the process (`true`) or all of them must
    fn dependency_inputs(&self) -> (Vec<Arc<Edge>>, bool) {
        let live = |port: &&String| !self.nodep_inputs.contains(*port);
        let required: Vec<_> = self
            .inputs
            .iter()
            .filter(|(port, _)| live(port) && self.required_inputs.contains(*port))
            .map(|(_, edge)| edge.clone())
            .collect();
        if !required.is_empty() {
            return (required, true);
        }
        let optional = self
            .inputs
            .iter()
            .filter(|(port, _)| live(port))
            .map(|(_, edge)| edge.clone())
            .collect();
        (optional, false)
    }

    fn outputs_exhausted(&self) -> bool {
        let mut edges = self.outputs.values().flatten().peekable();
        edges.peek().is_some() && edges.all(|edge| edge.is_downstream_complete())
    }

    fn finish(&self) {
        for edge in self.outputs.values().flatten() {
            edge.mark_upstream_complete();
        }
        for edge in self.inputs.values() {
            edge.mark_downstream_complete();
        }
    }
}

fn port_names(ports: &[PortInfo], keep: impl Fn(&PortInfo) -> bool) -> HashSet<String> {
    ports
        .iter()
        .filter(|p| keep(p))
        .map(|p| p.name.clone())
        .collect()
}

fn downcast_datum<T: Any + Send + Sync>(
    port: &str,
    datum: Datum,
) -> Result<Option<Arc<T>>, StepError> {
    match datum {
        Datum::Value(payload) => payload
            .downcast::<T>()
            .map(Some)
            .map_err(|_| StepError::PayloadType {
                port: port.to_string(),
                expected: std::any::type_name::<T>(),
            }),
        Datum::Error(message) => Err(StepError::Upstream {
            port: port.to_string(),
            message,
        }),
        Datum::Empty | Datum::Flush | Datum::Complete => Ok(None),
    }
}

/// Engine-side wrapper around one process instance
pub struct ProcessNode {
    name: String,
    descriptor: ProcessDescriptor,
    config: Config,
    process: Box<dyn Process>,
    state: ProcessState,
    context: Option<StepContext>,
    steps: u64,
    failure: Option<String>,
}

impl ProcessNode {
    pub(crate) fn new(name: impl Into<String>, process: Box<dyn Process>, config: Config) -> Self {
        let descriptor = process.descriptor();
        Self {
            name: name.into(),
            descriptor,
            config,
            process,
            state: ProcessState::Created,
            context: None,
            steps: 0,
            failure: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &ProcessDescriptor {
        &self.descriptor
    }

    /// Configuration as resolved against the declared keys
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Number of times `step` has been invoked
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Error message if the process ended in `Failed`
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn configure(&mut self) -> Result<(), ConfigError> {
        if self.state != ProcessState::Created {
            return Err(ConfigError::Invalid(format!(
                "cannot configure a process in state {:?}",
                self.state
            )));
        }

        let resolved = config::resolve(&self.name, &self.descriptor.config, &self.config)
            .and_then(|resolved| {
                self.process.configure(&resolved)?;
                Ok(resolved)
            });

        match resolved {
            Ok(resolved) => {
                self.config = resolved;
                self.state = ProcessState::Configured;
                log::debug!("Process '{}' configured", self.name);
                Ok(())
            }
            Err(err) => {
                self.state = ProcessState::Failed;
                self.failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub(crate) fn init(&mut self, context: StepContext) -> Result<(), StepError> {
        if self.state != ProcessState::Configured {
            return Err(StepError::failed(format!(
                "cannot initialize a process in state {:?}",
                self.state
            )));
        }
        if let Err(err) = self.process.init(&context) {
            self.state = ProcessState::Failed;
            self.failure = Some(err.to_string());
            return Err(err);
        }
        self.context = Some(context);
        self.state = ProcessState::Initialized;
        log::debug!("Process '{}' initialized", self.name);
        Ok(())
    }

    /// Run one scheduling unit: wait for input readiness, then step once
    ///
    /// Returns `false` once the process is terminal.
    pub(crate) async fn step(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(context) = self.context.as_ref() else {
            self.fail(StepError::failed("process was never initialized"));
            return false;
        };

        if context.outputs_exhausted() {
            log::debug!("Process '{}': all receivers finished", self.name);
            self.complete();
            return false;
        }

        let (dependencies, any_completes) = context.dependency_inputs();
        for edge in &dependencies {
            edge.wait_ready().await;
        }
        if !dependencies.is_empty() {
            let drained = |edge: &Arc<Edge>| edge.is_drained();
            let done = if any_completes {
                dependencies.iter().any(drained)
            } else {
                dependencies.iter().all(drained)
            };
            if done {
                self.complete();
                return false;
            }
        }

        self.state = ProcessState::Running;
        self.steps += 1;

        let Some(context) = self.context.as_mut() else {
            return false;
        };
        context.begin_step();
        let outcome = AssertUnwindSafe(self.process.step(context))
            .catch_unwind()
            .await;
        context.end_step();
        let input_completed = context.input_completed;

        match outcome {
            Ok(Ok(StepResult::Continue)) if !input_completed => true,
            Ok(Ok(_)) => {
                self.complete();
                false
            }
            Ok(Err(err)) => {
                self.fail(err);
                false
            }
            Err(panic) => {
                self.fail(StepError::Panicked(panic_message(panic.as_ref())));
                false
            }
        }
    }

    /// Drive the process until it is terminal
    pub(crate) async fn run(mut self, abort: &crate::scheduler::AbortHandle) -> Self {
        while !self.state.is_terminal() {
            if abort.is_aborted() {
                log::debug!("Process '{}': abort requested", self.name);
                self.complete();
                break;
            }
            self.step().await;
        }
        self
    }

    pub(crate) fn complete(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ProcessState::Complete;
        if let Some(context) = &self.context {
            context.finish();
        }
        let process = &mut self.process;
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| process.on_complete())) {
            self.fail(StepError::Panicked(panic_message(panic.as_ref())));
            return;
        }
        log::debug!("Process '{}' complete after {} steps", self.name, self.steps);
    }

    fn fail(&mut self, err: StepError) {
        log::warn!("Process '{}' failed: {}", self.name, err);
        self.state = ProcessState::Failed;
        self.failure = Some(err.to_string());
        if let Some(context) = &self.context {
            context.finish();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortAddr, PortType};
    use crate::testing::{CountingSink, Doubler, NumberSource};

    fn edge(from: &str, to: &str, capacity: usize) -> Arc<Edge> {
        Arc::new(Edge::new(PortAddr::new(from, "out"), PortAddr::new(to, "in"), capacity))
    }

    fn node(name: &str, process: Box<dyn Process>) -> ProcessNode {
        let mut node = ProcessNode::new(name, process, Config::new());
        node.configure().unwrap();
        node
    }

    #[test]
    fn test_descriptor_lookup() {
        let descriptor = Doubler.descriptor();
        assert!(descriptor.input_port("in").is_some());
        assert!(descriptor.port("out", PortDirection::Output).is_some());
        assert!(descriptor.port("out", PortDirection::Input).is_none());
    }

    #[test]
    fn test_missing_required_config_fails_process() {
        struct NeedsPath;

        #[async_trait]
        impl Process for NeedsPath {
            fn descriptor(&self) -> ProcessDescriptor {
                ProcessDescriptor::new("needs-path", "")
                    .with_config(ConfigKey::required("path", "string", "Where to write"))
            }

            async fn step(&mut self, _ctx: &mut StepContext) -> Result<StepResult, StepError> {
                Ok(StepResult::Complete)
            }
        }

        let mut node = ProcessNode::new("writer", Box::new(NeedsPath), Config::new());
        assert_eq!(
            node.configure(),
            Err(ConfigError::MissingKey("path".to_string()))
        );
        assert_eq!(node.state(), ProcessState::Failed);
    }

    #[tokio::test]
    async fn test_source_stamps_increase_per_step() {
        let out = edge("source", "sink", 0);
        let mut source = node("source", Box::new(NumberSource::new(3)));
        let descriptor = source.descriptor().clone();
        let outputs = HashMap::from([("out".to_string(), vec![out.clone()])]);
        source
            .init(StepContext::new("source", &descriptor, HashMap::new(), outputs))
            .unwrap();

        while source.step().await {}
        assert_eq!(source.state(), ProcessState::Complete);

        let stamps: Vec<Stamp> = (0..3).map(|_| out.try_pop().unwrap().stamp).collect();
        assert!(stamps[0] < stamps[1] && stamps[1] < stamps[2]);
        assert!(out.pop().await.datum.is_complete());
    }

    #[tokio::test]
    async fn test_transform_forwards_input_stamp() {
        let input = edge("source", "double", 0);
        let output = edge("double", "sink", 0);
        let stamp = Stamp::new().increment().increment();
        input.push(Datum::new(4.0_f64), stamp).await.unwrap();
        input.mark_upstream_complete();

        let mut double = node("double", Box::new(Doubler));
        let descriptor = double.descriptor().clone();
        double
            .init(StepContext::new(
                "double",
                &descriptor,
                HashMap::from([("in".to_string(), input.clone())]),
                HashMap::from([("out".to_string(), vec![output.clone()])]),
            ))
            .unwrap();

        assert!(double.step().await);
        let item = output.try_pop().unwrap();
        assert_eq!(item.datum.get::<f64>(), Some(&8.0));
        assert_eq!(item.stamp, stamp);

        // Input drained: completes without another step
        assert!(!double.step().await);
        assert_eq!(double.state(), ProcessState::Complete);
        assert_eq!(double.steps(), 1);
        assert!(output.is_upstream_complete());
        assert!(input.is_downstream_complete());
    }

    #[tokio::test]
    async fn test_step_error_fails_and_drains() {
        struct Broken;

        #[async_trait]
        impl Process for Broken {
            fn descriptor(&self) -> ProcessDescriptor {
                ProcessDescriptor::new("broken", "")
                    .with_output(PortInfo::output("out", PortType::any(), ""))
            }

            async fn step(&mut self, _ctx: &mut StepContext) -> Result<StepResult, StepError> {
                Err(StepError::failed("sensor unplugged"))
            }
        }

        let out = edge("broken", "sink", 0);
        let mut broken = node("broken", Box::new(Broken));
        let descriptor = broken.descriptor().clone();
        broken
            .init(StepContext::new(
                "broken",
                &descriptor,
                HashMap::new(),
                HashMap::from([("out".to_string(), vec![out.clone()])]),
            ))
            .unwrap();

        assert!(!broken.step().await);
        assert_eq!(broken.state(), ProcessState::Failed);
        assert_eq!(broken.failure(), Some("sensor unplugged"));
        assert!(out.pop().await.datum.is_complete());

        // Terminal: never stepped again
        assert!(!broken.step().await);
        assert_eq!(broken.steps(), 1);
    }

    #[tokio::test]
    async fn test_panicking_step_is_caught() {
        struct Panics;

        #[async_trait]
        impl Process for Panics {
            fn descriptor(&self) -> ProcessDescriptor {
                ProcessDescriptor::new("panics", "")
            }

            async fn step(&mut self, _ctx: &mut StepContext) -> Result<StepResult, StepError> {
                panic!("bad frame");
            }
        }

        let mut node = node("panics", Box::new(Panics));
        let descriptor = node.descriptor().clone();
        node.init(StepContext::new("panics", &descriptor, HashMap::new(), HashMap::new()))
            .unwrap();

        assert!(!node.step().await);
        assert_eq!(node.state(), ProcessState::Failed);
        assert_eq!(node.failure(), Some("process panicked: bad frame"));
    }

    #[tokio::test]
    async fn test_panicking_on_complete_fails_process() {
        struct PanicsOnComplete;

        #[async_trait]
        impl Process for PanicsOnComplete {
            fn descriptor(&self) -> ProcessDescriptor {
                ProcessDescriptor::new("panics-on-complete", "")
            }

            async fn step(&mut self, _ctx: &mut StepContext) -> Result<StepResult, StepError> {
                Ok(StepResult::Complete)
            }

            fn on_complete(&mut self) {
                panic!("flush failed");
            }
        }

        let mut node = node("closer", Box::new(PanicsOnComplete));
        let descriptor = node.descriptor().clone();
        node.init(StepContext::new("closer", &descriptor, HashMap::new(), HashMap::new()))
            .unwrap();

        assert!(!node.step().await);
        assert_eq!(node.state(), ProcessState::Failed);
        assert_eq!(node.failure(), Some("process panicked: flush failed"));
    }

    #[tokio::test]
    async fn test_push_after_completing_output_is_an_error() {
        let out = edge("source", "sink", 0);
        let descriptor = NumberSource::new(1).descriptor();
        let mut ctx = StepContext::new(
            "source",
            &descriptor,
            HashMap::new(),
            HashMap::from([("out".to_string(), vec![out.clone()])]),
        );

        ctx.push("out", Datum::complete()).await.unwrap();
        assert_eq!(
            ctx.push_value("out", 1.0_f64).await.unwrap_err(),
            StepError::OutputCompleted("out".to_string())
        );
        assert!(!out.has_data());
        assert!(out.pop().await.datum.is_complete());

        // A finished receiver is skipped rather than reported
        let other = edge("source", "sink", 0);
        other.mark_downstream_complete();
        let mut ctx = StepContext::new(
            "source",
            &descriptor,
            HashMap::new(),
            HashMap::from([("out".to_string(), vec![other])]),
        );
        ctx.push_value("out", 2.0_f64).await.unwrap();
    }

    #[tokio::test]
    async fn test_source_completes_when_receivers_finish() {
        let out = edge("source", "sink", 0);
        out.mark_downstream_complete();

        let mut source = node("source", Box::new(NumberSource::new(1000)));
        let descriptor = source.descriptor().clone();
        source
            .init(StepContext::new(
                "source",
                &descriptor,
                HashMap::new(),
                HashMap::from([("out".to_string(), vec![out])]),
            ))
            .unwrap();

        assert!(!source.step().await);
        assert_eq!(source.state(), ProcessState::Complete);
        assert_eq!(source.steps(), 0);
    }

    #[tokio::test]
    async fn test_unconnected_optional_input_yields_none() {
        let sink = CountingSink::default();
        let mut ctx = StepContext::new("sink", &sink.descriptor(), HashMap::new(), HashMap::new());

        assert!(ctx.grab_optional("in").await.unwrap().is_none());
        assert_eq!(
            ctx.grab("missing").await.unwrap_err(),
            StepError::UnknownPort("missing".to_string())
        );
        assert_eq!(
            ctx.grab("in").await.unwrap_err(),
            StepError::Unconnected("in".to_string())
        );
    }

    #[test]
    fn test_downcast_datum() {
        assert_eq!(
            downcast_datum::<f64>("in", Datum::new(1.5_f64)).unwrap().as_deref(),
            Some(&1.5)
        );
        assert!(downcast_datum::<f64>("in", Datum::empty()).unwrap().is_none());
        assert!(matches!(
            downcast_datum::<f64>("in", Datum::new("text")),
            Err(StepError::PayloadType { .. })
        ));
        assert!(matches!(
            downcast_datum::<f64>("in", Datum::error("bad")),
            Err(StepError::Upstream { .. })
        ));
    }
}
