//! Pipeline assembly, setup and topology queries
//!
//! A [`Pipeline`] is assembled by adding processes and groups and declaring
//! connections between their ports. [`Pipeline::setup_pipeline`] then
//! resolves group mappings into direct process-to-process connections,
//! validates the whole graph, creates the edges, configures and initializes
//! every process, and freezes the structure. After that only edge queues and
//! process-internal state change.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{Config, EdgeConfig, PipelineConfig};
use crate::edge::Edge;
use crate::error::{
    ConfigFailure, ConnectionError, ConnectionReport, PipelineError, ProcessFailure, Result,
};
use crate::groups::{Group, GroupResolver};
use crate::port::{PortAddr, PortDirection, PortFlags};
use crate::process::{Process, ProcessNode, ProcessState, StepContext};
use crate::validation::{self, Descriptors, ResolvedConnection};

/// A declared connection, possibly between group ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub upstream: PortAddr,
    pub downstream: PortAddr,
    #[serde(default)]
    pub edge: EdgeConfig,
}

/// Frozen result of `setup_pipeline`
struct Topology {
    connections: Vec<ResolvedConnection>,
    edges: Vec<Arc<Edge>>,
    input_edges: HashMap<PortAddr, Arc<Edge>>,
    output_edges: BTreeMap<PortAddr, Vec<Arc<Edge>>>,
    order: Vec<String>,
}

/// A graph of processes connected by edges
pub struct Pipeline {
    config: PipelineConfig,
    processes: BTreeMap<String, ProcessNode>,
    groups: BTreeMap<String, Group>,
    connections: Vec<Connection>,
    topology: Option<Topology>,
    ran: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            processes: BTreeMap::new(),
            groups: BTreeMap::new(),
            connections: Vec::new(),
            topology: None,
            ran: false,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether `setup_pipeline` has succeeded
    pub fn is_setup(&self) -> bool {
        self.topology.is_some()
    }

    pub fn has_run(&self) -> bool {
        self.ran
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_setup() {
            return Err(PipelineError::AlreadySetUp);
        }
        Ok(())
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if self.processes.contains_key(name) || self.groups.contains_key(name) {
            return Err(ConnectionError::DuplicateName(name.to_string()).into());
        }
        Ok(())
    }

    fn ensure_known(&self, name: &str) -> std::result::Result<(), ConnectionError> {
        if self.processes.contains_key(name) || self.groups.contains_key(name) {
            Ok(())
        } else {
            Err(ConnectionError::UnknownProcess(name.to_string()))
        }
    }

    fn descriptors(&self) -> Descriptors<'_> {
        self.processes
            .iter()
            .map(|(name, node)| (name.as_str(), node.descriptor()))
            .collect()
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    /// Add a process under a unique name
    pub fn add_process(
        &mut self,
        name: impl Into<String>,
        process: Box<dyn Process>,
        config: Config,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let name = name.into();
        self.ensure_unique(&name)?;
        let node = ProcessNode::new(name.clone(), process, config);
        log::debug!("Adding process '{}' ({})", name, node.descriptor().process_type);
        self.processes.insert(name, node);
        Ok(())
    }

    /// Add a group under a unique name
    pub fn add_group(&mut self, group: Group) -> Result<()> {
        self.ensure_mutable()?;
        self.ensure_unique(&group.name)?;
        self.groups.insert(group.name.clone(), group);
        Ok(())
    }

    /// Connect an output port to an input port with default edge settings
    pub fn connect(
        &mut self,
        upstream: impl Into<String>,
        upstream_port: impl Into<String>,
        downstream: impl Into<String>,
        downstream_port: impl Into<String>,
    ) -> Result<()> {
        self.connect_with(
            upstream,
            upstream_port,
            downstream,
            downstream_port,
            EdgeConfig::default(),
        )
    }

    /// Connect an output port to an input port
    ///
    /// Process-to-process connections are checked immediately. Connections
    /// touching a group port are checked once mappings are resolved at setup.
    pub fn connect_with(
        &mut self,
        upstream: impl Into<String>,
        upstream_port: impl Into<String>,
        downstream: impl Into<String>,
        downstream_port: impl Into<String>,
        edge: EdgeConfig,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let upstream = PortAddr::new(upstream, upstream_port);
        let downstream = PortAddr::new(downstream, downstream_port);

        let mut report = ConnectionReport::new();
        for name in [&upstream.process, &downstream.process] {
            if let Err(err) = self.ensure_known(name) {
                report.push(err);
            }
        }
        report.into_result()?;

        if self.processes.contains_key(&upstream.process)
            && self.processes.contains_key(&downstream.process)
        {
            let mut report = ConnectionReport::new();
            validation::validate_connection(&self.descriptors(), &upstream, &downstream, &mut report);
            report.into_result()?;
        }

        if self.connections.iter().any(|c| c.downstream == downstream) {
            return Err(ConnectionError::InputAlreadyConnected(downstream).into());
        }

        log::debug!("Connecting {} -> {}", upstream, downstream);
        self.connections.push(Connection {
            upstream,
            downstream,
            edge,
        });
        Ok(())
    }

    fn check_mapping_target(
        &self,
        target: &PortAddr,
        direction: PortDirection,
    ) -> std::result::Result<(), ConnectionError> {
        self.ensure_known(&target.process)?;
        if self.processes.contains_key(&target.process) {
            validation::find_port(&self.descriptors(), target, direction)?;
        }
        Ok(())
    }

    /// Forward a group input port to an inner input port
    pub fn map_input_port(
        &mut self,
        group: &str,
        group_port: impl Into<String>,
        process: impl Into<String>,
        process_port: impl Into<String>,
        flags: PortFlags,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let target = PortAddr::new(process, process_port);
        self.check_mapping_target(&target, PortDirection::Input)?;
        let group = self
            .groups
            .get_mut(group)
            .ok_or_else(|| ConnectionError::UnknownProcess(group.to_string()))?;
        group.add_input_mapping(group_port.into(), target, flags);
        Ok(())
    }

    /// Feed a group output port from an inner output port (once per port)
    pub fn map_output_port(
        &mut self,
        group: &str,
        group_port: impl Into<String>,
        process: impl Into<String>,
        process_port: impl Into<String>,
        flags: PortFlags,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let target = PortAddr::new(process, process_port);
        self.check_mapping_target(&target, PortDirection::Output)?;
        let group = self
            .groups
            .get_mut(group)
            .ok_or_else(|| ConnectionError::UnknownProcess(group.to_string()))?;
        group.add_output_mapping(group_port.into(), target, flags)?;
        Ok(())
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Rewrite declared connections into process-to-process connections
    fn resolve_connections(&self, report: &mut ConnectionReport) -> Vec<ResolvedConnection> {
        let resolver = GroupResolver::new(&self.groups);
        let mut resolved = Vec::new();
        let mut fed_group_inputs = BTreeSet::new();

        for conn in &self.connections {
            let upstream = resolver.resolve_output(&conn.upstream);
            let downstream =
                resolver.resolve_input_through(&conn.downstream, &mut fed_group_inputs);
            match (upstream, downstream) {
                (Ok(upstream), Ok(downstream)) => {
                    resolved.extend(downstream.into_iter().map(|downstream| ResolvedConnection {
                        upstream: upstream.clone(),
                        downstream,
                        edge: conn.edge,
                    }));
                }
                (upstream, downstream) => {
                    for err in [upstream.err(), downstream.err()].into_iter().flatten() {
                        report.push(err);
                    }
                }
            }
        }

        for group in self.groups.values() {
            for addr in group.required_inputs() {
                if !fed_group_inputs.contains(&addr) {
                    report.push(ConnectionError::MissingRequiredInput(addr));
                }
            }
        }

        resolved
    }

    /// Resolved connections: the frozen set after setup, a best-effort
    /// resolution of the declared ones before
    fn resolved(&self) -> Cow<'_, [ResolvedConnection]> {
        match &self.topology {
            Some(topology) => Cow::Borrowed(&topology.connections),
            None => Cow::Owned(self.resolve_connections(&mut ConnectionReport::new())),
        }
    }

    /// Validate, resolve, configure and initialize; then freeze
    ///
    /// Calling it again after success is a no-op.
    pub fn setup_pipeline(&mut self) -> Result<()> {
        if self.is_setup() {
            return Ok(());
        }
        log::info!(
            "Setting up pipeline: {} processes, {} groups, {} connections",
            self.processes.len(),
            self.groups.len(),
            self.connections.len()
        );

        let (connections, order) = {
            let mut report = ConnectionReport::new();
            let connections = self.resolve_connections(&mut report);
            let descriptors = self.descriptors();
            validation::validate_connections(&descriptors, &connections, &mut report);
            validation::validate_required_ports(&descriptors, &connections, &mut report);
            report.into_result()?;

            let order = validation::topological_order(&descriptors, &connections)
                .map_err(PipelineError::DeadlockRisk)?;
            (connections, order)
        };

        let failures: Vec<ConfigFailure> = self
            .processes
            .values_mut()
            .filter(|node| node.state() == ProcessState::Created)
            .filter_map(|node| {
                node.configure().err().map(|error| ConfigFailure {
                    process: node.name().to_string(),
                    error,
                })
            })
            .collect();
        if !failures.is_empty() {
            return Err(PipelineError::Configuration(failures));
        }

        let default_capacity = self.config.default_edge_capacity;
        let mut edges = Vec::with_capacity(connections.len());
        let mut input_edges = HashMap::new();
        let mut output_edges: BTreeMap<PortAddr, Vec<Arc<Edge>>> = BTreeMap::new();
        for conn in &connections {
            let edge = Arc::new(Edge::with_config(
                conn.upstream.clone(),
                conn.downstream.clone(),
                conn.edge,
                default_capacity,
            ));
            input_edges.insert(conn.downstream.clone(), edge.clone());
            output_edges
                .entry(conn.upstream.clone())
                .or_default()
                .push(edge.clone());
            edges.push(edge);
        }

        for name in &order {
            let Some(node) = self.processes.get_mut(name) else {
                continue;
            };
            match node.state() {
                // Left over from an earlier attempt that failed further on
                ProcessState::Initialized => continue,
                ProcessState::Failed => {
                    return Err(PipelineError::Init {
                        process: name.clone(),
                        message: node.failure().unwrap_or_default().to_string(),
                    });
                }
                _ => {}
            }
            let inputs = input_edges
                .iter()
                .filter(|(addr, _)| &addr.process == name)
                .map(|(addr, edge)| (addr.port.clone(), edge.clone()))
                .collect();
            let outputs = output_edges
                .iter()
                .filter(|(addr, _)| &addr.process == name)
                .map(|(addr, edges)| (addr.port.clone(), edges.clone()))
                .collect();
            let context = StepContext::new(name.clone(), node.descriptor(), inputs, outputs);
            node.init(context).map_err(|err| PipelineError::Init {
                process: name.clone(),
                message: err.to_string(),
            })?;
        }

        log::info!("Pipeline set up: {} edges", edges.len());
        self.topology = Some(Topology {
            connections,
            edges,
            input_edges,
            output_edges,
            order,
        });
        Ok(())
    }

    // =========================================================================
    // Execution support
    // =========================================================================

    /// Hand the process runtimes to a scheduler
    pub(crate) fn take_processes(&mut self) -> Result<Vec<ProcessNode>> {
        if !self.is_setup() {
            return Err(PipelineError::NotSetUp);
        }
        if self.ran {
            return Err(PipelineError::AlreadyRan);
        }
        self.ran = true;
        let order = self.execution_order();
        Ok(order
            .iter()
            .filter_map(|name| self.processes.remove(name))
            .collect())
    }

    /// Return process runtimes after a run
    pub(crate) fn restore_processes(&mut self, nodes: Vec<ProcessNode>) {
        for node in nodes {
            self.processes.insert(node.name().to_string(), node);
        }
    }

    /// Every edge in the frozen topology
    pub fn edges(&self) -> Vec<Arc<Edge>> {
        self.topology
            .as_ref()
            .map(|t| t.edges.clone())
            .unwrap_or_default()
    }

    /// Processes in dependency order (empty before setup)
    pub fn execution_order(&self) -> Vec<String> {
        self.topology
            .as_ref()
            .map(|t| t.order.clone())
            .unwrap_or_default()
    }

    /// Processes that ended the run in `Failed`
    pub fn failures(&self) -> Vec<ProcessFailure> {
        self.processes
            .values()
            .filter(|node| node.state() == ProcessState::Failed)
            .map(|node| ProcessFailure {
                process: node.name().to_string(),
                message: node.failure().unwrap_or_default().to_string(),
            })
            .collect()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Declared connections, as added (group ports unresolved)
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn process_names(&self) -> Vec<String> {
        self.processes.keys().cloned().collect()
    }

    pub fn process_by_name(&self, name: &str) -> Option<&ProcessNode> {
        self.processes.get(name)
    }

    pub fn process_state(&self, name: &str) -> Option<ProcessState> {
        self.processes.get(name).map(|node| node.state())
    }

    /// Processes feeding any input of `name`
    pub fn upstream_for_process(&self, name: &str) -> Vec<String> {
        self.resolved()
            .iter()
            .filter(|c| c.downstream.process == name)
            .map(|c| c.upstream.process.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Process feeding one input port
    pub fn upstream_for_port(&self, name: &str, port: &str) -> Option<String> {
        self.sender_for_port(name, port).map(|addr| addr.process)
    }

    /// Processes fed by any output of `name`
    pub fn downstream_for_process(&self, name: &str) -> Vec<String> {
        self.resolved()
            .iter()
            .filter(|c| c.upstream.process == name)
            .map(|c| c.downstream.process.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Processes fed by one output port
    pub fn downstream_for_port(&self, name: &str, port: &str) -> Vec<String> {
        self.receivers_for_port(name, port)
            .into_iter()
            .map(|addr| addr.process)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Output port feeding one input port
    pub fn sender_for_port(&self, name: &str, port: &str) -> Option<PortAddr> {
        let addr = PortAddr::new(name, port);
        self.resolved()
            .iter()
            .find(|c| c.downstream == addr)
            .map(|c| c.upstream.clone())
    }

    /// Input ports fed by one output port
    pub fn receivers_for_port(&self, name: &str, port: &str) -> Vec<PortAddr> {
        let addr = PortAddr::new(name, port);
        self.resolved()
            .iter()
            .filter(|c| c.upstream == addr)
            .map(|c| c.downstream.clone())
            .collect()
    }

    pub fn input_edges_for_process(&self, name: &str) -> Vec<Arc<Edge>> {
        let Some(topology) = &self.topology else {
            return Vec::new();
        };
        let mut edges: Vec<_> = topology
            .input_edges
            .iter()
            .filter(|(addr, _)| addr.process == name)
            .collect();
        edges.sort_by(|a, b| a.0.cmp(b.0));
        edges.into_iter().map(|(_, edge)| edge.clone()).collect()
    }

    pub fn input_edge_for_port(&self, name: &str, port: &str) -> Option<Arc<Edge>> {
        self.topology
            .as_ref()?
            .input_edges
            .get(&PortAddr::new(name, port))
            .cloned()
    }

    pub fn output_edges_for_process(&self, name: &str) -> Vec<Arc<Edge>> {
        let Some(topology) = &self.topology else {
            return Vec::new();
        };
        topology
            .output_edges
            .iter()
            .filter(|(addr, _)| addr.process == name)
            .flat_map(|(_, edges)| edges.iter().cloned())
            .collect()
    }

    pub fn output_edges_for_port(&self, name: &str, port: &str) -> Vec<Arc<Edge>> {
        self.topology
            .as_ref()
            .and_then(|t| t.output_edges.get(&PortAddr::new(name, port)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn groups(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn input_ports_for_group(&self, name: &str) -> Vec<String> {
        self.groups
            .get(name)
            .map(|g| g.input_ports())
            .unwrap_or_default()
    }

    pub fn output_ports_for_group(&self, name: &str) -> Vec<String> {
        self.groups
            .get(name)
            .map(|g| g.output_ports())
            .unwrap_or_default()
    }

    pub fn mapped_group_input_port_flags(&self, name: &str, port: &str) -> Option<PortFlags> {
        self.groups.get(name)?.input_port_flags(port)
    }

    pub fn mapped_group_output_port_flags(&self, name: &str, port: &str) -> Option<PortFlags> {
        self.groups.get(name)?.output_port_flags(port)
    }

    /// Inner ports a group input forwards to (one mapping level)
    pub fn mapped_group_input_ports(&self, name: &str, port: &str) -> Vec<PortAddr> {
        self.groups
            .get(name)
            .map(|g| g.mapped_inputs(port))
            .unwrap_or_default()
    }

    /// Inner port feeding a group output (one mapping level)
    pub fn mapped_group_output_port(&self, name: &str, port: &str) -> Option<PortAddr> {
        self.groups.get(name)?.mapped_output(port)
    }
}
