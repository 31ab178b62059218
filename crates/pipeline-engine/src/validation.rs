//! Structural validation of a resolved process graph
//!
//! Validates port references, type tags, flags, required connections,
//! and detects dependency cycles. Every check records all violations it
//! finds (not just the first) so setup can report them together.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::config::EdgeConfig;
use crate::error::{ConnectionError, ConnectionReport};
use crate::port::{flag_conflict, PortAddr, PortDirection, PortFlag, PortInfo};
use crate::process::ProcessDescriptor;

/// Descriptor lookup by process name
pub(crate) type Descriptors<'a> = BTreeMap<&'a str, &'a ProcessDescriptor>;

/// A connection between two process ports, after group resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedConnection {
    pub upstream: PortAddr,
    pub downstream: PortAddr,
    pub edge: EdgeConfig,
}

/// Look up a port, checking that it exists with the expected direction
pub(crate) fn find_port<'a>(
    descriptors: &Descriptors<'a>,
    addr: &PortAddr,
    direction: PortDirection,
) -> Result<&'a PortInfo, ConnectionError> {
    let descriptor = descriptors
        .get(addr.process.as_str())
        .ok_or_else(|| ConnectionError::UnknownProcess(addr.process.clone()))?;

    if let Some(port) = descriptor.port(&addr.port, direction) {
        return Ok(port);
    }

    let opposite = match direction {
        PortDirection::Input => PortDirection::Output,
        PortDirection::Output => PortDirection::Input,
    };
    if descriptor.port(&addr.port, opposite).is_some() {
        Err(ConnectionError::DirectionMismatch {
            addr: addr.clone(),
            expected: direction,
        })
    } else {
        Err(ConnectionError::UnknownPort {
            process: addr.process.clone(),
            port: addr.port.clone(),
        })
    }
}

/// Check one process-to-process connection: endpoints, types and flags
pub(crate) fn validate_connection(
    descriptors: &Descriptors<'_>,
    upstream: &PortAddr,
    downstream: &PortAddr,
    report: &mut ConnectionReport,
) {
    let up = find_port(descriptors, upstream, PortDirection::Output);
    let down = find_port(descriptors, downstream, PortDirection::Input);

    let (up, down) = match (up, down) {
        (Ok(up), Ok(down)) => (up, down),
        (up, down) => {
            for err in [up.err(), down.err()].into_iter().flatten() {
                report.push(err);
            }
            return;
        }
    };

    if !up.port_type.is_compatible_with(&down.port_type) {
        report.push(ConnectionError::TypeMismatch {
            upstream: upstream.clone(),
            upstream_type: up.port_type.clone(),
            downstream: downstream.clone(),
            downstream_type: down.port_type.clone(),
        });
    }

    if let Some(reason) = flag_conflict(up, down) {
        report.push(ConnectionError::FlagMismatch {
            upstream: upstream.clone(),
            downstream: downstream.clone(),
            reason,
        });
    }
}

/// Validate every resolved connection, including the one-edge-per-input rule
pub(crate) fn validate_connections(
    descriptors: &Descriptors<'_>,
    connections: &[ResolvedConnection],
    report: &mut ConnectionReport,
) {
    let mut connected_inputs = BTreeSet::new();
    for conn in connections {
        validate_connection(descriptors, &conn.upstream, &conn.downstream, report);
        if !connected_inputs.insert(&conn.downstream) {
            report.push(ConnectionError::InputAlreadyConnected(conn.downstream.clone()));
        }
    }
}

/// Check that required inputs and outputs have at least one edge
pub(crate) fn validate_required_ports(
    descriptors: &Descriptors<'_>,
    connections: &[ResolvedConnection],
    report: &mut ConnectionReport,
) {
    let inputs: BTreeSet<&PortAddr> = connections.iter().map(|c| &c.downstream).collect();
    let outputs: BTreeSet<&PortAddr> = connections.iter().map(|c| &c.upstream).collect();

    for (name, descriptor) in descriptors {
        for port in descriptor.inputs.iter().filter(|p| p.is_required()) {
            let addr = PortAddr::new(*name, port.name.clone());
            if !inputs.contains(&addr) {
                report.push(ConnectionError::MissingRequiredInput(addr));
            }
        }
        for port in descriptor.outputs.iter().filter(|p| p.is_required()) {
            let addr = PortAddr::new(*name, port.name.clone());
            if !outputs.contains(&addr) {
                report.push(ConnectionError::MissingRequiredOutput(addr));
            }
        }
    }
}

/// Topologically order processes using Kahn's algorithm
///
/// Edges into `no_dependency` inputs are ignored. On a cycle, returns the
/// processes that could not be ordered.
pub(crate) fn topological_order(
    descriptors: &Descriptors<'_>,
    connections: &[ResolvedConnection],
) -> Result<Vec<String>, Vec<String>> {
    let dependency_edges: Vec<&ResolvedConnection> = connections
        .iter()
        .filter(|conn| {
            find_port(descriptors, &conn.downstream, PortDirection::Input)
                .map(|port| !port.has_flag(PortFlag::NoDependency))
                .unwrap_or(false)
        })
        .collect();

    let mut in_degree: HashMap<&str, usize> = descriptors.keys().map(|name| (*name, 0)).collect();
    for conn in &dependency_edges {
        *in_degree.entry(conn.downstream.process.as_str()).or_insert(0) += 1;
    }

    // BTreeMap iteration keeps the order deterministic
    let mut queue: VecDeque<&str> = descriptors
        .keys()
        .copied()
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();

    let mut order = Vec::with_capacity(descriptors.len());
    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        for conn in dependency_edges.iter().filter(|c| c.upstream.process == name) {
            if let Some(degree) = in_degree.get_mut(conn.downstream.process.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(conn.downstream.process.as_str());
                }
            }
        }
    }

    if order.len() < descriptors.len() {
        let ordered: BTreeSet<&str> = order.iter().map(|s| s.as_str()).collect();
        return Err(descriptors
            .keys()
            .filter(|name| !ordered.contains(*name))
            .map(|name| name.to_string())
            .collect());
    }

    Ok(order)
}
