//! Groups - named sub-graphs with remapped ports
//!
//! A group has no runtime presence. It is a table that maps its own input
//! ports onto one or more inner inputs and each of its output ports onto
//! exactly one inner output. Inner targets may themselves be groups.
//! During setup every connection touching a group port is rewritten into
//! direct process-to-process connections.
//!
//! # Example
//!
//! ```ignore
//! let group = Group::new("denoise")
//!     .map_input("image", "blur", "image", PortFlags::new())
//!     .map_input("image", "edges", "image", PortFlags::new())
//!     .map_output("image", "merge", "image", PortFlags::new());
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;
use crate::port::{PortAddr, PortFlag, PortFlags};

/// One entry in a group's mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Inner process (or group) port the group port forwards to
    pub target: PortAddr,
    /// Flags declared for the group port by this mapping
    pub flags: PortFlags,
}

impl PortMapping {
    pub fn new(target: PortAddr, flags: PortFlags) -> Self {
        Self { target, flags }
    }
}

/// A named sub-graph whose ports forward to inner ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Group input port -> inner inputs it fans out to
    pub inputs: BTreeMap<String, Vec<PortMapping>>,
    /// Group output port -> the inner output that feeds it
    pub outputs: BTreeMap<String, PortMapping>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Forward a group input to an inner input (may be repeated per port)
    pub fn map_input(
        mut self,
        group_port: impl Into<String>,
        process: impl Into<String>,
        port: impl Into<String>,
        flags: PortFlags,
    ) -> Self {
        self.add_input_mapping(group_port.into(), PortAddr::new(process, port), flags);
        self
    }

    /// Feed a group output from an inner output
    ///
    /// A later mapping for the same port replaces the earlier one; use
    /// `Pipeline::map_output_port` to get the duplicate check.
    pub fn map_output(
        mut self,
        group_port: impl Into<String>,
        process: impl Into<String>,
        port: impl Into<String>,
        flags: PortFlags,
    ) -> Self {
        self.outputs.insert(
            group_port.into(),
            PortMapping::new(PortAddr::new(process, port), flags),
        );
        self
    }

    pub(crate) fn add_input_mapping(&mut self, group_port: String, target: PortAddr, flags: PortFlags) {
        self.inputs
            .entry(group_port)
            .or_default()
            .push(PortMapping::new(target, flags));
    }

    pub(crate) fn add_output_mapping(
        &mut self,
        group_port: String,
        target: PortAddr,
        flags: PortFlags,
    ) -> Result<(), ConnectionError> {
        if self.outputs.contains_key(&group_port) {
            return Err(ConnectionError::GroupOutputAlreadyMapped(PortAddr::new(
                self.name.clone(),
                group_port,
            )));
        }
        self.outputs.insert(group_port, PortMapping::new(target, flags));
        Ok(())
    }

    pub fn input_ports(&self) -> Vec<String> {
        self.inputs.keys().cloned().collect()
    }

    pub fn output_ports(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }

    /// Union of the flags declared by every mapping of an input port
    pub fn input_port_flags(&self, port: &str) -> Option<PortFlags> {
        self.inputs.get(port).map(|mappings| {
            mappings
                .iter()
                .flat_map(|m| m.flags.iter().copied())
                .collect()
        })
    }

    pub fn output_port_flags(&self, port: &str) -> Option<PortFlags> {
        self.outputs.get(port).map(|m| m.flags.clone())
    }

    /// Direct (one level) targets of an input port
    pub fn mapped_inputs(&self, port: &str) -> Vec<PortAddr> {
        self.inputs
            .get(port)
            .map(|mappings| mappings.iter().map(|m| m.target.clone()).collect())
            .unwrap_or_default()
    }

    /// Direct (one level) source of an output port
    pub fn mapped_output(&self, port: &str) -> Option<PortAddr> {
        self.outputs.get(port).map(|m| m.target.clone())
    }

    /// Group inputs whose mappings declare them required
    pub(crate) fn required_inputs(&self) -> impl Iterator<Item = PortAddr> + '_ {
        self.inputs.iter().filter_map(|(port, mappings)| {
            mappings
                .iter()
                .any(|m| m.flags.contains(&PortFlag::Required))
                .then(|| PortAddr::new(self.name.clone(), port.clone()))
        })
    }
}

/// Rewrites group ports into the process ports behind them
pub(crate) struct GroupResolver<'a> {
    groups: &'a BTreeMap<String, Group>,
}

impl<'a> GroupResolver<'a> {
    pub(crate) fn new(groups: &'a BTreeMap<String, Group>) -> Self {
        Self { groups }
    }

    /// Every process input a (possibly group) input address fans out to
    pub(crate) fn resolve_input(&self, addr: &PortAddr) -> Result<Vec<PortAddr>, ConnectionError> {
        self.resolve_input_through(addr, &mut BTreeSet::new())
    }

    /// Like `resolve_input`, also recording every group input passed through
    pub(crate) fn resolve_input_through(
        &self,
        addr: &PortAddr,
        through: &mut BTreeSet<PortAddr>,
    ) -> Result<Vec<PortAddr>, ConnectionError> {
        let mut resolved = Vec::new();
        let mut path = BTreeSet::new();
        self.resolve_input_into(addr, &mut path, through, &mut resolved)?;
        Ok(resolved)
    }

    fn resolve_input_into(
        &self,
        addr: &PortAddr,
        path: &mut BTreeSet<PortAddr>,
        through: &mut BTreeSet<PortAddr>,
        resolved: &mut Vec<PortAddr>,
    ) -> Result<(), ConnectionError> {
        let Some(group) = self.groups.get(&addr.process) else {
            resolved.push(addr.clone());
            return Ok(());
        };
        if !path.insert(addr.clone()) {
            return Err(ConnectionError::MappingCycle(addr.clone()));
        }
        through.insert(addr.clone());
        let mappings = group
            .inputs
            .get(&addr.port)
            .filter(|mappings| !mappings.is_empty())
            .ok_or_else(|| ConnectionError::UnmappedGroupPort(addr.clone()))?;
        for mapping in mappings {
            self.resolve_input_into(&mapping.target, path, through, resolved)?;
        }
        path.remove(addr);
        Ok(())
    }

    /// The process output a (possibly group) output address is fed by
    pub(crate) fn resolve_output(&self, addr: &PortAddr) -> Result<PortAddr, ConnectionError> {
        let mut current = addr.clone();
        let mut seen = BTreeSet::new();
        while let Some(group) = self.groups.get(&current.process) {
            if !seen.insert(current.clone()) {
                return Err(ConnectionError::MappingCycle(current));
            }
            current = group
                .outputs
                .get(&current.port)
                .map(|m| m.target.clone())
                .ok_or_else(|| ConnectionError::UnmappedGroupPort(current.clone()))?;
        }
        Ok(current)
    }
}
