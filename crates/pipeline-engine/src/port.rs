//! Port declarations
//!
//! These types describe the connection points a process exposes, including
//! their payload type tags and flags, and the rules deciding whether two
//! ports may be joined by an edge.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully qualified port name: `(process, port)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortAddr {
    pub process: String,
    pub port: String,
}

impl PortAddr {
    pub fn new(process: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.process, self.port)
    }
}

/// Whether a port is an input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Payload type tag of a port
///
/// Tags are compared by name when an edge is created; the payload itself is
/// never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortType(String);

impl PortType {
    const ANY: &'static str = "_any";
    const NONE: &'static str = "_none";

    /// Accepts or produces any payload type
    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    /// Carries no payload (stamps and control markers only)
    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }

    /// Check if data of this type can flow into a port of `other` type
    pub fn is_compatible_with(&self, other: &PortType) -> bool {
        // Any type is compatible with everything
        if self.is_any() || other.is_any() {
            return true;
        }

        // Exact type match (including none-to-none)
        self == other
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Behavioral flags on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortFlag {
    /// Must be connected before the pipeline can run
    Required,
    /// May be left unconnected (the default)
    Optional,
    /// Output data must not be modified by receivers
    Const,
    /// Output data is shared between receivers
    Shared,
    /// Input intends to modify the data it receives
    Mutable,
    /// Input does not count as a dependency for cycle detection or readiness
    NoDependency,
}

/// Set of flags on a port or group mapping
pub type PortFlags = BTreeSet<PortFlag>;

/// Declaration of a single port on a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub name: String,
    pub direction: PortDirection,
    pub port_type: PortType,
    pub flags: PortFlags,
    pub description: String,
}

impl PortInfo {
    /// Declare an optional input port
    pub fn input(name: impl Into<String>, port_type: PortType, description: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Input, port_type, description)
    }

    /// Declare an optional output port
    pub fn output(name: impl Into<String>, port_type: PortType, description: impl Into<String>) -> Self {
        Self::new(name, PortDirection::Output, port_type, description)
    }

    fn new(
        name: impl Into<String>,
        direction: PortDirection,
        port_type: PortType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            port_type,
            flags: PortFlags::new(),
            description: description.into(),
        }
    }

    /// Mark this port as required
    pub fn required(mut self) -> Self {
        self.flags.remove(&PortFlag::Optional);
        self.flags.insert(PortFlag::Required);
        self
    }

    /// Add a flag
    pub fn with_flag(mut self, flag: PortFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(&PortFlag::Required)
    }

    pub fn has_flag(&self, flag: PortFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Check the flag rules for an edge from `upstream` into `downstream`
///
/// Returns the reason the pair is rejected, if any.
pub fn flag_conflict(upstream: &PortInfo, downstream: &PortInfo) -> Option<String> {
    if !downstream.has_flag(PortFlag::Mutable) {
        return None;
    }
    if upstream.has_flag(PortFlag::Const) {
        return Some("const output cannot feed a mutable input".to_string());
    }
    if upstream.has_flag(PortFlag::Shared) {
        return Some("shared output cannot feed a mutable input".to_string());
    }
    None
}
