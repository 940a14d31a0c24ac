//! Core data model: nodes, virtual machines, and their identifiers
//!
//! These types describe the cluster as reported by the hypervisor, before
//! any internal indices have been assigned. [`crate::snapshot::Snapshot`]
//! wraps a set of [`Node`]s into the dense-indexed view the solver needs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, hypervisor-assigned node identifier (e.g. a Proxmox node name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable, hypervisor-assigned VM identifier (e.g. a Proxmox VMID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VmId(pub u32);

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run state as reported by the hypervisor.
///
/// Only the running/not-running distinction matters to the cost model
/// (§4.1); `Other` keeps whatever string the hypervisor used for
/// diagnostics without the cost model needing to enumerate every
/// hypervisor-specific state name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    Stopped,
    Other(String),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }

    pub fn from_hypervisor_str(s: &str) -> Self {
        match s {
            "running" => RunState::Running,
            "stopped" => RunState::Stopped,
            other => RunState::Other(other.to_string()),
        }
    }
}

/// A hypervisor host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable human identifier
    pub id: NodeId,
    /// Total memory capacity in bytes
    pub memory_total: u64,
    /// Memory currently reported in use by the hypervisor (informational only)
    pub memory_used: u64,
    /// CPU capacity, in integer cores
    pub num_cpu: u32,
    /// VMs currently placed on this node
    pub virtual_machines: Vec<VirtualMachine>,
}

/// A workload unit running on a [`Node`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// Stable hypervisor identifier
    pub id: VmId,
    /// Display name
    pub name: String,
    /// Run state
    pub state: RunState,
    /// Administrative pin: true forbids the solver from moving this VM
    pub locked: bool,
    /// Id of the node this VM currently runs on
    pub node: NodeId,
    /// Observed memory usage, bytes (0 for stopped VMs)
    pub memory_used: u64,
    /// Configured memory maximum, bytes
    pub memory_max: u64,
    /// Observed CPU utilization, fractional cores (0.0 for stopped VMs)
    pub cpu_used: f64,
    /// Configured CPU maximum, cores
    pub cpu_max: f64,
}
