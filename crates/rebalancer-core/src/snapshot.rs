//! Inventory Snapshot (component B)
//!
//! Wraps a set of [`Node`]s (as reported by the hypervisor client) into the
//! dense-indexed, deterministically-ordered view the constraint and
//! objective builders iterate over.

use std::collections::{HashMap, HashSet};

use crate::config::Maintenance;
use crate::cost::{cpu_cost, memory_cost, migration_cost};
use crate::error::{RebalancerError, Result};
use crate::model::{Node, NodeId, VirtualMachine, VmId};

/// An immutable, dense-indexed view of cluster state at a point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Sorted by node id
    nodes: Vec<Node>,
    /// Sorted by (owning node id, vm id)
    vms: Vec<VirtualMachine>,
    node_index: HashMap<NodeId, usize>,
    vm_index: HashMap<VmId, usize>,
    maintenance: HashSet<NodeId>,
    memory_precision: u64,
}

impl Snapshot {
    /// Build a snapshot from hypervisor-reported nodes.
    ///
    /// Fails if any VM references a node not present in `nodes`.
    pub fn build(mut nodes: Vec<Node>, maintenance: &Maintenance, memory_precision: u64) -> Result<Self> {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let known_nodes: HashSet<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();

        let mut vms: Vec<VirtualMachine> = Vec::new();
        for node in &nodes {
            for vm in &node.virtual_machines {
                if !known_nodes.contains(&vm.node) {
                    return Err(RebalancerError::inventory(format!(
                        "vm {} references node {}, which is not in the inventory",
                        vm.id, vm.node
                    )));
                }
                vms.push(vm.clone());
            }
        }
        vms.sort_by(|a, b| a.node.cmp(&b.node).then_with(|| a.id.cmp(&b.id)));

        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let vm_index = vms.iter().enumerate().map(|(i, v)| (v.id, i)).collect();

        let maintenance: HashSet<NodeId> = nodes
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| maintenance.contains(id))
            .collect();

        Ok(Self {
            nodes,
            vms,
            node_index,
            vm_index,
            maintenance,
            memory_precision,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn vm(&self, idx: usize) -> &VirtualMachine {
        &self.vms[idx]
    }

    pub fn node_index_of(&self, id: &NodeId) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    pub fn vm_index_of(&self, id: VmId) -> Option<usize> {
        self.vm_index.get(&id).copied()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn all_vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.vms.iter()
    }

    pub fn all_nodes_except<'a>(&'a self, excluded: &'a HashSet<NodeId>) -> impl Iterator<Item = &'a Node> {
        self.nodes.iter().filter(move |n| !excluded.contains(&n.id))
    }

    pub fn nodes_with_ids<'a>(&'a self, ids: &'a HashSet<NodeId>) -> impl Iterator<Item = &'a Node> {
        self.nodes.iter().filter(move |n| ids.contains(&n.id))
    }

    pub fn vms_with_ids<'a>(&'a self, ids: &'a HashSet<VmId>) -> impl Iterator<Item = &'a VirtualMachine> {
        self.vms.iter().filter(move |v| ids.contains(&v.id))
    }

    pub fn maintenance_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| self.maintenance.contains(&n.id))
    }

    pub fn is_maintenance(&self, id: &NodeId) -> bool {
        self.maintenance.contains(id)
    }

    pub fn total_memory_cost(&self) -> u64 {
        self.vms.iter().map(memory_cost).sum()
    }

    pub fn total_cpu_cost(&self) -> u64 {
        self.vms.iter().map(cpu_cost).sum()
    }

    pub fn total_migration_cost(&self) -> u64 {
        self.vms.iter().map(migration_cost).sum()
    }

    /// Sum of num_cpu × 100 over non-maintenance nodes.
    pub fn total_usable_cluster_cpu(&self) -> u64 {
        self.nodes
            .iter()
            .filter(|n| !self.maintenance.contains(&n.id))
            .map(|n| n.num_cpu as u64 * 100)
            .sum()
    }

    /// Sum of memory_total ÷ memory_precision over non-maintenance nodes.
    pub fn total_usable_cluster_memory(&self) -> u64 {
        self.nodes
            .iter()
            .filter(|n| !self.maintenance.contains(&n.id))
            .map(|n| n.memory_total / self.memory_precision)
            .sum()
    }

    pub fn memory_precision(&self) -> u64 {
        self.memory_precision
    }
}
