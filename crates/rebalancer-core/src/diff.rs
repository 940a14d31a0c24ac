//! Migration Diff (component F)
//!
//! Pure set difference between an old and new [`Snapshot`]: which VMs need
//! to move, and where to.

use crate::cost::migration_cost;
use crate::model::{NodeId, VmId};
use crate::snapshot::Snapshot;

/// A single planned move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub vm: VmId,
    pub target_node: NodeId,
    pub migration_cost: u64,
}

/// VMs whose host differs between `before` and `after`, sorted by
/// migration_cost ascending (the order the executor consumes them in).
pub fn diff(before: &Snapshot, after: &Snapshot) -> Vec<Migration> {
    let mut migrations: Vec<Migration> = Vec::new();

    for vm in after.all_vms() {
        let Some(before_idx) = before.vm_index_of(vm.id) else {
            continue;
        };
        let previous = before.vm(before_idx);
        if previous.node != vm.node {
            migrations.push(Migration {
                vm: vm.id,
                target_node: vm.node.clone(),
                migration_cost: migration_cost(vm),
            });
        }
    }

    migrations.sort_by_key(|m| m.migration_cost);
    migrations
}

/// Sum of `migration_cost` over a diff; used by the top-level driver's skip
/// threshold (§6).
pub fn total_migration_cost(migrations: &[Migration]) -> u64 {
    migrations.iter().map(|m| m.migration_cost).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Maintenance;
    use crate::model::{Node, RunState, VirtualMachine};

    fn vm(id: u32, node: &str) -> VirtualMachine {
        VirtualMachine {
            id: VmId(id),
            name: format!("vm{id}"),
            state: RunState::Running,
            locked: false,
            node: NodeId::new(node),
            memory_used: 2 * 1024 * 1024 * 1024,
            memory_max: 4 * 1024 * 1024 * 1024,
            cpu_used: 0.2,
            cpu_max: 2.0,
        }
    }

    fn node(name: &str, vms: Vec<VirtualMachine>) -> Node {
        Node {
            id: NodeId::new(name),
            memory_total: 100 * 1024 * 1024 * 1024,
            memory_used: 0,
            num_cpu: 8,
            virtual_machines: vms,
        }
    }

    #[test]
    fn diff_contains_only_moved_vms() {
        let maintenance = Maintenance::default();
        let before = Snapshot::build(
            vec![node("a", vec![vm(1, "a"), vm(2, "a")]), node("b", vec![])],
            &maintenance,
            1024 * 1024,
        )
        .unwrap();
        let after = Snapshot::build(
            vec![node("a", vec![vm(1, "a")]), node("b", vec![vm(2, "b")])],
            &maintenance,
            1024 * 1024,
        )
        .unwrap();

        let migrations = diff(&before, &after);
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].vm, VmId(2));
        assert_eq!(migrations[0].target_node, NodeId::new("b"));
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let maintenance = Maintenance::default();
        let snap = Snapshot::build(vec![node("a", vec![vm(1, "a")])], &maintenance, 1024 * 1024).unwrap();
        assert!(diff(&snap, &snap).is_empty());
    }
}
