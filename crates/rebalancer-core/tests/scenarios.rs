//! Seed scenarios (§8) exercising the full build → solve → diff pipeline.

use rebalancer_core::config::{
    AffinityRules, Config, General, Maintenance, MigrationConfig, ModelConfig, SolverConfig,
    Vm2HostAffinityRule, Vm2HostAffinityType, Vm2VmAffinityRule, Vm2VmAffinityType,
};
use rebalancer_core::diff::diff;
use rebalancer_core::model::{Node, NodeId, RunState, VirtualMachine, VmId};
use rebalancer_core::snapshot::Snapshot;
use rebalancer_core::solver::{SolveOutcome, SolverDriver};
use rebalancer_core::RebalancerError;

const GIB: u64 = 1024 * 1024 * 1024;

fn running_vm(id: u32, node: &str, memory_used_gib: u64, cpu_fraction: f64) -> VirtualMachine {
    VirtualMachine {
        id: VmId(id),
        name: format!("vm{id}"),
        state: RunState::Running,
        locked: false,
        node: NodeId::new(node),
        memory_used: memory_used_gib * GIB,
        memory_max: memory_used_gib * GIB * 2,
        cpu_used: cpu_fraction,
        cpu_max: 1.0,
    }
}

fn node(name: &str, memory_total_gib: u64, num_cpu: u32, vms: Vec<VirtualMachine>) -> Node {
    Node {
        id: NodeId::new(name),
        memory_total: memory_total_gib * GIB,
        memory_used: 0,
        num_cpu,
        virtual_machines: vms,
    }
}

fn base_config() -> Config {
    Config {
        general: General {
            host: "pve.example.com".into(),
            user: "root@pam".into(),
            password: "unused-in-tests".into(),
            verify_ssl: true,
        },
        model: ModelConfig::default(),
        solver: SolverConfig { max_time_in_seconds: 5, num_search_workers: 1 },
        migration: MigrationConfig::default(),
        maintenance: Maintenance::default(),
        affinity_rules: AffinityRules::default(),
    }
}

#[test]
fn s1_trivial_balance_splits_evenly() {
    let nodes = vec![
        node(
            "node-a",
            100,
            8,
            vec![
                running_vm(1, "node-a", 2, 0.10),
                running_vm(2, "node-a", 2, 0.10),
                running_vm(3, "node-a", 2, 0.10),
                running_vm(4, "node-a", 2, 0.10),
            ],
        ),
        node("node-b", 100, 8, vec![]),
    ];
    let config = base_config();
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let outcome = SolverDriver::new(&config).solve(&before).unwrap();
    let after = match outcome {
        SolveOutcome::Optimal(s) | SolveOutcome::Feasible(s) => s,
    };

    let a_count = after.node(after.node_index_of(&NodeId::new("node-a")).unwrap())
        .virtual_machines
        .len();
    let b_count = after.node(after.node_index_of(&NodeId::new("node-b")).unwrap())
        .virtual_machines
        .len();
    assert_eq!(a_count, 2);
    assert_eq!(b_count, 2);

    let migrations = diff(&before, &after);
    assert!(!migrations.is_empty());
}

#[test]
fn s2_maintenance_excludes_node_and_splits_proportionally() {
    let nodes = vec![
        node(
            "node-a",
            100,
            8,
            vec![
                running_vm(1, "node-a", 2, 0.10),
                running_vm(2, "node-a", 2, 0.10),
            ],
        ),
        node(
            "node-b",
            100,
            8,
            vec![
                running_vm(3, "node-b", 2, 0.10),
                running_vm(4, "node-b", 2, 0.10),
            ],
        ),
        node(
            "node-c",
            100,
            8,
            vec![
                running_vm(5, "node-c", 2, 0.10),
                running_vm(6, "node-c", 2, 0.10),
            ],
        ),
    ];
    let mut config = base_config();
    config.maintenance.nodes.insert("node-b".to_string());
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let outcome = SolverDriver::new(&config).solve(&before).unwrap();
    let after = match outcome {
        SolveOutcome::Optimal(s) | SolveOutcome::Feasible(s) => s,
    };

    let b_idx = after.node_index_of(&NodeId::new("node-b")).unwrap();
    assert!(after.node(b_idx).virtual_machines.is_empty());
    let total_elsewhere: usize = after
        .all_nodes()
        .filter(|n| n.id != NodeId::new("node-b"))
        .map(|n| n.virtual_machines.len())
        .sum();
    assert_eq!(total_elsewhere, 6);
}

#[test]
fn s3_locked_vm_stays_put() {
    let nodes = vec![
        node(
            "node-a",
            100,
            8,
            vec![
                running_vm(1, "node-a", 2, 0.10),
                {
                    let mut v = running_vm(2, "node-a", 2, 0.10);
                    v.locked = true;
                    v
                },
                running_vm(3, "node-a", 2, 0.10),
                running_vm(4, "node-a", 2, 0.10),
            ],
        ),
        node("node-b", 100, 8, vec![]),
    ];
    let config = base_config();
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let outcome = SolverDriver::new(&config).solve(&before).unwrap();
    let after = match outcome {
        SolveOutcome::Optimal(s) | SolveOutcome::Feasible(s) => s,
    };

    let v2_idx = after.vm_index_of(VmId(2)).unwrap();
    assert_eq!(after.vm(v2_idx).node, NodeId::new("node-a"));
}

#[test]
fn s4_keep_apart_forces_distinct_nodes() {
    let nodes = vec![
        node(
            "node-a",
            100,
            8,
            vec![
                running_vm(1, "node-a", 2, 0.10),
                running_vm(2, "node-a", 2, 0.10),
                running_vm(3, "node-a", 2, 0.10),
            ],
        ),
        node("node-b", 100, 8, vec![]),
        node("node-c", 100, 8, vec![]),
    ];
    let mut config = base_config();
    config.affinity_rules.vm_to_vm.push(Vm2VmAffinityRule {
        name: Some("spread".into()),
        comment: None,
        enabled: true,
        type_: Vm2VmAffinityType::KeepApart,
        virtual_machines: [1, 2, 3].into_iter().collect(),
    });
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let outcome = SolverDriver::new(&config).solve(&before).unwrap();
    let after = match outcome {
        SolveOutcome::Optimal(s) | SolveOutcome::Feasible(s) => s,
    };

    let hosts: std::collections::HashSet<NodeId> = [VmId(1), VmId(2), VmId(3)]
        .iter()
        .map(|id| after.vm(after.vm_index_of(*id).unwrap()).node.clone())
        .collect();
    assert_eq!(hosts.len(), 3);
}

#[test]
fn s5_over_constrained_keep_apart_is_infeasible() {
    let nodes = vec![
        node(
            "node-a",
            100,
            8,
            vec![
                running_vm(1, "node-a", 2, 0.10),
                running_vm(2, "node-a", 2, 0.10),
                running_vm(3, "node-a", 2, 0.10),
            ],
        ),
        node("node-b", 100, 8, vec![]),
    ];
    let mut config = base_config();
    config.affinity_rules.vm_to_vm.push(Vm2VmAffinityRule {
        name: Some("spread".into()),
        comment: None,
        enabled: true,
        type_: Vm2VmAffinityType::KeepApart,
        virtual_machines: [1, 2, 3].into_iter().collect(),
    });
    let snapshot = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let result = SolverDriver::new(&config).solve(&snapshot);
    assert!(matches!(result, Err(RebalancerError::ModelInfeasible)));
}

#[test]
fn keep_together_forces_same_node() {
    let nodes = vec![
        node(
            "node-a",
            100,
            8,
            vec![
                running_vm(1, "node-a", 2, 0.10),
                running_vm(2, "node-a", 2, 0.10),
            ],
        ),
        node("node-b", 100, 8, vec![running_vm(3, "node-b", 2, 0.10), running_vm(4, "node-b", 2, 0.10)]),
    ];
    let mut config = base_config();
    config.affinity_rules.vm_to_vm.push(Vm2VmAffinityRule {
        name: Some("stick-together".into()),
        comment: None,
        enabled: true,
        type_: Vm2VmAffinityType::KeepTogether,
        virtual_machines: [1, 3].into_iter().collect(),
    });
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let outcome = SolverDriver::new(&config).solve(&before).unwrap();
    let after = match outcome {
        SolveOutcome::Optimal(s) | SolveOutcome::Feasible(s) => s,
    };

    let node_of_1 = after.vm(after.vm_index_of(VmId(1)).unwrap()).node.clone();
    let node_of_3 = after.vm(after.vm_index_of(VmId(3)).unwrap()).node.clone();
    assert_eq!(node_of_1, node_of_3);
}

#[test]
fn run_elsewhere_excludes_named_host() {
    let nodes = vec![
        node("node-a", 100, 8, vec![running_vm(1, "node-a", 2, 0.10)]),
        node("node-b", 100, 8, vec![]),
    ];
    let mut config = base_config();
    config.affinity_rules.vm_to_host.push(Vm2HostAffinityRule {
        name: Some("avoid-a".into()),
        comment: None,
        nodes: ["node-a".to_string()].into_iter().collect(),
        enabled: true,
        type_: Vm2HostAffinityType::RunElsewhere,
        virtual_machines: [1].into_iter().collect(),
    });
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let outcome = SolverDriver::new(&config).solve(&before).unwrap();
    let after = match outcome {
        SolveOutcome::Optimal(s) | SolveOutcome::Feasible(s) => s,
    };
    let v1_idx = after.vm_index_of(VmId(1)).unwrap();
    assert_eq!(after.vm(v1_idx).node, NodeId::new("node-b"));
}

#[test]
fn run_here_pins_vm_to_named_host() {
    let nodes = vec![
        node("node-a", 100, 8, vec![running_vm(1, "node-a", 2, 0.10)]),
        node("node-b", 100, 8, vec![]),
    ];
    let mut config = base_config();
    config.affinity_rules.vm_to_host.push(Vm2HostAffinityRule {
        name: Some("pin-to-a".into()),
        comment: None,
        nodes: ["node-a".to_string()].into_iter().collect(),
        enabled: true,
        type_: Vm2HostAffinityType::RunHere,
        virtual_machines: [1].into_iter().collect(),
    });
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision).unwrap();

    let outcome = SolverDriver::new(&config).solve(&before).unwrap();
    let after = match outcome {
        SolveOutcome::Optimal(s) | SolveOutcome::Feasible(s) => s,
    };
    let v1_idx = after.vm_index_of(VmId(1)).unwrap();
    assert_eq!(after.vm(v1_idx).node, NodeId::new("node-a"));
}
