//! Constraint Builder (component C)
//!
//! Builds the assignment matrix `x[n][v]` and posts every hard constraint
//! from the configuration and snapshot onto a [`Solver`]. Booleans are
//! represented as bounded integers in `{0, 1}` rather than solver literals,
//! keeping the whole model in the integer domain required by the objective's
//! quadratic terms (§4.4).

use std::collections::HashMap;

use pumpkin_solver::constraints as cp;
use pumpkin_solver::variables::{DomainId, TransformableVariable};
use pumpkin_solver::Solver;

use crate::config::{Config, Vm2HostAffinityType, Vm2VmAffinityType};
use crate::model::{NodeId, VmId};
use crate::snapshot::Snapshot;

/// The `x[node][vm]` assignment matrix, and the bookkeeping needed to tie
/// per-VM "current node" indices into the model.
pub struct AssignmentVars {
    /// `x[node_idx][vm_idx]`, each a `0/1` bounded integer.
    pub x: Vec<Vec<DomainId>>,
}

impl AssignmentVars {
    pub fn new(solver: &mut Solver, snapshot: &Snapshot) -> Self {
        let x = (0..snapshot.node_count())
            .map(|_| {
                (0..snapshot.vm_count())
                    .map(|_| solver.new_bounded_integer(0, 1))
                    .collect()
            })
            .collect();
        Self { x }
    }

    pub fn at(&self, node_idx: usize, vm_idx: usize) -> DomainId {
        self.x[node_idx][vm_idx]
    }
}

/// Posts every hard constraint from §4.3 onto `solver`. `vars` must have been
/// built over the same `snapshot`.
pub fn post_hard_constraints(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    config: &Config,
) {
    let tag = solver.new_constraint_tag();

    post_assignment(solver, snapshot, vars, tag);
    post_memory_capacity(solver, snapshot, vars, config.model.memory_precision, tag);
    post_maintenance_exclusion(solver, snapshot, vars, tag);
    post_locked_pinning(solver, snapshot, vars, tag);

    let mut node_of_cache: HashMap<VmId, DomainId> = HashMap::new();
    for rule in &config.affinity_rules.vm_to_vm {
        if !rule.enabled {
            continue;
        }
        match rule.type_ {
            Vm2VmAffinityType::KeepApart => post_keep_apart(solver, snapshot, vars, rule.vm_ids(), tag),
            Vm2VmAffinityType::KeepTogether => {
                post_keep_together(solver, snapshot, vars, rule.vm_ids(), &mut node_of_cache, tag)
            }
        }
    }

    for rule in &config.affinity_rules.vm_to_host {
        if !rule.enabled {
            continue;
        }
        let allowed: std::collections::HashSet<NodeId> = rule.node_ids().collect();
        match rule.type_ {
            Vm2HostAffinityType::RunHere => post_run_here(solver, snapshot, vars, rule.vm_ids(), &allowed, tag),
            Vm2HostAffinityType::RunElsewhere => {
                post_run_elsewhere(solver, snapshot, vars, rule.vm_ids(), &allowed, tag)
            }
        }
    }
}

fn post_assignment(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    tag: pumpkin_solver::ConstraintTag,
) {
    for vm_idx in 0..snapshot.vm_count() {
        let terms: Vec<_> = (0..snapshot.node_count())
            .map(|node_idx| vars.at(node_idx, vm_idx).scaled(1))
            .collect();
        let _ = solver.add_constraint(cp::equals(terms, 1, tag)).post();
    }
}

fn post_memory_capacity(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    memory_precision: u64,
    tag: pumpkin_solver::ConstraintTag,
) {
    for node_idx in 0..snapshot.node_count() {
        let node = snapshot.node(node_idx);
        let capacity = (node.memory_total / memory_precision) as i32;
        let terms: Vec<_> = (0..snapshot.vm_count())
            .map(|vm_idx| {
                let vm = snapshot.vm(vm_idx);
                let coeff = (vm.memory_used / memory_precision) as i32;
                vars.at(node_idx, vm_idx).scaled(coeff)
            })
            .collect();
        let _ = solver
            .add_constraint(cp::less_than_or_equals(terms, capacity, tag))
            .post();
    }
}

fn post_maintenance_exclusion(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    tag: pumpkin_solver::ConstraintTag,
) {
    for node_idx in 0..snapshot.node_count() {
        let node = snapshot.node(node_idx);
        if !snapshot.is_maintenance(&node.id) {
            continue;
        }
        let terms: Vec<_> = (0..snapshot.vm_count())
            .map(|vm_idx| vars.at(node_idx, vm_idx).scaled(1))
            .collect();
        let _ = solver.add_constraint(cp::equals(terms, 0, tag)).post();
    }
}

fn post_locked_pinning(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    tag: pumpkin_solver::ConstraintTag,
) {
    for vm_idx in 0..snapshot.vm_count() {
        let vm = snapshot.vm(vm_idx);
        if !vm.locked {
            continue;
        }
        let Some(node_idx) = snapshot.node_index_of(&vm.node) else {
            continue;
        };
        let _ = solver
            .add_constraint(cp::equals(vec![vars.at(node_idx, vm_idx).scaled(1)], 1, tag))
            .post();
    }
}

fn post_keep_apart(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    vm_ids: impl Iterator<Item = VmId>,
    tag: pumpkin_solver::ConstraintTag,
) {
    let members: Vec<usize> = vm_ids.filter_map(|id| snapshot.vm_index_of(id)).collect();
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            for node_idx in 0..snapshot.node_count() {
                let terms = vec![vars.at(node_idx, a).scaled(1), vars.at(node_idx, b).scaled(1)];
                let _ = solver.add_constraint(cp::less_than_or_equals(terms, 1, tag)).post();
            }
        }
    }
}

/// `node_of(v) = Σₙ n · x[n,v]`, tied to a fresh bounded integer. Since
/// exactly one `x[n,v]` is 1 (the assignment constraint), `node_of(v)` equals
/// the dense index of the node `v` is assigned to — an equivalent, and
/// simpler, encoding of "same node" than per-node boolean reification.
fn node_of(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    vm_idx: usize,
    cache: &mut HashMap<VmId, DomainId>,
    tag: pumpkin_solver::ConstraintTag,
) -> DomainId {
    let vm_id = snapshot.vm(vm_idx).id;
    if let Some(&existing) = cache.get(&vm_id) {
        return existing;
    }
    let node_of_var = solver.new_bounded_integer(0, (snapshot.node_count().max(1) - 1) as i32);
    let mut terms: Vec<_> = (0..snapshot.node_count())
        .map(|node_idx| vars.at(node_idx, vm_idx).scaled(node_idx as i32))
        .collect();
    terms.push(node_of_var.scaled(-1));
    let _ = solver.add_constraint(cp::equals(terms, 0, tag)).post();
    cache.insert(vm_id, node_of_var);
    node_of_var
}

fn post_keep_together(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    vm_ids: impl Iterator<Item = VmId>,
    cache: &mut HashMap<VmId, DomainId>,
    tag: pumpkin_solver::ConstraintTag,
) {
    let members: Vec<usize> = vm_ids.filter_map(|id| snapshot.vm_index_of(id)).collect();
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            let node_of_a = node_of(solver, snapshot, vars, a, cache, tag);
            let node_of_b = node_of(solver, snapshot, vars, b, cache, tag);
            let terms = vec![node_of_a.scaled(1), node_of_b.scaled(-1)];
            let _ = solver.add_constraint(cp::equals(terms, 0, tag)).post();
        }
    }
}

fn post_run_here(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    vm_ids: impl Iterator<Item = VmId>,
    allowed: &std::collections::HashSet<NodeId>,
    tag: pumpkin_solver::ConstraintTag,
) {
    for vm_idx in vm_ids.filter_map(|id| snapshot.vm_index_of(id)) {
        for node_idx in 0..snapshot.node_count() {
            let node = snapshot.node(node_idx);
            if allowed.contains(&node.id) {
                continue;
            }
            let _ = solver
                .add_constraint(cp::equals(vec![vars.at(node_idx, vm_idx).scaled(1)], 0, tag))
                .post();
        }
    }
}

fn post_run_elsewhere(
    solver: &mut Solver,
    snapshot: &Snapshot,
    vars: &AssignmentVars,
    vm_ids: impl Iterator<Item = VmId>,
    disallowed: &std::collections::HashSet<NodeId>,
    tag: pumpkin_solver::ConstraintTag,
) {
    for vm_idx in vm_ids.filter_map(|id| snapshot.vm_index_of(id)) {
        for node_idx in 0..snapshot.node_count() {
            let node = snapshot.node(node_idx);
            if !disallowed.contains(&node.id) {
                continue;
            }
            let _ = solver
                .add_constraint(cp::equals(vec![vars.at(node_idx, vm_idx).scaled(1)], 0, tag))
                .post();
        }
    }
}
