//! Objective Builder (component D)
//!
//! Builds the fair-share targets, per-node squared-distance terms, and the
//! migration penalty, then ties them into a single objective variable for
//! [`crate::solver`] to minimise.
//!
//! `p[n,v]` (the per-(node,vm) migration price) and the per-node cost
//! aggregates `mem_c`/`cpu_c` all have constant, known-at-build-time
//! coefficients — they are plain affine expressions over `x`, not solver
//! variables in their own right. Only the squared-distance terms need a
//! genuine variable product, via `cp::times`.

use pumpkin_solver::constraints as cp;
use pumpkin_solver::variables::{AffineView, DomainId, TransformableVariable};
use pumpkin_solver::Solver;

use crate::constraints::AssignmentVars;
use crate::cost::{cpu_cost, memory_cost, migration_cost};
use crate::snapshot::Snapshot;

/// CPU balance dominates memory balance; migration cost is a pure
/// tie-breaker. See §4.4 for the rationale behind these exact weights.
pub const CPU_BALANCE_WEIGHT: i32 = 5_000_000;
pub const MEM_BALANCE_WEIGHT: i32 = 5_000;
pub const MIGRATION_WEIGHT: i32 = 1;

/// Handles to every variable the objective introduced, kept around so the
/// solver driver can report diagnostics (§4.5: wall time, objective value,
/// migration-cost component, per-node distances) from a found solution.
pub struct ObjectiveVars {
    pub objective: DomainId,
    pub migration_cost_total: DomainId,
    pub cpu_dist_sq: Vec<DomainId>,
    pub mem_dist_sq: Vec<DomainId>,
}

/// Fair-share targets, computed once from the snapshot before the model is
/// built (§4.4 "Fair-share targets").
struct FairShare {
    cpu_target: Vec<i32>,
    mem_target: Vec<i32>,
}

fn fair_share(snapshot: &Snapshot) -> FairShare {
    let total_cpu_cost = snapshot.total_cpu_cost() as f64;
    let total_memory_cost = (snapshot.total_memory_cost() / snapshot.memory_precision().max(1)) as f64;
    let total_cluster_cpu = snapshot.total_usable_cluster_cpu().max(1) as f64;
    let total_cluster_memory = snapshot.total_usable_cluster_memory().max(1) as f64;

    let mut cpu_target = Vec::with_capacity(snapshot.node_count());
    let mut mem_target = Vec::with_capacity(snapshot.node_count());
    for node_idx in 0..snapshot.node_count() {
        let node = snapshot.node(node_idx);
        if snapshot.is_maintenance(&node.id) {
            cpu_target.push(0);
            mem_target.push(0);
            continue;
        }
        let cpu_fraction = (node.num_cpu as f64 * 100.0) / total_cluster_cpu;
        let mem_fraction = (node.memory_total / snapshot.memory_precision()) as f64 / total_cluster_memory;
        cpu_target.push((total_cpu_cost * cpu_fraction).ceil() as i32);
        mem_target.push((total_memory_cost * mem_fraction).ceil() as i32);
    }
    FairShare { cpu_target, mem_target }
}

/// `mem_c(n)`/`cpu_c(n)` bound into a fresh variable, so the squared-distance
/// term below can reference it.
fn bind_linear_sum(
    solver: &mut Solver,
    mut terms: Vec<pumpkin_solver::variables::AffineView<DomainId>>,
    upper_bound: i32,
    tag: pumpkin_solver::ConstraintTag,
) -> DomainId {
    let bound_var = solver.new_bounded_integer(0, upper_bound.max(0));
    terms.push(bound_var.scaled(-1));
    let _ = solver.add_constraint(cp::equals(terms, 0, tag)).post();
    bound_var
}

/// `(value − target)²`, bound into a fresh variable via a genuine product
/// constraint.
fn squared_distance(
    solver: &mut Solver,
    value: DomainId,
    target: i32,
    max_abs_dist: i32,
    tag: pumpkin_solver::ConstraintTag,
) -> DomainId {
    let diff = solver.new_bounded_integer(-max_abs_dist, max_abs_dist);
    let _ = solver
        .add_constraint(cp::equals(vec![diff.scaled(1), value.scaled(-1)], -target, tag))
        .post();

    let squared = solver.new_bounded_integer(0, max_abs_dist.saturating_mul(max_abs_dist).max(0));
    let _ = solver.add_constraint(cp::times(diff, diff, squared, tag)).post();
    squared
}

pub fn build_objective(solver: &mut Solver, snapshot: &Snapshot, vars: &AssignmentVars) -> ObjectiveVars {
    let tag = solver.new_constraint_tag();
    let shares = fair_share(snapshot);

    let total_cpu = snapshot.total_cpu_cost() as i32;
    let total_mem = (snapshot.total_memory_cost() / snapshot.memory_precision().max(1)) as i32;

    let mut cpu_dist_sq = Vec::with_capacity(snapshot.node_count());
    let mut mem_dist_sq = Vec::with_capacity(snapshot.node_count());

    for node_idx in 0..snapshot.node_count() {
        let cpu_terms: Vec<_> = (0..snapshot.vm_count())
            .map(|vm_idx| {
                let cost = cpu_cost(snapshot.vm(vm_idx)) as i32;
                vars.at(node_idx, vm_idx).scaled(cost)
            })
            .collect();
        let cpu_c = bind_linear_sum(solver, cpu_terms, total_cpu, tag);
        let cpu_sq = squared_distance(solver, cpu_c, shares.cpu_target[node_idx], total_cpu, tag);
        cpu_dist_sq.push(cpu_sq);

        let mem_terms: Vec<_> = (0..snapshot.vm_count())
            .map(|vm_idx| {
                let cost = (memory_cost(snapshot.vm(vm_idx)) / snapshot.memory_precision().max(1)) as i32;
                vars.at(node_idx, vm_idx).scaled(cost)
            })
            .collect();
        let mem_c = bind_linear_sum(solver, mem_terms, total_mem, tag);
        let mem_sq = squared_distance(solver, mem_c, shares.mem_target[node_idx], total_mem, tag);
        mem_dist_sq.push(mem_sq);
    }

    let mut migration_terms = Vec::with_capacity(snapshot.node_count() * snapshot.vm_count());
    let mut max_migration_cost: i64 = 0;
    for node_idx in 0..snapshot.node_count() {
        let node = snapshot.node(node_idx);
        for vm_idx in 0..snapshot.vm_count() {
            let vm = snapshot.vm(vm_idx);
            let price = if vm.node == node.id { 0 } else { migration_cost(vm) as i32 };
            max_migration_cost += price as i64;
            if price != 0 {
                migration_terms.push(vars.at(node_idx, vm_idx).scaled(price));
            }
        }
    }
    let migration_cost_total = bind_linear_sum(
        solver,
        migration_terms,
        max_migration_cost.min(i32::MAX as i64) as i32,
        tag,
    );

    let max_cpu_penalty = CPU_BALANCE_WEIGHT.saturating_mul(
        total_cpu.saturating_mul(total_cpu).max(1),
    );
    let max_mem_penalty = MEM_BALANCE_WEIGHT.saturating_mul(
        total_mem.saturating_mul(total_mem).max(1),
    );
    let objective_upper_bound = max_cpu_penalty
        .saturating_add(max_mem_penalty)
        .saturating_add(max_migration_cost.min(i32::MAX as i64) as i32);

    let mut objective_terms: Vec<_> = cpu_dist_sq
        .iter()
        .map(|&v| v.scaled(CPU_BALANCE_WEIGHT))
        .chain(mem_dist_sq.iter().map(|&v| v.scaled(MEM_BALANCE_WEIGHT)))
        .collect();
    objective_terms.push(migration_cost_total.scaled(MIGRATION_WEIGHT));

    let objective = bind_linear_sum(solver, objective_terms, objective_upper_bound, tag);

    ObjectiveVars {
        objective,
        migration_cost_total,
        cpu_dist_sq,
        mem_dist_sq,
    }
}
