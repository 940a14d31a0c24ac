//! Solver Driver (component E)
//!
//! Builds the model onto a fresh [`Solver`], runs an optimize-under-budget
//! search (mirroring the pattern in `utf8proj-solver`'s cluster leveling —
//! bounded-integer variables, a `TimeBudget` termination, and
//! `LinearSatUnsat` optimisation), and turns the result back into a
//! [`Snapshot`].

use std::time::{Duration, Instant};

use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution, SolutionReference};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::Solver;
use tracing::{debug, info};

use crate::config::Config;
use crate::constraints::{self, AssignmentVars};
use crate::error::{RebalancerError, Result};
use crate::model::{Node, VirtualMachine};
use crate::objective::{self, ObjectiveVars};
use crate::snapshot::Snapshot;

/// One intermediate or final report from the solve, for diagnostic logging.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub elapsed: Duration,
    pub objective_value: i64,
    pub migration_cost: i64,
    /// `(node_name, sqrt(cpu_dist²), sqrt(mem_dist²))` per node.
    pub node_distances: Vec<(String, f64, f64)>,
}

/// Receives progress reports while the solver runs. The default impl is a
/// no-op; callers that want visibility into the search (e.g. the CLI) can
/// implement this to log or display progress.
pub trait SolveObserver {
    fn on_progress(&mut self, report: ProgressReport) {
        let _ = report;
    }
}

/// An observer that discards every report.
pub struct NullObserver;
impl SolveObserver for NullObserver {}

/// Outcome of a solve attempt, mirroring §4.5's four solver states.
pub enum SolveOutcome {
    /// Proved optimal within the time budget.
    Optimal(Snapshot),
    /// Budget exhausted with a feasible (not necessarily optimal) solution.
    Feasible(Snapshot),
}

/// Drives one CP solve over a [`Snapshot`] and [`Config`].
pub struct SolverDriver<'a, O: SolveObserver> {
    config: &'a Config,
    observer: O,
}

impl<'a> SolverDriver<'a, NullObserver> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, observer: NullObserver }
    }
}

impl<'a, O: SolveObserver> SolverDriver<'a, O> {
    pub fn with_observer(config: &'a Config, observer: O) -> Self {
        Self { config, observer }
    }

    pub fn solve(&mut self, snapshot: &Snapshot) -> Result<SolveOutcome> {
        if self.config.solver.num_search_workers != 1 {
            debug!(
                workers = self.config.solver.num_search_workers,
                "num_search_workers is accepted for config compatibility but pumpkin-solver has no multi-worker knob"
            );
        }

        let mut solver = Solver::default();
        let vars = AssignmentVars::new(&mut solver, snapshot);
        constraints::post_hard_constraints(&mut solver, snapshot, &vars, self.config);
        let objective_vars = objective::build_objective(&mut solver, snapshot, &vars);

        let mut brancher = solver.default_brancher();
        let mut termination =
            TimeBudget::starting_now(Duration::from_secs(self.config.solver.max_time_in_seconds));

        let start = Instant::now();
        let node_names: Vec<String> = snapshot.all_nodes().map(|n| n.id.to_string()).collect();

        fn noop_callback<B>(_: &Solver, _: SolutionReference, _: &B) {}
        let result = solver.optimise(
            &mut brancher,
            &mut termination,
            LinearSatUnsat::new(OptimisationDirection::Minimise, objective_vars.objective, noop_callback),
        );

        match result {
            OptimisationResult::Optimal(solution) => {
                self.report_progress(start, &objective_vars, &node_names, &solution);
                let new_snapshot = rebuild_snapshot(snapshot, &vars, &solution);
                info!(elapsed_ms = start.elapsed().as_millis(), "solve completed: optimal");
                Ok(SolveOutcome::Optimal(new_snapshot))
            }
            OptimisationResult::Satisfiable(solution) => {
                self.report_progress(start, &objective_vars, &node_names, &solution);
                let new_snapshot = rebuild_snapshot(snapshot, &vars, &solution);
                info!(elapsed_ms = start.elapsed().as_millis(), "solve completed: feasible (budget exhausted)");
                Ok(SolveOutcome::Feasible(new_snapshot))
            }
            OptimisationResult::Unsatisfiable => Err(RebalancerError::ModelInfeasible),
            OptimisationResult::Unknown => Err(RebalancerError::ModelUnknown),
        }
    }

    fn report_progress(
        &mut self,
        start: Instant,
        objective_vars: &ObjectiveVars,
        node_names: &[String],
        solution: &impl ProblemSolution,
    ) {
        let node_distances = node_names
            .iter()
            .cloned()
            .zip(objective_vars.cpu_dist_sq.iter().zip(objective_vars.mem_dist_sq.iter()))
            .map(|(name, (&cpu_sq, &mem_sq))| {
                let cpu = (solution.get_integer_value(cpu_sq) as f64).max(0.0).sqrt();
                let mem = (solution.get_integer_value(mem_sq) as f64).max(0.0).sqrt();
                (name, cpu, mem)
            })
            .collect();

        self.observer.on_progress(ProgressReport {
            elapsed: start.elapsed(),
            objective_value: solution.get_integer_value(objective_vars.objective),
            migration_cost: solution.get_integer_value(objective_vars.migration_cost_total),
            node_distances,
        });
    }
}

/// Copies each node's identity/capacity from `snapshot` but replaces its VM
/// list with whichever VMs the solution assigned to it.
fn rebuild_snapshot(snapshot: &Snapshot, vars: &AssignmentVars, solution: &impl ProblemSolution) -> Snapshot {
    let mut nodes: Vec<Node> = snapshot
        .all_nodes()
        .map(|n| Node {
            id: n.id.clone(),
            memory_total: n.memory_total,
            memory_used: n.memory_used,
            num_cpu: n.num_cpu,
            virtual_machines: Vec::new(),
        })
        .collect();

    for node_idx in 0..snapshot.node_count() {
        for vm_idx in 0..snapshot.vm_count() {
            if solution.get_integer_value(vars.at(node_idx, vm_idx)) == 1 {
                let original = snapshot.vm(vm_idx);
                nodes[node_idx].virtual_machines.push(VirtualMachine {
                    node: nodes[node_idx].id.clone(),
                    ..original.clone()
                });
            }
        }
    }

    let maintenance = crate::config::Maintenance {
        nodes: snapshot.maintenance_nodes().map(|n| n.id.to_string()).collect(),
    };

    // Constraints guarantee a total, valid assignment; node-reference failure
    // here would indicate a solver/encoding bug, not bad input.
    Snapshot::build(nodes, &maintenance, snapshot.memory_precision())
        .expect("solver produced an assignment referencing an unknown node")
}
