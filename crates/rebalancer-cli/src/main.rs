//! vm-rebalance: fetches cluster inventory, solves a balanced placement with
//! `rebalancer-core`, and executes the resulting migration plan.
//!
//! Wires: load config -> fetch inventory -> build snapshot -> solve ->
//! diff -> skip-threshold check (spec.md §6) -> migration executor.

mod config;
mod error;
mod executor;
mod hypervisor;

use clap::Parser;
use rebalancer_core::diff::{self, Migration};
use rebalancer_core::snapshot::Snapshot;
use rebalancer_core::solver::{ProgressReport, SolveObserver, SolveOutcome, SolverDriver};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::executor::MigrationExecutor;
use crate::hypervisor::{HypervisorClient, ProxmoxClient};

/// Below this total migration_cost, skip execution entirely (spec.md §6,
/// §9: hard-coded in the driver, not exposed to configuration).
const SKIP_THRESHOLD: u64 = 30_000;

/// Whether a migration plan with this total cost should be skipped rather
/// than executed (spec.md §8, scenario S6).
fn should_skip(total_cost: u64) -> bool {
    total_cost < SKIP_THRESHOLD
}

#[derive(Parser)]
#[command(name = "vm-rebalance")]
#[command(about = "Rebalance VMs across a Proxmox VE cluster", long_about = None)]
struct Cli {
    /// Path to the TOML configuration document
    #[arg(long, default_value = "ars.toml")]
    config: String,

    /// Compute and print the migration plan without executing it
    #[arg(long)]
    dry_run: bool,
}

/// Logs every intermediate solution surfaced by the solver (spec.md §4.5).
struct TracingObserver;
impl SolveObserver for TracingObserver {
    fn on_progress(&mut self, report: ProgressReport) {
        info!(
            elapsed_ms = report.elapsed.as_millis(),
            objective = report.objective_value,
            migration_cost = report.migration_cost,
            "solver progress"
        );
        for (name, cpu_dist, mem_dist) in &report.node_distances {
            info!(node = %name, cpu_dist, mem_dist, "node balance");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vm_rebalance=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = config::load(&cli.config)?;

    if !config.general.verify_ssl {
        warn!("verify_ssl is disabled: TLS certificate verification is off for the hypervisor API");
    }

    let client = ProxmoxClient::connect(&config.general).await?;
    let nodes = client.fetch_inventory().await?;
    let before = Snapshot::build(nodes, &config.maintenance, config.model.memory_precision)
        .map_err(crate::error::CliError::from)?;

    let outcome = SolverDriver::with_observer(&config, TracingObserver).solve(&before)?;
    let after = match outcome {
        SolveOutcome::Optimal(s) => {
            info!("solve completed: optimal");
            s
        }
        SolveOutcome::Feasible(s) => {
            info!("solve completed: feasible (time budget exhausted)");
            s
        }
    };

    let migrations = diff::diff(&before, &after);
    let total_cost = diff::total_migration_cost(&migrations);
    info!(count = migrations.len(), total_cost, "migration plan computed");

    if should_skip(total_cost) {
        info!(total_cost, threshold = SKIP_THRESHOLD, "below skip threshold, nothing to do");
        return Ok(());
    }

    if cli.dry_run {
        for m in &migrations {
            println!("{} -> {} (cost {})", m.vm, m.target_node, m.migration_cost);
        }
        return Ok(());
    }

    let current_node = |m: &Migration| -> rebalancer_core::model::NodeId {
        before
            .vm_index_of(m.vm)
            .map(|idx| before.vm(idx).node.clone())
            .expect("migration plan only references VMs present in the prior snapshot")
    };

    let executor = MigrationExecutor::new(&client, config.migration.max_migrations_per_host);
    executor.execute(current_node, migrations).await?;
    info!("all migrations complete");

    Ok(())
}
