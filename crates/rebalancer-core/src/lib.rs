//! Rebalancing solver core: cost model, inventory snapshot, constraint and
//! objective builders, and the CP solver driver for balanced VM placement.

pub mod config;
pub mod constraints;
pub mod cost;
pub mod diff;
pub mod error;
pub mod model;
pub mod objective;
pub mod snapshot;
pub mod solver;

pub use config::Config;
pub use error::{RebalancerError, Result};
pub use model::{Node, NodeId, RunState, VirtualMachine, VmId};
pub use snapshot::Snapshot;
pub use solver::{SolveOutcome, SolverDriver};
