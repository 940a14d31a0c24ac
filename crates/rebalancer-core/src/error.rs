//! Error types for the rebalancing solver

use thiserror::Error;

/// Core result type
pub type Result<T> = std::result::Result<T, RebalancerError>;

/// Errors that can occur while building or solving a rebalance model
#[derive(Error, Debug)]
pub enum RebalancerError {
    /// Malformed configuration document or unknown enum value
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Inventory provider failed or referenced inconsistent ids
    #[error("inventory error: {0}")]
    InventoryError(String),

    /// The solver proved no placement exists
    #[error("model is infeasible: no placement satisfies the hard constraints")]
    ModelInfeasible,

    /// Solver returned without a feasible solution within the time budget
    #[error("solver returned an unknown/invalid result within the time budget")]
    ModelUnknown,
}

impl RebalancerError {
    /// Build a `ConfigInvalid` error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    /// Build an `InventoryError`
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::InventoryError(msg.into())
    }
}
