//! Error types for the CLI: everything the core doesn't already cover
//! (disk I/O, HTTP, JSON) plus a pass-through for `RebalancerError`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Rebalancer(#[from] rebalancer_core::RebalancerError),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hypervisor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("hypervisor returned malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hypervisor API error: {0}")]
    Api(String),
}

impl CliError {
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }
}
