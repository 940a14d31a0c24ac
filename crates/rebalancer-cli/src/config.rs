//! Disk-backed config loading. Parsing itself (`Config::from_str`) lives in
//! `rebalancer-core`; this is just the `std::fs::read_to_string` wrapper.

use std::path::Path;

use rebalancer_core::Config;

use crate::error::{CliError, Result};

pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let doc = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    Config::from_str(&doc).map_err(CliError::from)
}
