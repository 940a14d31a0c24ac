//! Configuration model (component G)
//!
//! Mirrors the TOML schema of `original_source/config.py`. Parsing is pure
//! (`Config::from_str`); reading the file from disk is the CLI's job.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{RebalancerError, Result};
use crate::model::{NodeId, VmId};

fn default_true() -> bool {
    true
}

fn default_memory_precision() -> u64 {
    1024 * 1024
}

fn default_max_time_in_seconds() -> u64 {
    10
}

fn default_num_search_workers() -> u32 {
    1
}

fn default_max_migrations_per_host() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct General {
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_memory_precision")]
    pub memory_precision: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            memory_precision: default_memory_precision(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_max_time_in_seconds")]
    pub max_time_in_seconds: u64,
    #[serde(default = "default_num_search_workers")]
    pub num_search_workers: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_time_in_seconds: default_max_time_in_seconds(),
            num_search_workers: default_num_search_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_max_migrations_per_host")]
    pub max_migrations_per_host: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_migrations_per_host: default_max_migrations_per_host(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Maintenance {
    #[serde(default)]
    pub nodes: HashSet<String>,
}

impl Maintenance {
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains(&id.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vm2VmAffinityType {
    KeepTogether,
    KeepApart,
}

impl Default for Vm2VmAffinityType {
    fn default() -> Self {
        Vm2VmAffinityType::KeepApart
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vm2HostAffinityType {
    RunHere,
    RunElsewhere,
}

impl Default for Vm2HostAffinityType {
    fn default() -> Self {
        Vm2HostAffinityType::RunHere
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm2VmAffinityRule {
    pub name: Option<String>,
    pub comment: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub type_: Vm2VmAffinityType,
    #[serde(rename = "vms", default)]
    pub virtual_machines: HashSet<u32>,
}

impl Vm2VmAffinityRule {
    pub fn vm_ids(&self) -> impl Iterator<Item = VmId> + '_ {
        self.virtual_machines.iter().map(|id| VmId(*id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm2HostAffinityRule {
    pub name: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub nodes: HashSet<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub type_: Vm2HostAffinityType,
    #[serde(rename = "vms", default)]
    pub virtual_machines: HashSet<u32>,
}

impl Vm2HostAffinityRule {
    pub fn vm_ids(&self) -> impl Iterator<Item = VmId> + '_ {
        self.virtual_machines.iter().map(|id| VmId(*id))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| NodeId::new(n.clone()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffinityRules {
    #[serde(rename = "vm-to-vm", default)]
    pub vm_to_vm: Vec<Vm2VmAffinityRule>,
    #[serde(rename = "vm-to-host", default)]
    pub vm_to_host: Vec<Vm2HostAffinityRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: General,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub maintenance: Maintenance,
    #[serde(rename = "affinity-rules", default)]
    pub affinity_rules: AffinityRules,
}

impl Config {
    /// Parse a TOML document into a `Config`. Pure — no I/O.
    pub fn from_str(doc: &str) -> Result<Self> {
        toml::from_str(doc).map_err(|e| RebalancerError::config(e.to_string()))
    }
}
