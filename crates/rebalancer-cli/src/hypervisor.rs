//! Hypervisor Client (§4.8): inventory fetch + migration RPCs against a
//! Proxmox VE cluster, grounded directly in
//! `original_source/connections/pve.py::fetch_current_state` /
//! `realize_migrations`.

use std::future::Future;
use std::time::Duration;

use rebalancer_core::config::General;
use rebalancer_core::model::{Node, NodeId, RunState, VirtualMachine, VmId};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{CliError, Result};

/// A Proxmox task UPID, used to poll migration progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId(pub String);

/// Status of an in-flight or completed task, as reported by
/// `/nodes/{node}/tasks/{upid}/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Ok,
    Failed(String),
}

/// Abstract collaborator per spec.md §6 ("Inventory provider", "Migration
/// executor" RPC half). The core never depends on this; only the CLI does.
pub trait HypervisorClient: Send + Sync {
    /// Fetch the current cluster inventory as raw nodes (pre-[`Snapshot`]).
    ///
    /// [`Snapshot`]: rebalancer_core::Snapshot
    fn fetch_inventory(&self) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// Request a live migration of `vm` from `from` to `to`.
    fn migrate(&self, vm: VmId, from: &NodeId, to: &NodeId) -> impl Future<Output = Result<TaskId>> + Send;

    /// Poll the status of a previously-issued migration task.
    fn poll_task(&self, node: &NodeId, task: &TaskId) -> impl Future<Output = Result<TaskStatus>> + Send;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    node: String,
    mem: u64,
    maxmem: u64,
    maxcpu: u32,
}

#[derive(Debug, Deserialize)]
struct RawVm {
    vmid: u32,
    name: String,
    status: String,
    #[serde(default)]
    lock: Option<String>,
    maxmem: u64,
    cpus: f64,
}

#[derive(Debug, Deserialize)]
struct RawRrdSample {
    time: i64,
    #[serde(default)]
    cpu: Option<f64>,
    #[serde(default)]
    mem: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTaskStatus {
    status: String,
    #[serde(default)]
    exitstatus: Option<String>,
}

/// Concrete `HypervisorClient` backed by the Proxmox VE REST API.
pub struct ProxmoxClient {
    http: Client,
    base_url: String,
    auth_cookie: String,
    csrf_token: String,
}

impl ProxmoxClient {
    /// Authenticate against `general.host` and return a ready client.
    pub async fn connect(general: &General) -> Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!general.verify_ssl)
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url = format!("https://{}:8006/api2/json", general.host);

        #[derive(Deserialize)]
        struct TicketData {
            ticket: String,
            #[serde(rename = "CSRFPreventionToken")]
            csrf_prevention_token: String,
        }

        let response: Envelope<TicketData> = http
            .post(format!("{base_url}/access/ticket"))
            .form(&[("username", general.user.as_str()), ("password", general.password.as_str())])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CliError::api(format!("authentication failed: {e}")))?
            .json()
            .await?;

        Ok(Self {
            http,
            base_url,
            auth_cookie: response.data.ticket,
            csrf_token: response.data.csrf_prevention_token,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header("Cookie", format!("PVEAuthCookie={}", self.auth_cookie))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .header("Cookie", format!("PVEAuthCookie={}", self.auth_cookie))
            .header("CSRFPreventionToken", self.csrf_token.clone())
    }

    /// Most recent RRD sample (reverse-chronological scan, per the Python)
    /// carrying both `cpu` and `mem`.
    async fn latest_rrd_sample(&self, node: &str, vmid: u32) -> Result<(f64, u64)> {
        let path = format!("/nodes/{node}/qemu/{vmid}/rrddata?timeframe=hour&cf=MAX");
        let mut samples: Envelope<Vec<RawRrdSample>> = self.get(&path).send().await?.json().await?;
        samples.data.sort_by_key(|s| std::cmp::Reverse(s.time));

        for sample in &samples.data {
            if let (Some(cpu), Some(mem)) = (sample.cpu, sample.mem) {
                return Ok((cpu, mem.ceil() as u64));
            }
        }
        Ok((0.0, 0))
    }
}

impl HypervisorClient for ProxmoxClient {
    async fn fetch_inventory(&self) -> Result<Vec<Node>> {
        let nodes: Envelope<Vec<RawNode>> = self.get("/nodes").send().await?.json().await?;
        let mut raw_nodes = nodes.data;
        raw_nodes.sort_by(|a, b| a.node.cmp(&b.node));

        let mut result = Vec::with_capacity(raw_nodes.len());
        for raw in raw_nodes {
            let qemu_response = self.get(&format!("/nodes/{}/qemu?full=1", raw.node)).send().await;
            let vms_json: Envelope<Vec<RawVm>> = match qemu_response {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.json().await {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            warn!(node = %raw.node, error = %e, "skipping node: malformed qemu listing");
                            continue;
                        }
                    },
                    Err(e) => {
                        warn!(node = %raw.node, error = %e, "skipping unreachable node");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(node = %raw.node, error = %e, "skipping unreachable node");
                    continue;
                }
            };

            let mut raw_vms = vms_json.data;
            raw_vms.sort_by_key(|v| v.vmid);

            let mut virtual_machines = Vec::with_capacity(raw_vms.len());
            for vm in raw_vms {
                let state = RunState::from_hypervisor_str(&vm.status);
                let (cpu_used, memory_used) = if state.is_running() {
                    self.latest_rrd_sample(&raw.node, vm.vmid).await?
                } else {
                    (0.0, 0)
                };

                virtual_machines.push(VirtualMachine {
                    id: VmId(vm.vmid),
                    name: vm.name,
                    state,
                    locked: vm.lock.is_some(),
                    node: NodeId::new(raw.node.clone()),
                    memory_used,
                    memory_max: vm.maxmem,
                    cpu_used,
                    cpu_max: vm.cpus,
                });
            }

            result.push(Node {
                id: NodeId::new(raw.node),
                memory_total: raw.maxmem,
                memory_used: raw.mem,
                num_cpu: raw.maxcpu,
                virtual_machines,
            });
        }

        Ok(result)
    }

    async fn migrate(&self, vm: VmId, from: &NodeId, to: &NodeId) -> Result<TaskId> {
        let path = format!("/nodes/{from}/qemu/{vm}/migrate");
        let response: Envelope<Value> = self
            .post(&path)
            .form(&[("target", to.0.as_str()), ("online", "1"), ("with-local-disks", "1")])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CliError::api(format!("migrate {vm} from {from} to {to} failed: {e}")))?
            .json()
            .await?;

        let upid = response
            .data
            .as_str()
            .ok_or_else(|| CliError::api("migrate response did not contain an UPID"))?;
        Ok(TaskId(upid.to_string()))
    }

    async fn poll_task(&self, node: &NodeId, task: &TaskId) -> Result<TaskStatus> {
        let path = format!("/nodes/{node}/tasks/{}/status", task.0);
        let response: Envelope<RawTaskStatus> = self.get(&path).send().await?.json().await?;

        Ok(match response.data.status.as_str() {
            "running" => TaskStatus::Running,
            _ => match response.data.exitstatus.as_deref() {
                Some("OK") => TaskStatus::Ok,
                Some(other) => TaskStatus::Failed(other.to_string()),
                None => TaskStatus::Failed("task stopped without an exit status".to_string()),
            },
        })
    }
}
