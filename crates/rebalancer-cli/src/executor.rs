//! Migration Executor (§4.9): throttles concurrent migrations to at most
//! `migration.max_migrations_per_host` per node (counting a node as busy
//! whether it is a migration's source or destination), retries a failed
//! move once, and reports progress via `tracing`.
//!
//! Directly modeled on `original_source/connections/pve.py`'s
//! `realize_migrations`/`wait_for_tasks`: scan the remaining migrations for
//! one whose source and destination are both under the per-host limit,
//! launch it, and poll outstanding tasks until one frees up a slot.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use rebalancer_core::diff::Migration;
use rebalancer_core::model::{NodeId, VmId};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::hypervisor::{HypervisorClient, TaskId, TaskStatus};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

struct InFlight {
    migration: Migration,
    source: NodeId,
}

/// Drives a [`Migration`] plan to completion against a [`HypervisorClient`].
pub struct MigrationExecutor<'a, H: HypervisorClient> {
    client: &'a H,
    max_migrations_per_host: u32,
}

impl<'a, H: HypervisorClient> MigrationExecutor<'a, H> {
    pub fn new(client: &'a H, max_migrations_per_host: u32) -> Self {
        Self { client, max_migrations_per_host }
    }

    /// Execute every migration in `plan`, blocking until all have finished
    /// (successfully or, after one retry, with a logged failure).
    pub async fn execute(&self, current_node: impl Fn(&Migration) -> NodeId, mut plan: Vec<Migration>) -> Result<()> {
        let mut load: HashMap<NodeId, u32> = HashMap::new();
        let mut running: HashMap<TaskId, InFlight> = HashMap::new();
        let mut retried_vms: HashSet<VmId> = HashSet::new();

        while !plan.is_empty() {
            let mut launched_index = None;

            for (idx, migration) in plan.iter().enumerate() {
                let source = current_node(migration);
                let dest = migration.target_node.clone();

                if *load.get(&source).unwrap_or(&0) >= self.max_migrations_per_host {
                    debug!(vm = %migration.vm, node = %source, "postponing: source node busy");
                    continue;
                }
                if *load.get(&dest).unwrap_or(&0) >= self.max_migrations_per_host {
                    debug!(vm = %migration.vm, node = %dest, "postponing: destination node busy");
                    continue;
                }

                info!(vm = %migration.vm, from = %source, to = %dest, "migrating");
                let task = self.client.migrate(migration.vm, &source, &dest).await?;

                *load.entry(source.clone()).or_insert(0) += 1;
                *load.entry(dest.clone()).or_insert(0) += 1;
                running.insert(task, InFlight { migration: migration.clone(), source });

                launched_index = Some(idx);
                break;
            }

            match launched_index {
                Some(idx) => {
                    plan.remove(idx);
                }
                None => {
                    self.wait_for_one_task(&mut running, &mut load, &mut plan, &mut retried_vms).await?;
                }
            }
        }

        while !running.is_empty() {
            self.wait_for_one_task(&mut running, &mut load, &mut plan, &mut retried_vms).await?;
        }

        Ok(())
    }

    /// Poll every outstanding task concurrently; on the first one that has
    /// finished, free its slots and either requeue (on failure, once) or
    /// drop it, then return. Mirrors the Python's "exit after a task
    /// terminates" loop, but polls the whole batch in one round-trip each
    /// tick instead of one task at a time.
    async fn wait_for_one_task(
        &self,
        running: &mut HashMap<TaskId, InFlight>,
        load: &mut HashMap<NodeId, u32>,
        plan: &mut Vec<Migration>,
        retried_vms: &mut HashSet<VmId>,
    ) -> Result<()> {
        loop {
            let polls = running.iter().map(|(task, in_flight)| {
                let task = task.clone();
                async move {
                    let status = self.client.poll_task(&in_flight.source, &task).await;
                    (task, status)
                }
            });
            let polled: Vec<(TaskId, Result<TaskStatus>)> = join_all(polls).await;

            let mut finished: Option<(TaskId, TaskStatus)> = None;
            for (task, status) in polled {
                let status = status?;
                if !matches!(status, TaskStatus::Running) {
                    finished = Some((task, status));
                    break;
                }
            }

            if let Some((task, status)) = finished {
                let in_flight = running.remove(&task).expect("task key just observed in map");
                *load.get_mut(&in_flight.source).expect("load entry set at launch") -= 1;
                *load.get_mut(&in_flight.migration.target_node).expect("load entry set at launch") -= 1;

                match status {
                    TaskStatus::Ok => {}
                    TaskStatus::Failed(reason) => {
                        warn!(vm = %in_flight.migration.vm, %reason, "migration task failed");
                        if retried_vms.insert(in_flight.migration.vm) {
                            info!(vm = %in_flight.migration.vm, "retrying failed migration");
                            plan.push(in_flight.migration);
                        } else {
                            warn!(vm = %in_flight.migration.vm, "migration failed twice, giving up");
                        }
                    }
                    TaskStatus::Running => unreachable!("filtered above"),
                }
                return Ok(());
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Hand-built fake: every migration succeeds on its first poll, except
    /// `fail_once_for` which fails once then succeeds on retry.
    struct FakeClient {
        next_task: Mutex<u64>,
        fail_once_for: Option<VmId>,
        failed_already: Mutex<HashSet<VmId>>,
        log: Mutex<Vec<(VmId, NodeId, NodeId)>>,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                next_task: Mutex::new(0),
                fail_once_for: None,
                failed_already: Mutex::new(HashSet::new()),
                log: Mutex::new(Vec::new()),
            }
        }

        fn failing_once_for(vm: VmId) -> Self {
            Self { fail_once_for: Some(vm), ..Self::new() }
        }
    }

    impl HypervisorClient for FakeClient {
        async fn migrate(&self, vm: VmId, from: &NodeId, to: &NodeId) -> Result<TaskId> {
            self.log.lock().unwrap().push((vm, from.clone(), to.clone()));
            let mut next = self.next_task.lock().unwrap();
            let id = *next;
            *next += 1;
            Ok(TaskId(format!("task-{id}")))
        }

        async fn poll_task(&self, _node: &NodeId, task: &TaskId) -> Result<TaskStatus> {
            if let Some(vm) = self.fail_once_for {
                let log = self.log.lock().unwrap();
                let this_task_vm = log
                    .iter()
                    .enumerate()
                    .find(|(i, _)| format!("task-{i}") == task.0)
                    .map(|(_, (vm, _, _))| *vm);
                drop(log);

                if this_task_vm == Some(vm) && self.failed_already.lock().unwrap().insert(vm) {
                    return Ok(TaskStatus::Failed("simulated failure".into()));
                }
            }
            Ok(TaskStatus::Ok)
        }

        async fn fetch_inventory(&self) -> Result<Vec<rebalancer_core::model::Node>> {
            unimplemented!("not exercised by executor tests")
        }
    }

    fn migration(vm: u32, from: &str, to: &str) -> (Migration, NodeId) {
        (
            Migration { vm: VmId(vm), target_node: NodeId::new(to), migration_cost: 10 },
            NodeId::new(from),
        )
    }

    #[tokio::test]
    async fn drains_every_migration_under_throttle() {
        let client = FakeClient::new();
        let executor = MigrationExecutor::new(&client, 1);

        let pairs = vec![migration(1, "a", "b"), migration(2, "a", "c"), migration(3, "b", "c")];
        let sources: HashMap<VmId, NodeId> = pairs.iter().map(|(m, src)| (m.vm, src.clone())).collect();
        let plan: Vec<Migration> = pairs.into_iter().map(|(m, _)| m).collect();

        executor
            .execute(|m| sources.get(&m.vm).cloned().unwrap(), plan)
            .await
            .unwrap();

        assert_eq!(client.log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retries_a_failed_migration_once_then_gives_up_on_second_failure() {
        let client = FakeClient::failing_once_for(VmId(1));
        let executor = MigrationExecutor::new(&client, 2);

        let plan = vec![Migration { vm: VmId(1), target_node: NodeId::new("b"), migration_cost: 5 }];
        executor.execute(|_| NodeId::new("a"), plan).await.unwrap();

        // one failed attempt + one successful retry
        assert_eq!(client.log.lock().unwrap().len(), 2);
    }
}
