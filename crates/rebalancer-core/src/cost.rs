//! Cost Model (component A)
//!
//! Pure functions of a [`VirtualMachine`]'s observed state. All outputs are
//! non-negative integers so the rest of the solver stays in the integer
//! domain. Observed metrics for stopped VMs are meaningless, so a fixed
//! fraction of configured capacity is used as a proxy instead — this keeps
//! stopped VMs weighing in placement and migration decisions rather than
//! being parked arbitrarily.

use crate::model::VirtualMachine;

/// Memory cost used by the objective (not the capacity constraint, which
/// uses raw `memory_used` — see [`crate::constraints`]).
pub fn memory_cost(vm: &VirtualMachine) -> u64 {
    if vm.state.is_running() {
        vm.memory_used
    } else {
        vm.memory_max / 10
    }
}

/// Integer CPU cost in hundredths of a core (0..=num_cores*100).
pub fn cpu_cost(vm: &VirtualMachine) -> u64 {
    if vm.state.is_running() {
        (vm.cpu_used * 100.0).ceil() as u64
    } else {
        0
    }
}

/// Migration cost, in MiB. Distinct from [`memory_cost`] so stopped VMs
/// still carry a deterministic tie-breaking weight in the objective.
pub fn migration_cost(vm: &VirtualMachine) -> u64 {
    const MIB: u64 = 1024 * 1024;
    if vm.state.is_running() {
        vm.memory_used / MIB
    } else {
        vm.memory_max / MIB / 10
    }
}
