use serde::{Deserialize, Serialize};

use crate::resource::machine::{Machine, MachineId};

/// Scheduling discipline advertised by a resource. `AdvanceReservation` implies the
/// resource also accepts every non-AR verb (AR policies are a superset, per §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationModel {
    TimeShared,
    SpaceShared,
    AdvanceReservation,
}

/// Static capability description of a resource: its machines, scheduling discipline,
/// and billing/locality metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceCharacteristics {
    pub machines: Vec<Machine>,
    pub allocation_model: AllocationModel,
    pub cost_per_sec: f64,
    /// Hours offset from UTC, in `[-12, 12]`.
    pub resource_time_zone: i8,
}

impl ResourceCharacteristics {
    pub fn total_pe_count(&self) -> u32 {
        self.machines.iter().map(Machine::total_pe_count).sum()
    }

    pub fn free_pe_count(&self) -> u32 {
        self.machines.iter().map(Machine::free_pe_count).sum()
    }

    pub fn machine_mut(&mut self, id: MachineId) -> Option<&mut Machine> {
        self.machines.iter_mut().find(|m| m.machine_id == id)
    }

    pub fn all_failed(&self) -> bool {
        !self.machines.is_empty() && self.machines.iter().all(Machine::is_failed)
    }
}
