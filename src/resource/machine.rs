use serde::{Deserialize, Serialize};

use crate::resource::pe::{Pe, PeId, PeStatus};

/// Resource-local handle for a machine (a bag of PEs sharing memory, and the unit
/// of failure for the failure injector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineId(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: MachineId,
    pub pes: Vec<Pe>,
}

impl Machine {
    /// Builds a machine with `pe_count` PEs, numbering them `pe_id_start..pe_id_start+pe_count`
    /// so PE ids stay unique across all machines of the owning resource.
    pub fn new(machine_id: MachineId, pe_count: u32, mips_rating: i64, pe_id_start: u32) -> Self {
        let pes = (0..pe_count).map(|i| Pe::new(PeId(pe_id_start + i), mips_rating)).collect();
        Machine { machine_id, pes }
    }

    pub fn total_pe_count(&self) -> u32 {
        self.pes.len() as u32
    }

    /// The MIPS rating shared by every PE in this machine, or 0 for an empty machine.
    pub fn mips_rating(&self) -> i64 {
        self.pes.first().map(|pe| pe.mips_rating).unwrap_or(0)
    }

    pub fn free_pe_count(&self) -> u32 {
        self.pes.iter().filter(|pe| pe.is_available()).count() as u32
    }

    /// A machine is FAILED iff every one of its PEs is FAILED.
    pub fn is_failed(&self) -> bool {
        !self.pes.is_empty() && self.pes.iter().all(|pe| pe.status == PeStatus::Failed)
    }

    pub fn set_all_pes(&mut self, status: PeStatus) {
        for pe in &mut self.pes {
            pe.status = status;
        }
    }

    /// Allocates up to `count` free PEs to a running job, marking them BUSY.
    ///
    /// # Returns
    /// The ids of the PEs actually allocated; shorter than `count` if the machine did
    /// not have enough free capacity.
    pub fn allocate(&mut self, count: u32) -> Vec<PeId> {
        let mut allocated = Vec::with_capacity(count as usize);
        for pe in &mut self.pes {
            if allocated.len() as u32 >= count {
                break;
            }
            if pe.is_available() {
                pe.status = PeStatus::Busy;
                allocated.push(pe.pe_id);
            }
        }
        allocated
    }

    pub fn release(&mut self, pe_ids: &[PeId]) {
        for pe in &mut self.pes {
            if pe_ids.contains(&pe.pe_id) && pe.status == PeStatus::Busy {
                pe.status = PeStatus::Free;
            }
        }
    }
}
