use serde::{Deserialize, Serialize};

/// Resource-local handle for a processing element, unique within its owning resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeId(pub u32);

/// Three-valued status of a processing element.
///
/// The original design encoded this as a boolean (`FREE = true`, everything else
/// `false`), which conflated BUSY and FAILED and made it impossible to tell a
/// temporarily-occupied PE from a permanently-dead one. This is an acknowledged bug
/// in the source design; this implementation always uses the three-valued enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeStatus {
    Free,
    Busy,
    Failed,
}

/// A single processing element (CPU core) with a fixed MIPS rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pe {
    pub pe_id: PeId,
    pub mips_rating: i64,
    pub status: PeStatus,
}

impl Pe {
    pub fn new(pe_id: PeId, mips_rating: i64) -> Self {
        Pe { pe_id, mips_rating, status: PeStatus::Free }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, PeStatus::Free)
    }
}
