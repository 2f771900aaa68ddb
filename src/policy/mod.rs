pub mod allocation;
pub mod ar;

pub use allocation::AllocationCore;
pub use ar::ArPolicy;
