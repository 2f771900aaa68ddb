pub mod calendar;
pub mod characteristics;
pub mod machine;
pub mod pe;

pub use calendar::ResourceCalendar;
pub use characteristics::{AllocationModel, ResourceCharacteristics};
pub use machine::{Machine, MachineId};
pub use pe::{Pe, PeId, PeStatus};
