pub mod policy;
pub mod reply;
pub mod timeline;

pub use policy::ArPolicy;
pub use reply::{ArCreateResult, ArQueryResult, ArSimpleResult, TimeSlot};
pub use timeline::{ArTimeline, Reservation, ReservationId, ReservationStatus};
