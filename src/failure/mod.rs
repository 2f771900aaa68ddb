pub mod injector;
pub mod trace;

pub use injector::FailureInjector;
pub use trace::{read_trace, FailureEvent, TraceConfig};
