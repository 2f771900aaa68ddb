pub mod accumulator;
pub mod sink;

pub use accumulator::Accumulator;
pub use sink::{StatEntry, StatisticsSink};
