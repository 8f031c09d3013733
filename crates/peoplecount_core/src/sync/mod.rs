//! Reference synchronizer.

mod report;
mod synchronizer;

pub use report::{LinkOutcome, LinkReport, UnlinkOutcome, UnlinkReport};
pub use synchronizer::Synchronizer;
