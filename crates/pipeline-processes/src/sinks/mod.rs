//! Sink processes
//!
//! Processes with no outputs that terminate streams.

mod collector;
mod discard;

pub use collector::{Collector, CollectorHandle};
pub use discard::Discard;
