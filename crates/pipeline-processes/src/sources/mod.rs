//! Source processes
//!
//! Processes with no inputs that originate streams.

mod color;
mod number;

pub use color::ColorSource;
pub use number::{NumberSource, NumberSourceConfig};
