//! Transform processes
//!
//! Processes that read from inputs and write derived values to outputs.

mod blend;
mod scale;

pub use blend::{Blend, BlendConfig, BlendMode};
pub use scale::Scale;
