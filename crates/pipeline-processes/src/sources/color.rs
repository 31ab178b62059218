//! Color Source
//!
//! Emits an endless stream of empty datums, one per unit of downstream
//! demand. Its only purpose is to give every consumer a fresh, ordered stamp
//! on each step, so it acts as a clock for branches that have no data
//! source of their own.

use async_trait::async_trait;
use pipeline_engine::{
    Datum, Demand, PortInfo, PortType, Process, ProcessDescriptor, StepContext, StepError,
    StepResult,
};

/// Color Source process
///
/// # Outputs
/// - `color` (required, no payload) - empty datums carrying consecutive stamps
///
/// The source completes once every receiver has finished.
#[derive(Debug, Default)]
pub struct ColorSource {
    emitted: u64,
}

impl ColorSource {
    /// Port ID for the stamp stream
    pub const PORT_COLOR: &'static str = "color";

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of datums emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

#[async_trait]
impl Process for ColorSource {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("color-source", "Emits empty datums with consecutive stamps")
            .with_output(
                PortInfo::output(Self::PORT_COLOR, PortType::none(), "Stamp stream").required(),
            )
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        match ctx.wait_for_demand().await {
            Demand::Exhausted => {
                log::debug!("ColorSource {}: receivers finished", ctx.name());
                Ok(StepResult::Complete)
            }
            Demand::Ready => {
                ctx.push(Self::PORT_COLOR, Datum::empty()).await?;
                self.emitted += 1;
                Ok(StepResult::Continue)
            }
        }
    }
}
