//! Discard Sink

use async_trait::async_trait;
use pipeline_engine::{
    PortInfo, PortType, Process, ProcessDescriptor, StepContext, StepError, StepResult,
};

/// Consumes and drops everything on its `input` port
#[derive(Debug, Clone, Default)]
pub struct Discard {
    discarded: u64,
}

impl Discard {
    pub const PORT_INPUT: &'static str = "input";

    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Process for Discard {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("discard", "Drops all received data").with_input(
            PortInfo::input(Self::PORT_INPUT, PortType::any(), "Data to drop").required(),
        )
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        if !ctx.grab(Self::PORT_INPUT).await?.is_complete() {
            self.discarded += 1;
        }
        Ok(StepResult::Continue)
    }

    fn on_complete(&mut self) {
        log::debug!("Discard dropped {} datums", self.discarded);
    }
}
