//! Small processes shared by the engine's unit tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::datum::Datum;
use crate::error::StepError;
use crate::port::{PortInfo, PortType};
use crate::process::{Process, ProcessDescriptor, StepContext, StepResult};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn number() -> PortType {
    PortType::named("number")
}

/// Emits `0.0, 1.0, ..` on `out`, `count` values in total
pub(crate) struct NumberSource {
    count: u64,
    next: u64,
}

impl NumberSource {
    pub(crate) fn new(count: u64) -> Self {
        Self { count, next: 0 }
    }
}

#[async_trait]
impl Process for NumberSource {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("number-source", "Counts upward")
            .with_output(PortInfo::output("out", number(), "Numbers"))
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        if self.next >= self.count {
            return Ok(StepResult::Complete);
        }
        ctx.push_value("out", self.next as f64).await?;
        self.next += 1;
        Ok(StepResult::Continue)
    }
}

/// Doubles every number from `in` onto `out`
pub(crate) struct Doubler;

#[async_trait]
impl Process for Doubler {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("doubler", "Doubles numbers")
            .with_input(PortInfo::input("in", number(), "Numbers").required())
            .with_output(PortInfo::output("out", number(), "Doubled numbers"))
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        match ctx.grab_value::<f64>("in").await? {
            Some(value) => ctx.push_value("out", *value * 2.0).await?,
            None => ctx.push("out", Datum::empty()).await?,
        }
        Ok(StepResult::Continue)
    }
}

/// Records every number it receives; clones share the record
#[derive(Clone, Default)]
pub(crate) struct CountingSink {
    values: Arc<Mutex<Vec<f64>>>,
}

impl CountingSink {
    pub(crate) fn values(&self) -> Vec<f64> {
        self.values.lock().clone()
    }
}

#[async_trait]
impl Process for CountingSink {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("counting-sink", "Records numbers")
            .with_input(PortInfo::input("in", number(), "Numbers"))
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        let Some(datum) = ctx.grab_optional("in").await? else {
            return Ok(StepResult::Complete);
        };
        if let Some(value) = datum.get::<f64>() {
            self.values.lock().push(*value);
        }
        Ok(StepResult::Continue)
    }
}
