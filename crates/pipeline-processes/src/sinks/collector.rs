//! Collector Sink
//!
//! Records every datum it receives, with its stamp, into a shared buffer the
//! caller keeps a handle to. Mostly useful for inspecting a pipeline's output
//! after a run.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_engine::{
    Config, ConfigError, ConfigKey, Datum, PortInfo, PortType, Process, ProcessDescriptor, Stamp,
    StepContext, StepError, StepResult,
};

#[derive(Debug, Default)]
struct Collected {
    items: Vec<(Datum, Stamp)>,
    complete: bool,
}

/// Read side of a [`Collector`], cheap to clone
#[derive(Debug, Clone, Default)]
pub struct CollectorHandle {
    inner: Arc<Mutex<Collected>>,
}

impl CollectorHandle {
    /// Number of datums recorded, markers included
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Every recorded datum in arrival order
    pub fn datums(&self) -> Vec<Datum> {
        self.inner.lock().items.iter().map(|(d, _)| d.clone()).collect()
    }

    /// Recorded payloads of type `T`, skipping markers and other types
    pub fn values<T: Any + Clone>(&self) -> Vec<T> {
        self.inner
            .lock()
            .items
            .iter()
            .filter_map(|(datum, _)| datum.get::<T>().cloned())
            .collect()
    }

    pub fn stamps(&self) -> Vec<Stamp> {
        self.inner.lock().items.iter().map(|(_, s)| *s).collect()
    }

    /// Whether the collector has finished
    pub fn is_complete(&self) -> bool {
        self.inner.lock().complete
    }
}

/// Collector process
///
/// # Inputs
/// - `value` (required) - any type
///
/// # Configuration
/// - `limit` - complete after this many datums (`0` for no limit)
#[derive(Debug, Default)]
pub struct Collector {
    handle: CollectorHandle,
    limit: usize,
}

impl Collector {
    pub const PORT_VALUE: &'static str = "value";

    pub fn new() -> Self {
        Self::default()
    }

    /// A collector together with a handle onto what it records
    pub fn with_handle() -> (Self, CollectorHandle) {
        let collector = Self::new();
        let handle = collector.handle();
        (collector, handle)
    }

    pub fn handle(&self) -> CollectorHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Process for Collector {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("collector", "Records received data for inspection")
            .with_input(
                PortInfo::input(Self::PORT_VALUE, PortType::any(), "Data to record").required(),
            )
            .with_config(ConfigKey::new(
                "limit",
                "integer",
                "0",
                "Complete after this many datums (0 = unlimited)",
            ))
    }

    fn configure(&mut self, config: &Config) -> Result<(), ConfigError> {
        self.limit = config.value("limit")?;
        Ok(())
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        let item = ctx.grab_with_stamp(Self::PORT_VALUE).await?;
        if item.datum.is_complete() {
            return Ok(StepResult::Complete);
        }

        let count = {
            let mut inner = self.handle.inner.lock();
            inner.items.push((item.datum, item.stamp));
            inner.items.len()
        };
        if self.limit > 0 && count >= self.limit {
            log::debug!("Collector {}: limit of {} reached", ctx.name(), self.limit);
            return Ok(StepResult::Complete);
        }
        Ok(StepResult::Continue)
    }

    fn on_complete(&mut self) {
        self.handle.inner.lock().complete = true;
    }
}
