//! Number Source
//!
//! Emits an arithmetic sequence of `f64` values and then ends its stream.

use async_trait::async_trait;
use pipeline_engine::{
    Config, ConfigError, ConfigKey, PortInfo, PortType, Process, ProcessDescriptor, StepContext,
    StepError, StepResult,
};
use serde::{Deserialize, Serialize};

/// Configuration for the number source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberSourceConfig {
    /// First value emitted
    pub start: f64,
    /// Increment between values
    pub step: f64,
    /// Number of values before the stream ends
    pub count: u64,
}

impl Default for NumberSourceConfig {
    fn default() -> Self {
        Self {
            start: 0.0,
            step: 1.0,
            count: 10,
        }
    }
}

impl NumberSourceConfig {
    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            start: config.value("start")?,
            step: config.value("step")?,
            count: config.value("count")?,
        })
    }
}

/// Number Source process
///
/// # Outputs
/// - `number` - `f64` values `start, start + step, ...`
///
/// # Configuration
/// - `start` (default `0`), `step` (default `1`), `count` (default `10`)
#[derive(Debug, Default)]
pub struct NumberSource {
    config: NumberSourceConfig,
    emitted: u64,
}

impl NumberSource {
    /// Port ID for the emitted values
    pub const PORT_NUMBER: &'static str = "number";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &NumberSourceConfig {
        &self.config
    }
}

#[async_trait]
impl Process for NumberSource {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("number-source", "Emits an arithmetic sequence of numbers")
            .with_output(PortInfo::output(
                Self::PORT_NUMBER,
                PortType::named("number"),
                "Generated values",
            ))
            .with_config(ConfigKey::new("start", "float", "0", "First value"))
            .with_config(ConfigKey::new("step", "float", "1", "Increment between values"))
            .with_config(ConfigKey::new("count", "integer", "10", "Number of values to emit"))
    }

    fn configure(&mut self, config: &Config) -> Result<(), ConfigError> {
        self.config = NumberSourceConfig::from_config(config)?;
        Ok(())
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        if self.emitted >= self.config.count {
            log::debug!("NumberSource {}: emitted {} values", ctx.name(), self.emitted);
            return Ok(StepResult::Complete);
        }

        let value = self.config.start + self.config.step * self.emitted as f64;
        ctx.push_value(Self::PORT_NUMBER, value).await?;
        self.emitted += 1;
        Ok(StepResult::Continue)
    }
}
