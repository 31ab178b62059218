//! Scale Transform
//!
//! Multiplies each incoming number by a factor. The factor comes from
//! configuration unless the optional `factor` input is connected, in which
//! case each step uses the value received there.

use async_trait::async_trait;
use pipeline_engine::{
    Config, ConfigError, ConfigKey, Datum, PortInfo, PortType, Process, ProcessDescriptor,
    StepContext, StepError, StepResult,
};

/// Scale process
///
/// # Inputs
/// - `number` (required) - `f64` values
/// - `factor` (optional) - per-step `f64` factor overriding the configured one
///
/// # Outputs
/// - `number` - scaled values; control datums are forwarded unchanged
#[derive(Debug, Clone)]
pub struct Scale {
    factor: f64,
}

impl Default for Scale {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl Scale {
    /// Port ID for values in and out
    pub const PORT_NUMBER: &'static str = "number";
    /// Port ID for the optional factor stream
    pub const PORT_FACTOR: &'static str = "factor";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    async fn current_factor(&self, ctx: &mut StepContext) -> Result<f64, StepError> {
        let factor = match ctx.grab_optional(Self::PORT_FACTOR).await? {
            Some(datum) => datum.get::<f64>().copied(),
            None => None,
        };
        Ok(factor.unwrap_or(self.factor))
    }
}

#[async_trait]
impl Process for Scale {
    fn descriptor(&self) -> ProcessDescriptor {
        let number = PortType::named("number");
        ProcessDescriptor::new("scale", "Multiplies numbers by a factor")
            .with_input(PortInfo::input(Self::PORT_NUMBER, number.clone(), "Values").required())
            .with_input(PortInfo::input(Self::PORT_FACTOR, number.clone(), "Factor override"))
            .with_output(PortInfo::output(Self::PORT_NUMBER, number, "Scaled values"))
            .with_config(ConfigKey::new("factor", "float", "1", "Multiplier"))
    }

    fn configure(&mut self, config: &Config) -> Result<(), ConfigError> {
        let factor: f64 = config.value("factor")?;
        if !factor.is_finite() {
            return Err(ConfigError::invalid_value("factor", factor.to_string(), "must be finite"));
        }
        self.factor = factor;
        Ok(())
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        let datum = ctx.grab(Self::PORT_NUMBER).await?;
        let factor = self.current_factor(ctx).await?;

        let out = if datum.is_value() {
            let value = datum.get::<f64>().ok_or_else(|| StepError::PayloadType {
                port: Self::PORT_NUMBER.to_string(),
                expected: "f64",
            })?;
            Datum::new(value * factor)
        } else {
            datum
        };
        ctx.push(Self::PORT_NUMBER, out).await?;
        Ok(StepResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let meta = Scale::new().descriptor();
        assert_eq!(meta.process_type, "scale");
        assert!(meta.input_port(Scale::PORT_NUMBER).unwrap().is_required());
        assert!(!meta.input_port(Scale::PORT_FACTOR).unwrap().is_required());
        assert!(meta.output_port(Scale::PORT_NUMBER).is_some());
    }

    #[test]
    fn test_configure() {
        let mut scale = Scale::new();
        scale.configure(&Config::new().with("factor", "2.5")).unwrap();
        assert_eq!(scale.factor(), 2.5);

        assert!(scale.configure(&Config::new().with("factor", "inf")).is_err());
        assert!(scale.configure(&Config::new().with("factor", "lots")).is_err());
    }
}
