//! Blend Transform
//!
//! Combines two number streams item by item. The two inputs are aligned by
//! stamp: when one branch runs ahead of the other, the older datum on the
//! lagging side is dropped until both heads carry the same stamp.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use pipeline_engine::{
    Config, ConfigError, ConfigKey, Datum, PortInfo, PortType, Process, ProcessDescriptor,
    StampOrdering, StepContext, StepError, StepResult,
};
use serde::{Deserialize, Serialize};

/// How two values are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// `left * left_alpha + right * right_alpha`
    #[default]
    Linear,
    /// Larger of the two values
    Max,
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "max" => Ok(Self::Max),
            other => Err(format!("unknown blend mode '{}', expected linear or max", other)),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("linear"),
            Self::Max => f.write_str("max"),
        }
    }
}

/// Configuration for the blend transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendConfig {
    pub mode: BlendMode,
    /// Contribution of the left value in linear mode (0-1)
    pub left_alpha: f64,
    /// Contribution of the right value in linear mode (0-1)
    pub right_alpha: f64,
    /// Applied to the left value before blending
    pub left_mult: f64,
    /// Applied to the right value before blending
    pub right_mult: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            mode: BlendMode::Linear,
            left_alpha: 0.5,
            right_alpha: 0.5,
            left_mult: 1.0,
            right_mult: 1.0,
        }
    }
}

impl BlendConfig {
    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let parsed = Self {
            mode: config.value("mode")?,
            left_alpha: config.value("left_alpha")?,
            right_alpha: config.value("right_alpha")?,
            left_mult: config.value("left_mult")?,
            right_mult: config.value("right_mult")?,
        };
        for (key, alpha) in [("left_alpha", parsed.left_alpha), ("right_alpha", parsed.right_alpha)] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(ConfigError::invalid_value(key, alpha.to_string(), "must be within 0-1"));
            }
        }
        for (key, mult) in [("left_mult", parsed.left_mult), ("right_mult", parsed.right_mult)] {
            if !mult.is_finite() {
                return Err(ConfigError::invalid_value(key, mult.to_string(), "must be finite"));
            }
        }
        Ok(parsed)
    }

    pub fn blend(&self, left: f64, right: f64) -> f64 {
        let (left, right) = (left * self.left_mult, right * self.right_mult);
        match self.mode {
            BlendMode::Linear => left * self.left_alpha + right * self.right_alpha,
            BlendMode::Max => left.max(right),
        }
    }
}

/// Blend process
///
/// # Inputs
/// - `left` (required) - `f64` values
/// - `right` (required) - `f64` values from the same stamp lineage
///
/// # Outputs
/// - `blended` - combined values; an empty datum when either side had none
#[derive(Debug, Default)]
pub struct Blend {
    config: BlendConfig,
    dropped: u64,
}

impl Blend {
    pub const PORT_LEFT: &'static str = "left";
    pub const PORT_RIGHT: &'static str = "right";
    pub const PORT_BLENDED: &'static str = "blended";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &BlendConfig {
        &self.config
    }

    /// Drop the lagging head if the inputs are out of step
    ///
    /// Returns `true` when both heads carry the same stamp.
    async fn align(&mut self, ctx: &mut StepContext) -> Result<bool, StepError> {
        let (Some(left), Some(right)) = (
            ctx.peek_stamp(Self::PORT_LEFT),
            ctx.peek_stamp(Self::PORT_RIGHT),
        ) else {
            return Ok(true);
        };

        let lagging = match left.compare(&right) {
            StampOrdering::Equal => return Ok(true),
            StampOrdering::Less => Self::PORT_LEFT,
            StampOrdering::Greater => Self::PORT_RIGHT,
            StampOrdering::Incomparable => {
                return Err(StepError::failed(
                    "left and right inputs come from unrelated streams",
                ))
            }
        };

        ctx.grab(lagging).await?;
        self.dropped += 1;
        log::debug!("Blend {}: dropped skewed datum on '{}'", ctx.name(), lagging);
        Ok(false)
    }
}

#[async_trait]
impl Process for Blend {
    fn descriptor(&self) -> ProcessDescriptor {
        let number = PortType::named("number");
        ProcessDescriptor::new("blend", "Combines two aligned number streams")
            .with_input(PortInfo::input(Self::PORT_LEFT, number.clone(), "First values").required())
            .with_input(PortInfo::input(Self::PORT_RIGHT, number.clone(), "Second values").required())
            .with_output(PortInfo::output(Self::PORT_BLENDED, number, "Blended values"))
            .with_config(ConfigKey::new("mode", "string", "linear", "Blending mode: linear or max"))
            .with_config(ConfigKey::new(
                "left_alpha",
                "float",
                "0.5",
                "Fraction of the left value in linear mode (0-1)",
            ))
            .with_config(ConfigKey::new(
                "right_alpha",
                "float",
                "0.5",
                "Fraction of the right value in linear mode (0-1)",
            ))
            .with_config(ConfigKey::new(
                "left_mult",
                "float",
                "1",
                "Multiply the left value by this before blending",
            ))
            .with_config(ConfigKey::new(
                "right_mult",
                "float",
                "1",
                "Multiply the right value by this before blending",
            ))
    }

    fn configure(&mut self, config: &Config) -> Result<(), ConfigError> {
        self.config = BlendConfig::from_config(config)?;
        log::debug!("Blend configured: {:?}", self.config);
        Ok(())
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        if !self.align(ctx).await? {
            return Ok(StepResult::Continue);
        }

        let left = ctx.grab_value::<f64>(Self::PORT_LEFT).await?;
        let right = ctx.grab_value::<f64>(Self::PORT_RIGHT).await?;
        let out = match (left, right) {
            (Some(left), Some(right)) => Datum::new(self.config.blend(*left, *right)),
            _ => Datum::empty(),
        };
        ctx.push(Self::PORT_BLENDED, out).await?;
        Ok(StepResult::Continue)
    }

    fn on_complete(&mut self) {
        if self.dropped > 0 {
            log::info!("Blend dropped {} skewed datums", self.dropped);
        }
    }
}
