//! Board configuration, deserialized from TOML.
//!
//! Every table and field is optional; an empty document yields the reference
//! Raspberry Pi + inAir9B wiring.

use serde::Deserialize;
use std::time::Duration;
use sx127x_hal::SpiConfig;

use crate::error::BoardError;
use crate::pins::PinAssignment;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub pins: PinAssignment,
    #[serde(default)]
    pub spi: SpiConfig,
    #[serde(default)]
    pub startup: StartupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardSection {
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    "rpi-inair9b".to_string()
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            name: default_name(),
        }
    }
}

/// LED signal given once the pins are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StartupConfig {
    #[serde(default = "default_blink_count")]
    pub blink_count: u32,
    #[serde(default = "default_blink_half_period")]
    pub blink_half_period_ms: u64,
}

fn default_blink_count() -> u32 {
    2
}

fn default_blink_half_period() -> u64 {
    100
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            blink_count: default_blink_count(),
            blink_half_period_ms: default_blink_half_period(),
        }
    }
}

impl StartupConfig {
    pub fn half_period(&self) -> Duration {
        Duration::from_millis(self.blink_half_period_ms)
    }
}

impl BoardConfig {
    pub fn from_toml(content: &str) -> Result<Self, BoardError> {
        let config: Self = toml::from_str(content).map_err(|e| BoardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, BoardError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BoardError::Config(format!("{path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), BoardError> {
        self.pins.validate()?;
        if self.spi.baud_rate == 0 {
            return Err(BoardError::Config("spi.baud_rate must be non-zero".into()));
        }
        Ok(())
    }
}
