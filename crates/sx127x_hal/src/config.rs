use serde::Deserialize;

/// Default SPI clock for the SX127x: 1 MHz.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Bus the inAir9B module is wired to on the reference board.
pub const DEFAULT_SPI_BUS: u8 = 1;

/// SPI peripheral selection, deserialized from the `[spi]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SpiConfig {
    #[serde(default = "default_bus")]
    pub bus: u8,
    #[serde(default)]
    pub chip_select: u8,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_bus() -> u8 {
    DEFAULT_SPI_BUS
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl SpiConfig {
    pub fn new(bus: u8, chip_select: u8) -> Self {
        Self {
            bus,
            chip_select,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SPI_BUS, 0)
    }
}
