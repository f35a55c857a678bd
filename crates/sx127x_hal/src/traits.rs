use crate::config::SpiConfig;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("pin {0} is already claimed")]
    PinUnavailable(u8),
    #[error("pin {0} cannot be configured")]
    InvalidPin(u8),
    #[error("SPI bus {0} does not exist")]
    InvalidBus(u8),
    #[error("SPI bus {0} has been deinitialized")]
    SpiClosed(u8),
    #[error("communication error: {0}")]
    CommError(String),
}

/// Internal pull resistor for an input pin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
    None,
}

/// Edge that triggers an input interrupt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Whether a transition from `from` to `to` matches this edge.
    pub fn matches(self, from: bool, to: bool) -> bool {
        match self {
            Edge::Rising => !from && to,
            Edge::Falling => from && !to,
        }
    }
}

/// Interrupt handler, called with the number of the pin that fired.
///
/// Handlers run from the interrupt dispatch context, possibly concurrently with
/// the thread that owns the board. They must return quickly and must not block.
pub type IrqHandler = Box<dyn FnMut(u8) + Send + 'static>;

pub trait OutputPin: Send {
    fn pin(&self) -> u8;
    fn set_high(&mut self) -> Result<(), HalError>;
    fn set_low(&mut self) -> Result<(), HalError>;
    /// Last level driven onto the pin.
    fn is_set_high(&self) -> bool;

    fn set_level(&mut self, high: bool) -> Result<(), HalError> {
        if high { self.set_high() } else { self.set_low() }
    }
}

pub trait InputPin: Send {
    fn pin(&self) -> u8;
    fn is_high(&self) -> Result<bool, HalError>;
    /// Attach `handler` to `edge`. Replaces any handler already attached.
    fn set_irq(&mut self, edge: Edge, handler: IrqHandler) -> Result<(), HalError>;
    fn clear_irq(&mut self) -> Result<(), HalError>;
}

pub trait SpiBus: Send {
    fn config(&self) -> SpiConfig;
    /// Full-duplex transfer; `buf` is sent and overwritten with the received bytes.
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), HalError>;
    fn write(&mut self, data: &[u8]) -> Result<(), HalError>;
    /// Release the peripheral. Further transfers fail with [`HalError::SpiClosed`].
    fn deinit(&mut self) -> Result<(), HalError>;
}

pub trait HalBackend: Send {
    fn output_pin(&mut self, pin: u8, initial_high: bool) -> Result<Box<dyn OutputPin>, HalError>;
    fn input_pin(&mut self, pin: u8, pull: Pull) -> Result<Box<dyn InputPin>, HalError>;
    fn open_spi(&mut self, config: &SpiConfig) -> Result<Box<dyn SpiBus>, HalError>;
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

impl HalBackend for Box<dyn HalBackend> {
    fn output_pin(&mut self, pin: u8, initial_high: bool) -> Result<Box<dyn OutputPin>, HalError> {
        (**self).output_pin(pin, initial_high)
    }
    fn input_pin(&mut self, pin: u8, pull: Pull) -> Result<Box<dyn InputPin>, HalError> {
        (**self).input_pin(pin, pull)
    }
    fn open_spi(&mut self, config: &SpiConfig) -> Result<Box<dyn SpiBus>, HalError> {
        (**self).open_spi(config)
    }
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
