//! Board support for an SX127x LoRa module on a Raspberry Pi style header.
//!
//! Maps pin numbers to the LED, the user switch and the radio's DIO0/DIO1
//! interrupt lines, and hands out the SPI device the radio driver talks through.

pub mod board;
pub mod config;
pub mod error;
pub mod pins;

pub use board::{Board, EventLine, SpiHandle, add_event_detect};
pub use config::BoardConfig;
pub use error::BoardError;
pub use pins::{PinAssignment, PinRole};
