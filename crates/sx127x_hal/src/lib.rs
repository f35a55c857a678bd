//! Hardware abstraction for the SX127x board shim.
//!
//! The board crate only talks to hardware through the traits in [`traits`].
//! [`sim::SimBackend`] implements them in memory for host runs and tests.

pub mod config;
pub mod sim;
pub mod traits;

pub use config::SpiConfig;
pub use traits::{Edge, HalBackend, HalError, InputPin, IrqHandler, OutputPin, Pull, SpiBus};
