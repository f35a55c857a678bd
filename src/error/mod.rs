use sx127x_hal::HalError;
use thiserror::Error;

use crate::pins::PinRole;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),
    #[error("config error: {0}")]
    Config(String),
    #[error("pin {pin} assigned to both {first} and {second}")]
    PinConflict {
        pin: u8,
        first: PinRole,
        second: PinRole,
    },
    /// Teardown was requested but no SPI device was ever opened.
    #[error("no SPI device is open; call spi_device() before teardown()")]
    SpiNotOpen,
    #[error("SPI device already open on bus {bus} cs {chip_select}")]
    SpiBusy { bus: u8, chip_select: u8 },
    #[error("SPI handle lock poisoned by a panicking user")]
    SpiPoisoned,
}

impl BoardError {
    /// Misuse of the board lifecycle by the caller, as opposed to a hardware fault.
    ///
    /// A closed SPI bus only comes from using a handle after teardown.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            BoardError::SpiNotOpen
                | BoardError::SpiBusy { .. }
                | BoardError::Hal(HalError::SpiClosed(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hal_errors_convert() {
        let err: BoardError = HalError::PinUnavailable(2).into();
        assert_eq!(err.to_string(), "HAL error: pin 2 is already claimed");
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn lifecycle_misuse_is_a_contract_violation() {
        assert!(BoardError::SpiNotOpen.is_contract_violation());
        assert!(BoardError::SpiBusy { bus: 1, chip_select: 0 }.is_contract_violation());
        assert!(BoardError::from(HalError::SpiClosed(1)).is_contract_violation());
        assert!(!BoardError::from(HalError::CommError("nak".into())).is_contract_violation());
    }

    #[test]
    fn conflict_message_names_both_roles() {
        let err = BoardError::PinConflict {
            pin: 2,
            first: PinRole::Led,
            second: PinRole::Switch,
        };
        assert_eq!(err.to_string(), "pin 2 assigned to both LED and SWITCH");
    }
}
