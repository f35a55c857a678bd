//! Pin roles for the Raspberry Pi + modtronix inAir9B board.
//!
//! Numbers use the BCM GPIO numbering.

use serde::Deserialize;
use std::fmt;

use crate::error::BoardError;

pub const P_DIO0: u8 = 5;
pub const P_DIO1: u8 = 4;
pub const P_LED: u8 = 2;
pub const P_SWITCH: u8 = 0;

/// Logical function of a board pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    Dio0,
    Dio1,
    /// Reserved: not exposed by the inAir9B.
    Dio2,
    /// Reserved: not exposed by the inAir9B.
    Dio3,
    Led,
    Switch,
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinRole::Dio0 => "DIO0",
            PinRole::Dio1 => "DIO1",
            PinRole::Dio2 => "DIO2",
            PinRole::Dio3 => "DIO3",
            PinRole::Led => "LED",
            PinRole::Switch => "SWITCH",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PinAssignment {
    pub dio0: u8,
    pub dio1: u8,
    pub dio2: Option<u8>,
    pub dio3: Option<u8>,
    pub led: u8,
    pub switch: u8,
}

impl Default for PinAssignment {
    fn default() -> Self {
        Self {
            dio0: P_DIO0,
            dio1: P_DIO1,
            dio2: None,
            dio3: None,
            led: P_LED,
            switch: P_SWITCH,
        }
    }
}

impl PinAssignment {
    /// Assigned roles with their pin numbers. Unassigned reserved roles are skipped.
    pub fn assigned(&self) -> Vec<(PinRole, u8)> {
        let mut roles = vec![
            (PinRole::Dio0, self.dio0),
            (PinRole::Dio1, self.dio1),
            (PinRole::Led, self.led),
            (PinRole::Switch, self.switch),
        ];
        roles.extend(self.dio2.map(|pin| (PinRole::Dio2, pin)));
        roles.extend(self.dio3.map(|pin| (PinRole::Dio3, pin)));
        roles
    }

    pub fn pin(&self, role: PinRole) -> Option<u8> {
        match role {
            PinRole::Dio0 => Some(self.dio0),
            PinRole::Dio1 => Some(self.dio1),
            PinRole::Dio2 => self.dio2,
            PinRole::Dio3 => self.dio3,
            PinRole::Led => Some(self.led),
            PinRole::Switch => Some(self.switch),
        }
    }

    /// Reject assignments where two roles share a pin.
    pub fn validate(&self) -> Result<(), BoardError> {
        let roles = self.assigned();
        for (i, &(first, pin)) in roles.iter().enumerate() {
            if let Some(&(second, _)) = roles[i + 1..].iter().find(|(_, other)| *other == pin) {
                return Err(BoardError::PinConflict { pin, first, second });
            }
        }
        Ok(())
    }
}
