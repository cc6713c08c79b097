//! OBD-II Bus Protocol Selection

use serde::{Deserialize, Serialize};

/// Bus protocols an ELM-style adapter can be told to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (5 baud init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Protocol number used by `SP` / `DPN`
    pub fn code(&self) -> u8 {
        match self {
            ObdProtocol::Auto => 0,
            ObdProtocol::J1850Pwm => 1,
            ObdProtocol::J1850Vpw => 2,
            ObdProtocol::Iso9141_2 => 3,
            ObdProtocol::Iso14230_4Kwp => 4,
            ObdProtocol::Iso14230_4KwpFast => 5,
            ObdProtocol::Iso15765_4Can11bit500 => 6,
            ObdProtocol::Iso15765_4Can29bit500 => 7,
            ObdProtocol::Iso15765_4Can11bit250 => 8,
            ObdProtocol::Iso15765_4Can29bit250 => 9,
        }
    }

    /// Inverse of [`ObdProtocol::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => ObdProtocol::Auto,
            1 => ObdProtocol::J1850Pwm,
            2 => ObdProtocol::J1850Vpw,
            3 => ObdProtocol::Iso9141_2,
            4 => ObdProtocol::Iso14230_4Kwp,
            5 => ObdProtocol::Iso14230_4KwpFast,
            6 => ObdProtocol::Iso15765_4Can11bit500,
            7 => ObdProtocol::Iso15765_4Can29bit500,
            8 => ObdProtocol::Iso15765_4Can11bit250,
            9 => ObdProtocol::Iso15765_4Can29bit250,
            _ => return None,
        })
    }

    /// Control command body (without the `AT` prefix) selecting this protocol
    pub fn set_command(&self) -> String {
        format!("SP {:X}", self.code())
    }

    /// Check if this is a CAN protocol
    pub fn is_can(&self) -> bool {
        matches!(
            self,
            ObdProtocol::Iso15765_4Can11bit500
                | ObdProtocol::Iso15765_4Can29bit500
                | ObdProtocol::Iso15765_4Can11bit250
                | ObdProtocol::Iso15765_4Can29bit250
        )
    }
}
