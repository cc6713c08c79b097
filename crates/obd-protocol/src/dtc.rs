//! Diagnostic trouble codes
//!
//! A mode 03 reply carries two bytes per code. Every group of three codes
//! is preceded by one extra header byte from the next response line, so
//! code `i` sits at `frame[2i + 1 + i/3]` and `frame[2i + 2 + i/3]`.

use crate::codec::RawFrame;
use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Codes carried by each response line of a mode 03 reply
const CODES_PER_LINE: usize = 3;

/// Lamp bit of the monitor status byte
const MIL_BIT: u8 = 0x80;

/// System letter of a trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtcCategory {
    Powertrain,
    Chassis,
    Body,
    Network,
}

impl DtcCategory {
    /// Category from the top two bits of the first code byte
    pub fn from_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }
}

/// How the last three characters of a code are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcNotation {
    /// Low nibble and second byte in decimal (`0x43 0x45` -> `C0369`)
    #[default]
    Decimal,
    /// SAE hexadecimal digits (`0x43 0x45` -> `C0345`)
    Hex,
}

/// A five character trouble code such as `P0301`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TroubleCode(String);

impl TroubleCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Category from the leading letter
    pub fn category(&self) -> Option<DtcCategory> {
        match self.0.chars().next()? {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }
}

impl fmt::Display for TroubleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render one code from its two bytes
pub fn format_code(
    byte_one: u8,
    byte_two: u8,
    notation: DtcNotation,
) -> Result<TroubleCode, ObdError> {
    let letter = DtcCategory::from_byte(byte_one).letter();
    let first = (byte_one & 0x30) >> 4;
    let second = byte_one & 0x0F;

    let code = match notation {
        DtcNotation::Hex => format!("{letter}{first}{second:X}{byte_two:02X}"),
        DtcNotation::Decimal => {
            if second > 9 || byte_two > 99 {
                return Err(ObdError::MalformedResponse(format!(
                    "code bytes {byte_one:02X} {byte_two:02X} do not fit decimal notation"
                )));
            }
            format!("{letter}{first}{second}{byte_two:02}")
        }
    };
    Ok(TroubleCode(code))
}

/// Decode `expected_count` codes from a mode 03 reply in decimal notation
pub fn decode_trouble_codes(
    frame: &RawFrame,
    expected_count: usize,
) -> Result<Vec<TroubleCode>, ObdError> {
    decode_trouble_codes_with(frame, expected_count, DtcNotation::default())
}

/// Decode `expected_count` codes from a mode 03 reply
///
/// A count of zero returns an empty list without touching the frame. A code
/// that decimal notation cannot render is written in hex instead.
pub fn decode_trouble_codes_with(
    frame: &RawFrame,
    expected_count: usize,
    notation: DtcNotation,
) -> Result<Vec<TroubleCode>, ObdError> {
    let mut codes = Vec::with_capacity(expected_count);
    for i in 0..expected_count {
        let line = i / CODES_PER_LINE;
        let byte_one = frame.byte(2 * i + 1 + line)?;
        let byte_two = frame.byte(2 * i + 2 + line)?;
        let code = match format_code(byte_one, byte_two, notation) {
            Ok(code) => code,
            Err(err) => {
                warn!("{}, falling back to hex notation", err);
                format_code(byte_one, byte_two, DtcNotation::Hex)?
            }
        };
        codes.push(code);
    }
    Ok(codes)
}

/// Malfunction indicator lamp state from the monitor status PID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilStatus {
    pub mil_on: bool,
    /// Number of stored emission related codes
    pub dtc_count: u8,
}

impl MilStatus {
    /// Parse byte A of a `0x0101` reply
    pub fn from_frame(frame: &RawFrame) -> Result<Self, ObdError> {
        let a = frame.byte(2)?;
        Ok(Self {
            mil_on: a & MIL_BIT != 0,
            dtc_count: a & !MIL_BIT,
        })
    }
}
