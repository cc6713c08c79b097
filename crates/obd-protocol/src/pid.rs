//! OBD-II PID Definitions
//!
//! A [`Pid`] combines the service mode and the parameter number into one
//! value (`0x010C` is mode 01, PID 0C). The request width and the expected
//! positive-response header are both derived from that value.

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mode byte added to a request to form its positive-response echo
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// A mode + parameter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u16);

impl Pid {
    /// Monitor status since DTCs cleared (MIL and code count)
    pub const DTC_STATUS: Pid = Pid(0x0101);
    /// DTC that caused the freeze frame
    pub const DTC_FREEZE_FRAME: Pid = Pid(0x0102);
    /// Fuel system status
    pub const FUEL_SYSTEM: Pid = Pid(0x0103);
    /// Calculated load value
    pub const LOAD_PCT: Pid = Pid(0x0104);
    /// Engine coolant temperature
    pub const ECT: Pid = Pid(0x0105);
    pub const BANK1_STFT: Pid = Pid(0x0106);
    pub const BANK1_LTFT: Pid = Pid(0x0107);
    pub const BANK2_STFT: Pid = Pid(0x0108);
    pub const BANK2_LTFT: Pid = Pid(0x0109);
    /// Fuel rail pressure (gauge)
    pub const FRP: Pid = Pid(0x010A);
    /// Intake manifold absolute pressure
    pub const MAP: Pid = Pid(0x010B);
    /// Engine RPM
    pub const RPM: Pid = Pid(0x010C);
    /// Vehicle speed sensor
    pub const VSS: Pid = Pid(0x010D);
    /// Timing advance for cylinder #1
    pub const SPARK_ADV: Pid = Pid(0x010E);
    /// Intake air temperature
    pub const IAT: Pid = Pid(0x010F);
    /// Mass air flow
    pub const MAF: Pid = Pid(0x0110);
    /// Absolute throttle position
    pub const TP: Pid = Pid(0x0111);
    /// Commanded secondary air status
    pub const AIR_STAT: Pid = Pid(0x0112);
    /// Location of oxygen sensors
    pub const O2S_LOCATION: Pid = Pid(0x0113);
    pub const O2S11: Pid = Pid(0x0114);
    pub const O2S12: Pid = Pid(0x0115);
    pub const O2S13: Pid = Pid(0x0116);
    pub const O2S14: Pid = Pid(0x0117);
    pub const O2S21: Pid = Pid(0x0118);
    pub const O2S22: Pid = Pid(0x0119);
    pub const O2S23: Pid = Pid(0x011A);
    pub const O2S24: Pid = Pid(0x011B);
    /// OBD requirements the vehicle conforms to
    pub const OBD_SUPPORT: Pid = Pid(0x011C);
    /// Auxiliary input (power take-off) status
    pub const PTO_STAT: Pid = Pid(0x011E);
    /// Time since engine start
    pub const RUNTIME: Pid = Pid(0x011F);
    /// Distance travelled with MIL on
    pub const MIL_DIST: Pid = Pid(0x0121);
    /// Fuel rail pressure relative to manifold vacuum
    pub const FRP_REL: Pid = Pid(0x0122);
    /// Fuel rail pressure relative to atmosphere
    pub const FRP_ATMO: Pid = Pid(0x0123);
    /// Commanded EGR
    pub const EGR_PCT: Pid = Pid(0x012C);
    /// EGR error
    pub const EGR_ERR: Pid = Pid(0x012D);
    /// Commanded evaporative purge
    pub const EVAP_PCT: Pid = Pid(0x012E);
    /// Fuel level input
    pub const FUEL_LEVEL: Pid = Pid(0x012F);
    /// Warm-ups since codes cleared
    pub const WARM_UPS: Pid = Pid(0x0130);
    /// Distance since codes cleared
    pub const CLR_DIST: Pid = Pid(0x0131);
    /// Evap system vapour pressure
    pub const EVAP_VP: Pid = Pid(0x0132);
    /// Barometric pressure
    pub const BARO: Pid = Pid(0x0133);
    pub const CAT_TEMP11: Pid = Pid(0x013C);
    pub const CAT_TEMP21: Pid = Pid(0x013D);
    pub const CAT_TEMP12: Pid = Pid(0x013E);
    pub const CAT_TEMP22: Pid = Pid(0x013F);
    /// Control module voltage
    pub const VPWR: Pid = Pid(0x0142);
    /// Absolute load value
    pub const LOAD_ABS: Pid = Pid(0x0143);
    /// Commanded equivalence ratio
    pub const EQ_RATIO: Pid = Pid(0x0144);
    /// Relative throttle position
    pub const TP_REL: Pid = Pid(0x0145);
    /// Ambient air temperature
    pub const AAT: Pid = Pid(0x0146);
    pub const TP_B: Pid = Pid(0x0147);
    pub const TP_C: Pid = Pid(0x0148);
    pub const APP_D: Pid = Pid(0x0149);
    pub const APP_E: Pid = Pid(0x014A);
    pub const APP_F: Pid = Pid(0x014B);
    /// Commanded throttle actuator
    pub const TAC_PCT: Pid = Pid(0x014C);
    /// Time run with MIL on
    pub const MIL_TIME: Pid = Pid(0x014D);
    /// Time since codes cleared
    pub const CLR_TIME: Pid = Pid(0x014E);
    /// Type of fuel in use
    pub const FUEL_TYPE: Pid = Pid(0x0151);
    /// Ethanol fuel percentage
    pub const ALCOHOL_PCT: Pid = Pid(0x0152);
    /// Absolute evap system vapour pressure
    pub const EVAP_VPA: Pid = Pid(0x0153);
    /// Fuel rail absolute pressure
    pub const FRP_ABS: Pid = Pid(0x0159);
    /// Relative accelerator pedal position
    pub const APP_REL: Pid = Pid(0x015A);
    /// Vehicle identification number
    pub const VIN: Pid = Pid(0x0902);

    /// Bare mode requests (no parameter byte)
    pub const READ_DTC: Pid = Pid(0x03);
    pub const CLEAR_DTC: Pid = Pid(0x04);

    /// Raw numeric value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Number of bytes the request (and the echoed header) occupies
    pub fn scale_bytes(&self) -> usize {
        usize::from(self.0 / 255) + 1
    }

    /// ASCII-hex request text, zero padded to `2 * scale_bytes` digits
    pub fn request_hex(&self) -> String {
        format!("{:0width$X}", self.0, width = self.scale_bytes() * 2)
    }

    /// Parse a request string produced by [`Pid::request_hex`]
    pub fn from_request_hex(text: &str) -> Result<Self, ObdError> {
        let value = u16::from_str_radix(text.trim(), 16)
            .map_err(|e| ObdError::InvalidRequest(format!("{text:?}: {e}")))?;
        Ok(Pid(value))
    }

    /// Expected positive-response header, big-endian in `scale_bytes` bytes
    ///
    /// This is `pid + 64 * 256^(scale_bytes - 1)`. Returns `None` when that
    /// value does not fit in `scale_bytes` bytes, in which case no reply
    /// can ever validate.
    pub fn expected_header(&self) -> Option<Vec<u8>> {
        let scale = self.scale_bytes();
        let mut header = vec![0u8; scale];
        for (i, byte) in self.0.to_be_bytes().iter().rev().enumerate() {
            if i < scale {
                header[scale - 1 - i] = *byte;
            } else if *byte != 0 {
                return None;
            }
        }
        header[0] = header[0].checked_add(POSITIVE_RESPONSE_OFFSET)?;
        Some(header)
    }

    /// Human-readable parameter name
    pub fn name(&self) -> &'static str {
        match *self {
            Pid::DTC_STATUS => "Monitor status",
            Pid::DTC_FREEZE_FRAME => "Freeze frame DTC",
            Pid::FUEL_SYSTEM => "Fuel system status",
            Pid::LOAD_PCT => "Calculated engine load",
            Pid::ECT => "Engine coolant temperature",
            Pid::BANK1_STFT => "Short term fuel trim bank 1",
            Pid::BANK1_LTFT => "Long term fuel trim bank 1",
            Pid::BANK2_STFT => "Short term fuel trim bank 2",
            Pid::BANK2_LTFT => "Long term fuel trim bank 2",
            Pid::FRP => "Fuel rail pressure",
            Pid::MAP => "Intake manifold pressure",
            Pid::RPM => "Engine RPM",
            Pid::VSS => "Vehicle speed",
            Pid::SPARK_ADV => "Timing advance",
            Pid::IAT => "Intake air temperature",
            Pid::MAF => "Mass air flow",
            Pid::TP => "Throttle position",
            Pid::AIR_STAT => "Secondary air status",
            Pid::O2S_LOCATION => "Oxygen sensors present",
            Pid::O2S11 => "O2 sensor bank 1 sensor 1",
            Pid::O2S12 => "O2 sensor bank 1 sensor 2",
            Pid::O2S13 => "O2 sensor bank 1 sensor 3",
            Pid::O2S14 => "O2 sensor bank 1 sensor 4",
            Pid::O2S21 => "O2 sensor bank 2 sensor 1",
            Pid::O2S22 => "O2 sensor bank 2 sensor 2",
            Pid::O2S23 => "O2 sensor bank 2 sensor 3",
            Pid::O2S24 => "O2 sensor bank 2 sensor 4",
            Pid::OBD_SUPPORT => "OBD standard",
            Pid::PTO_STAT => "Auxiliary input status",
            Pid::RUNTIME => "Run time since engine start",
            Pid::MIL_DIST => "Distance with MIL on",
            Pid::FRP_REL => "Fuel rail pressure (manifold)",
            Pid::FRP_ATMO => "Fuel rail pressure (atmosphere)",
            Pid::EGR_PCT => "Commanded EGR",
            Pid::EGR_ERR => "EGR error",
            Pid::EVAP_PCT => "Commanded evaporative purge",
            Pid::FUEL_LEVEL => "Fuel level",
            Pid::WARM_UPS => "Warm-ups since codes cleared",
            Pid::CLR_DIST => "Distance since codes cleared",
            Pid::EVAP_VP => "Evap vapour pressure",
            Pid::BARO => "Barometric pressure",
            Pid::CAT_TEMP11 => "Catalyst temperature B1S1",
            Pid::CAT_TEMP21 => "Catalyst temperature B2S1",
            Pid::CAT_TEMP12 => "Catalyst temperature B1S2",
            Pid::CAT_TEMP22 => "Catalyst temperature B2S2",
            Pid::VPWR => "Control module voltage",
            Pid::LOAD_ABS => "Absolute load value",
            Pid::EQ_RATIO => "Commanded equivalence ratio",
            Pid::TP_REL => "Relative throttle position",
            Pid::AAT => "Ambient air temperature",
            Pid::TP_B => "Absolute throttle position B",
            Pid::TP_C => "Absolute throttle position C",
            Pid::APP_D => "Accelerator pedal position D",
            Pid::APP_E => "Accelerator pedal position E",
            Pid::APP_F => "Accelerator pedal position F",
            Pid::TAC_PCT => "Commanded throttle actuator",
            Pid::MIL_TIME => "Time run with MIL on",
            Pid::CLR_TIME => "Time since codes cleared",
            Pid::FUEL_TYPE => "Fuel type",
            Pid::ALCOHOL_PCT => "Ethanol fuel percentage",
            Pid::EVAP_VPA => "Absolute evap vapour pressure",
            Pid::FRP_ABS => "Fuel rail absolute pressure",
            Pid::APP_REL => "Relative accelerator pedal position",
            Pid::VIN => "Vehicle identification number",
            _ => "Unknown",
        }
    }

    /// Unit of the decoded value, metric or imperial
    pub fn unit(&self, imperial: bool) -> &'static str {
        match *self {
            Pid::ECT | Pid::IAT | Pid::AAT | Pid::CAT_TEMP11 | Pid::CAT_TEMP21
            | Pid::CAT_TEMP12 | Pid::CAT_TEMP22 => {
                if imperial { "°F" } else { "°C" }
            }
            Pid::VSS => {
                if imperial { "mph" } else { "km/h" }
            }
            Pid::MIL_DIST | Pid::CLR_DIST => {
                if imperial { "mi" } else { "km" }
            }
            Pid::FRP | Pid::FRP_REL | Pid::FRP_ATMO | Pid::FRP_ABS => {
                if imperial { "psi" } else { "kPa" }
            }
            Pid::MAP | Pid::BARO => {
                if imperial { "inHg" } else { "kPa" }
            }
            Pid::EVAP_VP => {
                if imperial { "inH2O" } else { "Pa" }
            }
            Pid::EVAP_VPA => {
                if imperial { "inH2O" } else { "kPa" }
            }
            Pid::MAF => {
                if imperial { "lb/min" } else { "g/s" }
            }
            Pid::RPM => "rpm",
            Pid::SPARK_ADV => "°",
            Pid::VPWR | Pid::O2S11 | Pid::O2S12 | Pid::O2S13 | Pid::O2S14 | Pid::O2S21
            | Pid::O2S22 | Pid::O2S23 | Pid::O2S24 => "V",
            Pid::RUNTIME | Pid::MIL_TIME | Pid::CLR_TIME => "s",
            Pid::LOAD_PCT | Pid::LOAD_ABS | Pid::TP | Pid::TP_REL | Pid::TP_B | Pid::TP_C
            | Pid::APP_D | Pid::APP_E | Pid::APP_F | Pid::APP_REL | Pid::TAC_PCT
            | Pid::EGR_PCT | Pid::EGR_ERR | Pid::EVAP_PCT | Pid::FUEL_LEVEL
            | Pid::ALCOHOL_PCT | Pid::BANK1_STFT | Pid::BANK1_LTFT | Pid::BANK2_STFT
            | Pid::BANK2_LTFT => "%",
            _ => "",
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

impl From<u16> for Pid {
    fn from(value: u16) -> Self {
        Pid(value)
    }
}
