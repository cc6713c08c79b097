//! Parameter Decoder
//!
//! Maps a validated frame to a physical value. Payload bytes are named as
//! in the OBD-II tables: `A = frame[2]`, `B = frame[3]`. All arithmetic is
//! done in `f64` without intermediate truncation.

use crate::codec::RawFrame;
use crate::error::ObdError;
use crate::pid::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First byte of the VIN text in a mode 09 reply
const VIN_OFFSET: usize = 6;

/// Decoded value of one PID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodedValue {
    Numeric(f64),
    NumericPair(f64, f64),
    Text(String),
}

/// Tag of a [`DecodedValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Single,
    Double,
    Text,
}

impl DecodedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            DecodedValue::Numeric(_) => ValueKind::Single,
            DecodedValue::NumericPair(..) => ValueKind::Double,
            DecodedValue::Text(_) => ValueKind::Text,
        }
    }

    /// Primary numeric value, if any
    pub fn primary(&self) -> Option<f64> {
        match self {
            DecodedValue::Numeric(v) | DecodedValue::NumericPair(v, _) => Some(*v),
            DecodedValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Numeric(v) => write!(f, "{v}"),
            DecodedValue::NumericPair(a, b) => write!(f, "{a} / {b}"),
            DecodedValue::Text(s) => f.write_str(s),
        }
    }
}

fn a(frame: &RawFrame) -> Result<f64, ObdError> {
    frame.byte(2).map(f64::from)
}

fn b(frame: &RawFrame) -> Result<f64, ObdError> {
    frame.byte(3).map(f64::from)
}

/// `A * 256 + B`
fn ab(frame: &RawFrame) -> Result<f64, ObdError> {
    frame.word(2).map(f64::from)
}

fn trim_percent(x: f64) -> f64 {
    (x - 128.0) * 100.0 / 128.0
}

/// Decode `frame` as a reply to `pid`
///
/// PIDs without a formula yield [`ObdError::UnsupportedParameter`], never a
/// default value.
pub fn decode(pid: Pid, frame: &RawFrame) -> Result<DecodedValue, ObdError> {
    use DecodedValue::{Numeric, NumericPair, Text};

    let value = match pid {
        Pid::MAP | Pid::VSS | Pid::WARM_UPS | Pid::BARO => Numeric(a(frame)?),
        Pid::BANK1_STFT | Pid::BANK1_LTFT | Pid::BANK2_STFT | Pid::BANK2_LTFT | Pid::EGR_ERR => {
            Numeric(trim_percent(a(frame)?))
        }
        Pid::ECT | Pid::IAT | Pid::AAT => Numeric(a(frame)? - 40.0),
        Pid::MIL_DIST | Pid::CLR_DIST | Pid::MIL_TIME | Pid::CLR_TIME | Pid::RUNTIME => {
            Numeric(ab(frame)?)
        }
        Pid::FRP => Numeric(a(frame)? * 3.0),
        Pid::SPARK_ADV => Numeric(a(frame)? / 2.0 - 64.0),
        Pid::MAF => Numeric(ab(frame)? / 100.0),
        Pid::TP
        | Pid::TP_REL
        | Pid::TP_B
        | Pid::TP_C
        | Pid::APP_D
        | Pid::APP_E
        | Pid::APP_F
        | Pid::LOAD_PCT
        | Pid::EGR_PCT
        | Pid::EVAP_PCT
        | Pid::FUEL_LEVEL
        | Pid::TAC_PCT
        | Pid::ALCOHOL_PCT
        | Pid::APP_REL => Numeric(a(frame)? * 100.0 / 255.0),
        Pid::RPM | Pid::EVAP_VP => Numeric(ab(frame)? / 4.0),
        Pid::O2S11
        | Pid::O2S12
        | Pid::O2S13
        | Pid::O2S14
        | Pid::O2S21
        | Pid::O2S22
        | Pid::O2S23
        | Pid::O2S24 => NumericPair(a(frame)? * 0.005, trim_percent(b(frame)?)),
        Pid::CAT_TEMP11 | Pid::CAT_TEMP21 | Pid::CAT_TEMP12 | Pid::CAT_TEMP22 => {
            Numeric(ab(frame)? / 10.0 - 40.0)
        }
        Pid::FRP_REL => Numeric(ab(frame)? * 10.0 / 128.0),
        Pid::FRP_ATMO | Pid::FRP_ABS => Numeric(ab(frame)? * 10.0),
        Pid::VPWR => Numeric(ab(frame)? / 1000.0),
        Pid::LOAD_ABS => Numeric(ab(frame)? * 100.0 / 255.0),
        Pid::EQ_RATIO => Numeric(ab(frame)? / 32768.0),
        Pid::EVAP_VPA => Numeric(ab(frame)? / 200.0),
        Pid::FUEL_SYSTEM => Text(fuel_system_status(frame.byte(2)?)),
        Pid::AIR_STAT => Text(air_status(frame.byte(2)?)),
        Pid::O2S_LOCATION => Text(o2_sensor_locations(frame.byte(2)?)),
        Pid::OBD_SUPPORT => Text(obd_standard(frame.byte(2)?)),
        Pid::PTO_STAT => Text(if frame.byte(2)? == 0x80 { "ON" } else { "OFF" }.to_string()),
        Pid::FUEL_TYPE => Text(fuel_type(frame.byte(2)?)),
        Pid::VIN => Text(vin(frame)?),
        _ => return Err(ObdError::UnsupportedParameter(pid.value())),
    };
    Ok(value)
}

fn illegal(byte: u8) -> String {
    format!("Illegal value ({byte:#04X})")
}

fn fuel_system_status(byte: u8) -> String {
    match byte {
        0x00 => "Not present".to_string(),
        0x01 => "Open loop (insufficient engine temperature)".to_string(),
        0x02 => "Closed loop".to_string(),
        0x04 => "Open loop (engine load or fuel cut)".to_string(),
        0x08 => "Open loop (system failure)".to_string(),
        0x10 => "Closed loop (feedback fault)".to_string(),
        other => illegal(other),
    }
}

fn air_status(byte: u8) -> String {
    match byte {
        0x80 => "UPS".to_string(),
        0x40 => "DNS".to_string(),
        0x20 => "OFF".to_string(),
        other => illegal(other),
    }
}

/// Bits 0-3 are bank 1 sensors 1-4, bits 4-7 bank 2 sensors 1-4
fn o2_sensor_locations(byte: u8) -> String {
    let sensors: Vec<String> = (0..8)
        .filter(|bit| byte & (1 << bit) != 0)
        .map(|bit| format!("B{}S{}", bit / 4 + 1, bit % 4 + 1))
        .collect();
    if sensors.is_empty() {
        "None".to_string()
    } else {
        sensors.join(" ")
    }
}

fn obd_standard(byte: u8) -> String {
    let label = match byte {
        0x01 => "OBD II",
        0x02 => "OBD",
        0x03 => "OBD and OBD II",
        0x04 => "OBD I",
        0x05 => "NO OBD",
        0x06 => "EOBD",
        0x07 => "EOBD and OBD II",
        0x08 => "EOBD and OBD",
        0x09 => "EOBD, OBD and OBD II",
        0x0A => "JOBD",
        0x0B => "JOBD and OBD II",
        0x0C => "JOBD and EOBD",
        0x0D => "JOBD, EOBD, and OBD II",
        0x0E => "EURO IV B1",
        0x0F => "EURO V B2",
        0x10 => "EURO C",
        0x11 => "EMD",
        other => return illegal(other),
    };
    label.to_string()
}

fn fuel_type(byte: u8) -> String {
    let label = match byte {
        0x01 => "GAS",
        0x02 => "METH",
        0x03 => "ETH",
        0x04 => "DSL",
        0x05 => "LPG",
        0x06 => "CNG",
        0x07 => "PROP",
        0x08 => "ELEC",
        0x09 => "BI_GAS",
        0x0A => "BI_METH",
        0x0B => "BI_ETH",
        0x0C => "BI_LPG",
        0x0D => "BI_CNG",
        0x0E => "BI_PROP",
        0x0F => "BI_ELEC",
        other => return illegal(other),
    };
    label.to_string()
}

/// Characters from offset 6 to the end of the frame; padding and other
/// non-printing bytes are dropped
fn vin(frame: &RawFrame) -> Result<String, ObdError> {
    let text = frame
        .as_bytes()
        .get(VIN_OFFSET..)
        .ok_or_else(|| ObdError::missing_byte(VIN_OFFSET, frame.len()))?;
    Ok(text
        .iter()
        .filter(|b| b.is_ascii_graphic())
        .map(|&b| b as char)
        .collect())
}

/// A decoded PID reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidResponse {
    /// The PID that was queried
    pub pid: Pid,
    /// Timestamp when the response was received (Unix ms)
    pub timestamp_ms: u64,
    /// Decoded value, already converted if imperial units are on
    pub value: DecodedValue,
    /// Unit of `value`
    pub unit: String,
    /// Bytes of the validated frame
    pub raw_bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> RawFrame {
        RawFrame::new(bytes.to_vec())
    }

    fn numeric(pid: Pid, bytes: &[u8]) -> f64 {
        match decode(pid, &frame(bytes)).unwrap() {
            DecodedValue::Numeric(v) => v,
            other => panic!("expected numeric, got {other:?}"),
        }
    }

    #[test]
    fn test_rpm_decode() {
        // ((0x1A * 256) + 0x2B) / 4 = 6699 / 4
        assert_eq!(numeric(Pid::RPM, &[0x41, 0x0C, 0x1A, 0x2B]), 1674.75);
    }

    #[test]
    fn test_coolant_temp_decode() {
        assert_eq!(numeric(Pid::ECT, &[0x41, 0x05, 0x5A]), 50.0);
        assert_eq!(numeric(Pid::IAT, &[0x41, 0x0F, 0x00]), -40.0);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(numeric(Pid::TP, &[0x41, 0x11, 0xFF]), 100.0);
        assert!((numeric(Pid::LOAD_PCT, &[0x41, 0x04, 0x7F]) - 49.8039).abs() < 1e-3);
        assert!((numeric(Pid::FUEL_LEVEL, &[0x41, 0x2F, 0x80]) - 50.1961).abs() < 1e-3);
    }

    #[test]
    fn test_fuel_trim_decode() {
        assert_eq!(numeric(Pid::BANK1_STFT, &[0x41, 0x06, 0x80]), 0.0);
        assert_eq!(numeric(Pid::BANK2_LTFT, &[0x41, 0x09, 0x90]), 12.5);
        assert_eq!(numeric(Pid::EGR_ERR, &[0x41, 0x2D, 0x00]), -100.0);
    }

    #[test]
    fn test_two_byte_formulas() {
        assert_eq!(numeric(Pid::MAF, &[0x41, 0x10, 0x01, 0xF4]), 5.0);
        assert_eq!(numeric(Pid::RUNTIME, &[0x41, 0x1F, 0x01, 0x00]), 256.0);
        assert_eq!(numeric(Pid::VPWR, &[0x41, 0x42, 0x30, 0xD4]), 12.5);
        assert_eq!(numeric(Pid::EQ_RATIO, &[0x41, 0x44, 0x80, 0x00]), 1.0);
        assert_eq!(numeric(Pid::CAT_TEMP11, &[0x41, 0x3C, 0x0F, 0xA0]), 360.0);
        assert_eq!(numeric(Pid::EVAP_VP, &[0x41, 0x32, 0x00, 0x10]), 4.0);
        assert_eq!(numeric(Pid::EVAP_VPA, &[0x41, 0x53, 0x00, 0xC8]), 1.0);
        assert_eq!(numeric(Pid::FRP_ABS, &[0x41, 0x59, 0x00, 0x0A]), 100.0);
        assert_eq!(numeric(Pid::FRP_REL, &[0x41, 0x22, 0x00, 0x80]), 10.0);
        assert_eq!(numeric(Pid::LOAD_ABS, &[0x41, 0x43, 0x00, 0xFF]), 100.0);
    }

    #[test]
    fn test_single_byte_formulas() {
        assert_eq!(numeric(Pid::VSS, &[0x41, 0x0D, 0x3C]), 60.0);
        assert_eq!(numeric(Pid::FRP, &[0x41, 0x0A, 0x64]), 300.0);
        assert_eq!(numeric(Pid::SPARK_ADV, &[0x41, 0x0E, 0x90]), 8.0);
    }

    #[test]
    fn test_o2_sensor_pair() {
        let value = decode(Pid::O2S11, &frame(&[0x41, 0x14, 0x5A, 0x90])).unwrap();
        assert_eq!(value.kind(), ValueKind::Double);
        match value {
            DecodedValue::NumericPair(volts, trim) => {
                assert!((volts - 0.45).abs() < 1e-9);
                assert_eq!(trim, 12.5);
            }
            other => panic!("expected pair, got {other:?}"),
        }
    }

    #[test]
    fn test_enumerated_states() {
        let text = |pid, byte| decode(pid, &frame(&[0x41, 0x00, byte])).unwrap();
        assert_eq!(text(Pid::AIR_STAT, 0x40), DecodedValue::Text("DNS".into()));
        assert_eq!(text(Pid::FUEL_TYPE, 0x04), DecodedValue::Text("DSL".into()));
        assert_eq!(text(Pid::OBD_SUPPORT, 0x06), DecodedValue::Text("EOBD".into()));
        assert_eq!(text(Pid::PTO_STAT, 0x80), DecodedValue::Text("ON".into()));
        assert_eq!(text(Pid::PTO_STAT, 0x00), DecodedValue::Text("OFF".into()));
        assert_eq!(text(Pid::FUEL_SYSTEM, 0x02), DecodedValue::Text("Closed loop".into()));
        assert_eq!(
            text(Pid::FUEL_TYPE, 0x42),
            DecodedValue::Text("Illegal value (0x42)".into())
        );
    }

    #[test]
    fn test_o2_sensor_locations() {
        let value = decode(Pid::O2S_LOCATION, &frame(&[0x41, 0x13, 0x33])).unwrap();
        assert_eq!(value.as_text(), Some("B1S1 B1S2 B2S1 B2S2"));
        let value = decode(Pid::O2S_LOCATION, &frame(&[0x41, 0x13, 0x00])).unwrap();
        assert_eq!(value.as_text(), Some("None"));
    }

    #[test]
    fn test_vin_decode() {
        let mut bytes = vec![0x49, 0x02, 0x01, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(b"1D4GP00R55B123456");
        let value = decode(Pid::VIN, &frame(&bytes)).unwrap();
        assert_eq!(value, DecodedValue::Text("1D4GP00R55B123456".into()));
    }

    #[test]
    fn test_unsupported_pid() {
        let err = decode(Pid(0x01FF), &frame(&[0x40, 0x01, 0xFF, 0x00])).unwrap_err();
        assert!(matches!(err, ObdError::UnsupportedParameter(0x01FF)));
        // Monitor status is read through its own operation, not the value table
        let err = decode(Pid::DTC_STATUS, &frame(&[0x41, 0x01, 0x81])).unwrap_err();
        assert!(matches!(err, ObdError::UnsupportedParameter(0x0101)));
    }

    #[test]
    fn test_short_frame_is_malformed() {
        let err = decode(Pid::RPM, &frame(&[0x41, 0x0C, 0x1A])).unwrap_err();
        assert!(matches!(err, ObdError::MalformedResponse(_)));
        let err = decode(Pid::VIN, &frame(&[0x49, 0x02, 0x01])).unwrap_err();
        assert!(matches!(err, ObdError::MalformedResponse(_)));
    }
}
