//! Metric to imperial conversion of decoded values

use crate::decoder::DecodedValue;
use crate::pid::Pid;

const KM_PER_MILE: f64 = 1.60934400061;
const PSI_PER_KPA: f64 = 0.1450377;
const INHG_PER_PA: f64 = 0.000295299830714;
const INH2O_PER_PA: f64 = 0.0040146309;
const LB_PER_GRAM: f64 = 0.0022046;

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn km_to_miles(km: f64) -> f64 {
    km / KM_PER_MILE
}

pub fn kpa_to_psi(kpa: f64) -> f64 {
    kpa * PSI_PER_KPA
}

pub fn pa_to_inhg(pa: f64) -> f64 {
    pa * INHG_PER_PA
}

pub fn kpa_to_inhg(kpa: f64) -> f64 {
    pa_to_inhg(kpa * 1000.0)
}

pub fn pa_to_inh2o(pa: f64) -> f64 {
    pa * INH2O_PER_PA
}

pub fn kpa_to_inh2o(kpa: f64) -> f64 {
    pa_to_inh2o(kpa * 1000.0)
}

/// Grams per second to pounds per minute
pub fn gs_to_lbmin(gs: f64) -> f64 {
    gs * LB_PER_GRAM * 60.0
}

/// Convert a metric reading to imperial units
///
/// Only `Numeric` values of temperature, speed/distance, pressure and mass
/// flow PIDs change. Everything else is returned as given.
pub fn to_imperial(pid: Pid, value: DecodedValue) -> DecodedValue {
    let DecodedValue::Numeric(metric) = value else {
        return value;
    };
    let convert: fn(f64) -> f64 = match pid {
        Pid::ECT
        | Pid::IAT
        | Pid::AAT
        | Pid::CAT_TEMP11
        | Pid::CAT_TEMP12
        | Pid::CAT_TEMP21
        | Pid::CAT_TEMP22 => celsius_to_fahrenheit,
        Pid::VSS | Pid::MIL_DIST | Pid::CLR_DIST => km_to_miles,
        Pid::FRP | Pid::FRP_REL | Pid::FRP_ATMO | Pid::FRP_ABS => kpa_to_psi,
        Pid::MAP | Pid::BARO => kpa_to_inhg,
        Pid::EVAP_VP => pa_to_inh2o,
        Pid::EVAP_VPA => kpa_to_inh2o,
        Pid::MAF => gs_to_lbmin,
        _ => return value,
    };
    DecodedValue::Numeric(convert(metric))
}
