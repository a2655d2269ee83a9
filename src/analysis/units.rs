//! Power and voltage conversions. Voltages assume a 50 Ω system unless an
//! impedance is given.

/// Reference impedance of the bench.
pub const DEFAULT_IMPEDANCE_OHMS: f64 = 50.0;

pub fn dbm_to_milliwatts(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

pub fn dbm_to_watts(dbm: f64) -> f64 {
    dbm_to_milliwatts(dbm) / 1000.0
}

pub fn watts_to_dbm(watts: f64) -> f64 {
    10.0 * (watts * 1000.0).log10()
}

fn dbm_to_vrms(dbm: f64, ohms: f64) -> f64 {
    (dbm_to_milliwatts(dbm) * (ohms / 1000.0)).sqrt()
}

/// Peak voltage of a sine at `dbm` into `ohms`.
pub fn dbm_to_vp_at(dbm: f64, ohms: f64) -> f64 {
    std::f64::consts::SQRT_2 * dbm_to_vrms(dbm, ohms)
}

/// Peak-to-peak voltage of a sine at `dbm` into `ohms`.
pub fn dbm_to_vpp_at(dbm: f64, ohms: f64) -> f64 {
    2.0 * dbm_to_vp_at(dbm, ohms)
}

pub fn dbm_to_vp(dbm: f64) -> f64 {
    dbm_to_vp_at(dbm, DEFAULT_IMPEDANCE_OHMS)
}

pub fn dbm_to_vpp(dbm: f64) -> f64 {
    dbm_to_vpp_at(dbm, DEFAULT_IMPEDANCE_OHMS)
}
