//! Pure post-processing of peak tables: expected frequencies, matching and
//! unit conversion. Nothing here talks to an instrument.

pub mod frequency;
pub mod matcher;
pub mod units;

pub use frequency::{
    harmonic_series, two_tone_products, IntermodProducts, MAX_HARMONIC, MAX_INTERMOD_ORDER,
};
pub use matcher::{
    find_exact_match, find_tolerance_match, relative_power_dbc, spur_set, SpurSet,
};
pub use units::{
    dbm_to_milliwatts, dbm_to_vp, dbm_to_vp_at, dbm_to_vpp, dbm_to_vpp_at, dbm_to_watts,
    watts_to_dbm, DEFAULT_IMPEDANCE_OHMS,
};
