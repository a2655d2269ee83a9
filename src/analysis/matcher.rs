//! Peak lookups, spur sets and relative power.
//!
//! Harmonic and fundamental lookups use exact frequency equality: the targets
//! are generated in-process from the same fundamental the sweep was centred
//! on. Intermodulation lookups go through a tolerance instead.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::measurement::{Peak, PeakTable};

/// Amplitude of the first peak at exactly `target_hz`.
pub fn find_exact_match(table: &PeakTable, target_hz: f64) -> Option<f64> {
    table
        .iter()
        .find(|p| p.frequency_hz == target_hz)
        .map(|p| p.amplitude_db)
}

/// First peak (in table order) within `tolerance_hz` of `target_hz`.
///
/// Not the closest match: table order decides between candidates.
pub fn find_tolerance_match(table: &PeakTable, target_hz: f64, tolerance_hz: f64) -> Option<Peak> {
    table
        .iter()
        .find(|p| (p.frequency_hz - target_hz).abs() <= tolerance_hz)
        .copied()
}

/// Peak frequencies in `table` that are not exactly one of `expected`.
pub fn spur_set(expected: &[f64], table: &PeakTable) -> SpurSet {
    table
        .frequencies()
        .filter(|f| !expected.contains(f))
        .collect()
}

/// Separation from `reference_db`, always reported as a non-positive dBc.
pub fn relative_power_dbc(measured_db: f64, reference_db: f64) -> f64 {
    -(measured_db - reference_db).abs()
}

/// Ordered set of spur frequencies.
///
/// Keyed on the bit pattern so the same float always lands in the same slot;
/// ordering follows the numeric value for the non-negative frequencies a
/// sweep reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpurSet {
    frequencies: BTreeMap<u64, f64>,
}

impl SpurSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frequency_hz: f64) -> bool {
        self.frequencies
            .insert(Self::key(frequency_hz), frequency_hz)
            .is_none()
    }

    pub fn remove(&mut self, frequency_hz: f64) -> bool {
        self.frequencies.remove(&Self::key(frequency_hz)).is_some()
    }

    pub fn contains(&self, frequency_hz: f64) -> bool {
        self.frequencies.contains_key(&Self::key(frequency_hz))
    }

    /// Every frequency in either set.
    pub fn union(&self, other: &SpurSet) -> SpurSet {
        let mut merged = self.clone();
        merged.frequencies.extend(other.frequencies.iter());
        merged
    }

    /// Ascending frequencies.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.frequencies.values().copied()
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    fn key(frequency_hz: f64) -> u64 {
        // fold -0.0 into 0.0
        (frequency_hz + 0.0).to_bits()
    }
}

impl FromIterator<f64> for SpurSet {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut set = SpurSet::new();
        for f in iter {
            set.insert(f);
        }
        set
    }
}

impl Serialize for SpurSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
