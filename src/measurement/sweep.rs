use serde::Serialize;

use crate::error::DriverError;

/// Settings for one spectrum-analyzer sweep.
///
/// The reference level is always 0 dBm; `reference_offset_db` accounts for
/// attenuators between the device under test and the analyzer input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRequest {
    pub center_frequency_hz: f64,
    pub span_hz: f64,
    pub resolution_bandwidth_hz: f64,
    pub video_bandwidth_hz: f64,
    pub reference_offset_db: f64,
    /// Peaks below this level are left out of the peak table.
    pub display_line_db: f64,
    /// When set, a screen capture with this name is taken after the sweep.
    pub screen_capture_name: Option<String>,
}

impl SweepRequest {
    /// Request centred on `center_frequency_hz` with the bench defaults:
    /// 100 MHz span, 1 kHz RBW/VBW, 40 dB offset, 10 dB display line.
    pub fn new(center_frequency_hz: f64) -> Self {
        Self {
            center_frequency_hz,
            span_hz: 100e6,
            resolution_bandwidth_hz: 1000.0,
            video_bandwidth_hz: 1000.0,
            reference_offset_db: 40.0,
            display_line_db: 10.0,
            screen_capture_name: None,
        }
    }

    pub fn with_span(mut self, span_hz: f64) -> Self {
        self.span_hz = span_hz;
        self
    }

    /// Set resolution and video bandwidth together.
    pub fn with_bandwidths(mut self, rbw_hz: f64, vbw_hz: f64) -> Self {
        self.resolution_bandwidth_hz = rbw_hz;
        self.video_bandwidth_hz = vbw_hz;
        self
    }

    pub fn with_reference_offset(mut self, offset_db: f64) -> Self {
        self.reference_offset_db = offset_db;
        self
    }

    pub fn with_display_line(mut self, level_db: f64) -> Self {
        self.display_line_db = level_db;
        self
    }

    pub fn with_screen_capture(mut self, name: impl Into<String>) -> Self {
        self.screen_capture_name = Some(name.into());
        self
    }
}

/// One row of a peak table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub frequency_hz: f64,
    pub amplitude_db: f64,
}

/// Frequency-sorted peaks from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeakTable {
    peaks: Vec<Peak>,
}

impl PeakTable {
    pub fn new(peaks: Vec<Peak>) -> Self {
        Self { peaks }
    }

    /// Build a table from `(frequency, amplitude)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|&(frequency_hz, amplitude_db)| Peak {
                    frequency_hz,
                    amplitude_db,
                })
                .collect(),
        )
    }

    /// Parse a flat `f0,a0,f1,a1,...` payload: even positions are
    /// frequencies, odd positions the matching amplitudes.
    pub fn parse_payload(payload: &str) -> Result<Self, DriverError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(Self::default());
        }

        let values = payload
            .split(',')
            .map(|raw| {
                raw.trim().parse::<f64>().map_err(|_| {
                    DriverError::MalformedResponse(format!(
                        "peak table value '{}' is not numeric",
                        raw.trim()
                    ))
                })
            })
            .collect::<Result<Vec<f64>, DriverError>>()?;

        if values.len() % 2 != 0 {
            return Err(DriverError::MalformedResponse(format!(
                "peak table has {} values, expected frequency/amplitude pairs",
                values.len()
            )));
        }

        Ok(Self::new(
            values
                .chunks_exact(2)
                .map(|pair| Peak {
                    frequency_hz: pair[0],
                    amplitude_db: pair[1],
                })
                .collect(),
        ))
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter()
    }

    pub fn frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        self.peaks.iter().map(|p| p.frequency_hz)
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_splits_into_pairs() {
        let table = PeakTable::parse_payload("7.2e+06,-3.5, 1.44E+07,-48.25\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.peaks()[0].frequency_hz, 7.2e6);
        assert_eq!(table.peaks()[0].amplitude_db, -3.5);
        assert_eq!(table.peaks()[1].frequency_hz, 14.4e6);
        assert_eq!(table.peaks()[1].amplitude_db, -48.25);
    }

    #[test]
    fn odd_payload_is_malformed() {
        let err = PeakTable::parse_payload("7.2e6,-3.5,14.4e6").unwrap_err();
        assert!(matches!(err, DriverError::MalformedResponse(_)));
    }

    #[test]
    fn non_numeric_payload_is_malformed() {
        let err = PeakTable::parse_payload("7.2e6,abc").unwrap_err();
        assert!(matches!(err, DriverError::MalformedResponse(_)));
    }

    #[test]
    fn empty_payload_is_empty_table() {
        assert!(PeakTable::parse_payload("  ").unwrap().is_empty());
    }

    #[test]
    fn request_builder_overrides_defaults() {
        let request = SweepRequest::new(7.2e6)
            .with_span(5e5)
            .with_bandwidths(10_000.0, 3_000.0)
            .with_reference_offset(30.0)
            .with_display_line(-10.0)
            .with_screen_capture("Harmonics");
        assert_eq!(request.span_hz, 5e5);
        assert_eq!(request.resolution_bandwidth_hz, 10_000.0);
        assert_eq!(request.video_bandwidth_hz, 3_000.0);
        assert_eq!(request.reference_offset_db, 30.0);
        assert_eq!(request.display_line_db, -10.0);
        assert_eq!(request.screen_capture_name.as_deref(), Some("Harmonics"));
    }
}
