//! Sweep orchestration.
//!
//! One call drives a complete single-sweep cycle against a spectrum analyzer:
//!
//! 1. reset
//! 2. configure (single sweep, frequency plan, levels, bandwidths, peak table)
//! 3. trigger twice; the second trigger makes sure the sweep that is read
//!    back was started after the configuration was latched
//! 4. read the peak count, and the payload only when the count is non-zero
//!    (asking a DSA815 for an empty peak table hangs it until power cycle)
//! 5. take the screen capture if one was requested
//! 6. reset again so the next caller finds the instrument idle
//!
//! Every step awaits the previous one; nothing is retried.

use serde::Serialize;
use tracing::{debug, info};

use super::{PeakTable, ScreenCapture, SweepRequest};
use crate::error::{AppResult, BenchError, DriverError};
use crate::instrument::{InstrumentClass, SpectrumAnalyzer};
use crate::session::InstrumentSession;

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepOutcome {
    /// `None` when the analyzer reported no peaks above the display line.
    pub peaks: Option<PeakTable>,
    pub screen_capture: Option<ScreenCapture>,
}

impl SweepOutcome {
    /// Peaks, or an empty slice when nothing was detected.
    pub fn peaks_or_empty(&self) -> &[crate::measurement::Peak] {
        self.peaks.as_ref().map(PeakTable::peaks).unwrap_or(&[])
    }
}

/// Runs sweeps against loaded spectrum-analyzer sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementEngine;

impl MeasurementEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run one sweep against a cached session.
    ///
    /// # Errors
    /// `CapabilityMismatch` if the session is not a spectrum analyzer;
    /// `Driver` for any instrument failure along the way.
    pub async fn run_sweep(
        &self,
        session: &InstrumentSession,
        request: &SweepRequest,
    ) -> AppResult<SweepOutcome> {
        let analyzer = session.handle().as_spectrum_analyzer().ok_or_else(|| {
            BenchError::CapabilityMismatch {
                name: session.name().to_string(),
                expected: InstrumentClass::SpectrumAnalyzer,
            }
        })?;
        info!(
            instrument = session.name(),
            center_hz = request.center_frequency_hz,
            span_hz = request.span_hz,
            "Running sweep"
        );
        Ok(self.sweep(analyzer.as_ref(), request).await?)
    }

    /// Run one sweep directly against a driver.
    pub async fn sweep(
        &self,
        analyzer: &dyn SpectrumAnalyzer,
        request: &SweepRequest,
    ) -> Result<SweepOutcome, DriverError> {
        analyzer.reset().await?;
        analyzer.configure_sweep(request).await?;

        analyzer.trigger_sweep().await?;
        analyzer.trigger_sweep().await?;

        let count = analyzer.peak_count().await?;
        let payload = if count > 0 {
            Some(analyzer.peak_table_payload().await?)
        } else {
            None
        };
        debug!(peaks = count, "Peak table read");

        let screen_capture = match &request.screen_capture_name {
            Some(name) => {
                let raw = analyzer.screen_capture().await?;
                Some(ScreenCapture::decode(name.clone(), &raw)?)
            }
            None => None,
        };

        analyzer.reset().await?;

        let peaks = payload
            .as_deref()
            .map(PeakTable::parse_payload)
            .transpose()?;

        Ok(SweepOutcome {
            peaks,
            screen_capture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::MockSpectrumAnalyzer;

    #[tokio::test]
    async fn sweep_follows_protocol_order() {
        let sa = MockSpectrumAnalyzer::new().with_peaks(&[(7.2e6, -3.0), (14.4e6, -50.0)]);
        let outcome = MeasurementEngine::new()
            .sweep(&sa, &SweepRequest::new(7.2e6).with_span(5e5))
            .await
            .unwrap();

        assert_eq!(
            sa.call_log(),
            vec![
                "reset",
                "configure_sweep: 7200000 Hz span 500000 Hz",
                "trigger_sweep",
                "trigger_sweep",
                "peak_count",
                "peak_table_payload",
                "reset",
            ]
        );
        let peaks = outcome.peaks.unwrap();
        assert_eq!(peaks.len(), 2);
        assert!(outcome.screen_capture.is_none());
    }

    #[tokio::test]
    async fn zero_peaks_never_reads_payload() {
        let sa = MockSpectrumAnalyzer::new();
        let outcome = MeasurementEngine::new()
            .sweep(&sa, &SweepRequest::new(7.2e6))
            .await
            .unwrap();

        assert!(outcome.peaks.is_none());
        assert!(outcome.peaks_or_empty().is_empty());
        assert!(!sa.call_log().iter().any(|c| c == "peak_table_payload"));
    }

    #[tokio::test]
    async fn capture_is_taken_before_final_reset() {
        let sa = MockSpectrumAnalyzer::new()
            .with_peaks(&[(7.2e6, -3.0)])
            .with_screen(vec![0x42; 300], 256);
        let outcome = MeasurementEngine::new()
            .sweep(&sa, &SweepRequest::new(7.2e6).with_screen_capture("SA"))
            .await
            .unwrap();

        let log = sa.call_log();
        let capture_at = log.iter().position(|c| c == "screen_capture").unwrap();
        assert_eq!(capture_at, log.len() - 2);
        assert_eq!(log.last().map(String::as_str), Some("reset"));

        let capture = outcome.screen_capture.unwrap();
        assert_eq!(capture.name, "SA");
        assert_eq!(capture.image_bytes.len(), 256);
    }

    #[tokio::test]
    async fn capture_survives_empty_sweep() {
        let sa = MockSpectrumAnalyzer::new().with_screen(vec![1; 20], 10);
        let outcome = MeasurementEngine::new()
            .sweep(&sa, &SweepRequest::new(1e6).with_screen_capture("empty"))
            .await
            .unwrap();
        assert!(outcome.peaks.is_none());
        assert_eq!(outcome.screen_capture.unwrap().size_bytes, 10);
    }

    #[tokio::test]
    async fn driver_failure_propagates() {
        let sa = MockSpectrumAnalyzer::new().with_peaks(&[(7.2e6, -3.0)]);
        sa.fail_on("peak_count");
        let result = MeasurementEngine::new()
            .sweep(&sa, &SweepRequest::new(7.2e6))
            .await;
        assert!(result.is_err());
        assert_eq!(sa.call_log().last().map(String::as_str), Some("peak_count"));
    }
}
