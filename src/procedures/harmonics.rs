//! Harmonics and close-in spurious emissions of a transmitter.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::report::{format_figure, ReportBuilder, ResultTable, TestReport};
use super::{analyzer, generator, mhz, LOAD_OHMS};
use crate::analysis::{
    dbm_to_vpp, dbm_to_watts, find_exact_match, harmonic_series, relative_power_dbc, spur_set,
    MAX_HARMONIC,
};
use crate::config::ConfigError;
use crate::error::{AppResult, BenchError};
use crate::instrument::SineWave;
use crate::measurement::{MeasurementEngine, SweepOutcome, SweepRequest};
use crate::session::InstrumentSession;

pub const TEST_NAME: &str = "Harmonics and Spurs";
pub const SCREEN_CAPTURE_NAME: &str = "Harmonics Screen Dump";

/// Span of the narrow sweeps around the fundamental and each harmonic.
pub const NARROW_SPAN_HZ: f64 = 5e5;
/// Span of the wider close-in spur sweep.
pub const WIDE_SPAN_HZ: f64 = 2e6;
const NARROW_BANDWIDTH_HZ: f64 = 1e3;
const FULL_SPAN_BANDWIDTH_HZ: f64 = 1e4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicsParams {
    pub fundamental_hz: f64,
    pub highest_harmonic: u32,
    pub reference_offset_db: f64,
    pub display_line_db: f64,
    /// Tone level when an AWG stands in for the transmitter.
    pub awg_tone_level_dbm: f64,
    /// Capture the analyzer screen over fundamental through highest harmonic.
    pub full_span_capture: bool,
    pub project_name: String,
    pub test_id: String,
}

impl Default for HarmonicsParams {
    fn default() -> Self {
        Self {
            fundamental_hz: 7.2e6,
            highest_harmonic: 7,
            reference_offset_db: 40.0,
            display_line_db: -10.0,
            awg_tone_level_dbm: -40.0,
            full_span_capture: false,
            project_name: String::new(),
            test_id: String::new(),
        }
    }
}

impl HarmonicsParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fundamental_hz <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Harmonics fundamental must be positive, got {}",
                self.fundamental_hz
            )));
        }
        if self.highest_harmonic > MAX_HARMONIC {
            return Err(ConfigError::ValidationError(format!(
                "Highest harmonic {} exceeds {}",
                self.highest_harmonic, MAX_HARMONIC
            )));
        }
        Ok(())
    }

    fn sweep(&self, center_hz: f64, span_hz: f64, bandwidth_hz: f64) -> SweepRequest {
        SweepRequest::new(center_hz)
            .with_span(span_hz)
            .with_bandwidths(bandwidth_hz, bandwidth_hz)
            .with_reference_offset(self.reference_offset_db)
            .with_display_line(self.display_line_db)
    }

    /// Span covering the fundamental through the highest harmonic, plus 1 MHz.
    pub fn full_span_hz(&self) -> f64 {
        self.fundamental_hz * f64::from(self.highest_harmonic) + 1e6
    }
}

/// Measure harmonics and close-in spurs on `sa`.
///
/// When `awg` is given it generates the fundamental on channel 1 at the
/// configured tone level, standing in for the transmitter.
///
/// # Errors
/// `Config` for an invalid fundamental or harmonic count, `NoMatchFound`
/// when the fundamental is missing from the close-in sweep; session and
/// driver errors otherwise.
pub async fn run_harmonics(
    sa: &InstrumentSession,
    awg: Option<&InstrumentSession>,
    params: &HarmonicsParams,
) -> AppResult<TestReport> {
    params.validate()?;
    analyzer(sa)?;
    let engine = MeasurementEngine::new();
    let mut report = ReportBuilder::start(TEST_NAME);
    let fundamental = params.fundamental_hz;
    let harmonics = harmonic_series(fundamental, params.highest_harmonic);
    let mut expected = Vec::with_capacity(harmonics.len() + 1);
    expected.push(fundamental);
    expected.extend_from_slice(&harmonics);

    info!(
        fundamental_hz = fundamental,
        highest = params.highest_harmonic,
        awg = awg.is_some(),
        "Starting harmonics and spurs test"
    );

    if let Some(awg) = awg {
        let awg = generator(awg)?;
        awg.reset().await?;
        awg.set_output_load(1, LOAD_OHMS).await?;
        awg.sine(
            1,
            SineWave::new(fundamental, dbm_to_vpp(params.awg_tone_level_dbm)),
        )
        .await?;
        awg.output_on(1).await?;
    }

    let close_in = engine
        .run_sweep(sa, &params.sweep(fundamental, NARROW_SPAN_HZ, NARROW_BANDWIDTH_HZ))
        .await?;
    let fundamental_dbm = close_in
        .peaks
        .as_ref()
        .and_then(|t| find_exact_match(t, fundamental))
        .ok_or_else(|| BenchError::NoMatchFound {
            frequency_hz: fundamental,
            hint: "did not see the fundamental in the peak data, check your cabling/setup \
                   and the fundamental frequency parameter"
                .to_string(),
        })?;

    let wide = engine
        .run_sweep(sa, &params.sweep(fundamental, WIDE_SPAN_HZ, NARROW_BANDWIDTH_HZ))
        .await?;

    let mut harmonic_sweeps = Vec::with_capacity(harmonics.len());
    for &harmonic in &harmonics {
        let outcome = engine
            .run_sweep(sa, &params.sweep(harmonic, NARROW_SPAN_HZ, NARROW_BANDWIDTH_HZ))
            .await?;
        harmonic_sweeps.push(outcome);
    }

    if params.full_span_capture {
        let span = params.full_span_hz();
        let request = params
            .sweep(span / 2.0, span, FULL_SPAN_BANDWIDTH_HZ)
            .with_screen_capture(SCREEN_CAPTURE_NAME);
        if let Some(capture) = engine.run_sweep(sa, &request).await?.screen_capture {
            report.screen_capture(capture);
        }
    }

    report
        .parameter("Project Name", params.project_name.as_str(), None)
        .parameter("Test ID", params.test_id.as_str(), None)
        .parameter("Fundamental Frequency", fundamental / 1e6, Some("MHz"))
        .parameter("Reference Offset", params.reference_offset_db, Some("dB"))
        .parameter("Measurement Threshold", params.display_line_db, Some("dB"))
        .parameter("Highest Harmonic", params.highest_harmonic, None)
        .parameter("Use AWG", if awg.is_some() { "YES" } else { "NO" }, None);
    if awg.is_some() {
        report.parameter("AWG Tone Level", params.awg_tone_level_dbm, Some("dBm"));
    }

    report.equipment(sa).await?;
    if let Some(awg) = awg {
        report.equipment(awg).await?;
    }

    report
        .table(spur_table(&expected, fundamental, fundamental_dbm, &close_in, &wide))
        .table(harmonic_table(&harmonics, fundamental_dbm, &harmonic_sweeps))
        .table(output_power_table(fundamental_dbm));

    info!(fundamental_dbm, "Harmonics and spurs test complete");
    Ok(report.finish())
}

fn spur_table(
    expected: &[f64],
    fundamental: f64,
    fundamental_dbm: f64,
    close_in: &SweepOutcome,
    wide: &SweepOutcome,
) -> ResultTable {
    let empty = Default::default();
    let close_in = close_in.peaks.as_ref().unwrap_or(&empty);
    let wide = wide.peaks.as_ref().unwrap_or(&empty);

    let mut spurs = spur_set(expected, close_in).union(&spur_set(expected, wide));
    spurs.remove(fundamental);

    let mut table = ResultTable::new("Spurious Emissions", &["Spur", "MHz", "Power", "Unit"]);
    for frequency in spurs.iter() {
        let Some(amplitude) =
            find_exact_match(close_in, frequency).or_else(|| find_exact_match(wide, frequency))
        else {
            warn!(frequency_hz = frequency, "Spur missing from both peak tables");
            continue;
        };
        table.push_row(vec![
            (table.len() + 1).to_string(),
            mhz(frequency),
            format_figure(relative_power_dbc(amplitude, fundamental_dbm)),
            "dBc".to_string(),
        ]);
    }
    table
}

fn harmonic_table(harmonics: &[f64], fundamental_dbm: f64, sweeps: &[SweepOutcome]) -> ResultTable {
    let mut table = ResultTable::new("Harmonics", &["Harmonic", "MHz", "Power", "Unit"]);
    for (index, (&harmonic, outcome)) in harmonics.iter().zip(sweeps).enumerate() {
        if let Some(amplitude) = outcome
            .peaks
            .as_ref()
            .and_then(|t| find_exact_match(t, harmonic))
        {
            table.push_row(vec![
                (index + 2).to_string(),
                mhz(harmonic),
                format_figure(relative_power_dbc(amplitude, fundamental_dbm)),
                "dBc".to_string(),
            ]);
        }
    }
    table
}

fn output_power_table(fundamental_dbm: f64) -> ResultTable {
    let mut table = ResultTable::new("Output Power", &["Quantity", "Value", "Unit"]);
    table.push_row(vec![
        "Output Power".to_string(),
        format_figure(fundamental_dbm),
        "dBm".to_string(),
    ]);
    table.push_row(vec![
        "Output Power".to_string(),
        format_figure(dbm_to_watts(fundamental_dbm)),
        "W".to_string(),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::{MockSpectrumAnalyzer, MockWaveformGenerator};
    use crate::instrument::{InstrumentClass, InstrumentDescriptor, InstrumentHandle};
    use std::sync::Arc;

    fn sa_session(sa: Arc<MockSpectrumAnalyzer>) -> InstrumentSession {
        InstrumentSession::new(
            InstrumentDescriptor::networked(
                "SA1",
                InstrumentClass::SpectrumAnalyzer,
                "mock-sa",
                "DSA-815",
            ),
            InstrumentHandle::SpectrumAnalyzer(sa),
        )
    }

    fn transmitter() -> MockSpectrumAnalyzer {
        // 37 dBm carrier, second and third harmonic, two close-in spurs
        MockSpectrumAnalyzer::new().with_signals(&[
            (7.1e6, -6.0),
            (7.2e6, 37.0),
            (7.3e6, -8.5),
            (14.4e6, -3.0),
            (21.6e6, -9.0),
        ])
    }

    #[tokio::test]
    async fn oversized_screen_is_rejected_before_sweeping() {
        let sa = Arc::new(transmitter());
        let params = HarmonicsParams {
            highest_harmonic: MAX_HARMONIC + 1,
            ..Default::default()
        };
        let err = run_harmonics(&sa_session(sa.clone()), None, &params)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::Config(ConfigError::ValidationError(_))
        ));
        assert!(sa.call_log().is_empty());
    }

    #[test]
    fn fundamental_must_be_positive() {
        let params = HarmonicsParams {
            fundamental_hz: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        assert!(HarmonicsParams::default().validate().is_ok());
    }

    #[tokio::test]
    async fn reports_spurs_harmonics_and_power() {
        let sa = Arc::new(transmitter());
        let params = HarmonicsParams {
            highest_harmonic: 3,
            ..Default::default()
        };
        let report = run_harmonics(&sa_session(sa), None, &params).await.unwrap();

        let spurs = report.table("Spurious Emissions").unwrap();
        assert_eq!(spurs.len(), 2);
        assert_eq!(spurs.cell(0, "MHz"), Some("7.1"));
        assert_eq!(spurs.cell(0, "Power"), Some("-43.00"));
        assert_eq!(spurs.cell(1, "Spur"), Some("2"));

        let harmonics = report.table("Harmonics").unwrap();
        assert_eq!(harmonics.len(), 2);
        assert_eq!(harmonics.cell(0, "Harmonic"), Some("2"));
        assert_eq!(harmonics.cell(0, "Power"), Some("-40.00"));
        assert_eq!(harmonics.cell(1, "Power"), Some("-46.00"));

        let power = report.table("Output Power").unwrap();
        assert_eq!(power.cell(0, "Value"), Some("37.00"));
        assert_eq!(power.cell(1, "Value"), Some("5.01"));
        assert_eq!(report.equipment.len(), 1);
        assert!(report.screen_captures.is_empty());
    }

    #[tokio::test]
    async fn missing_fundamental_is_no_match() {
        let sa = Arc::new(MockSpectrumAnalyzer::new().with_signals(&[(7.25e6, 10.0)]));
        let err = run_harmonics(&sa_session(sa.clone()), None, &HarmonicsParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::NoMatchFound { frequency_hz, .. } if frequency_hz == 7.2e6));
        // the 2 MHz sweep never ran
        let sweeps = sa
            .call_log()
            .iter()
            .filter(|c| c.starts_with("configure_sweep"))
            .count();
        assert_eq!(sweeps, 1);
    }

    #[tokio::test]
    async fn awg_generates_the_fundamental() {
        let sa = Arc::new(transmitter());
        let awg = Arc::new(MockWaveformGenerator::new());
        let awg_session = InstrumentSession::new(
            InstrumentDescriptor::networked(
                "AWG1",
                InstrumentClass::WaveformGenerator,
                "mock-awg",
                "SDG-1032X",
            ),
            InstrumentHandle::WaveformGenerator(awg.clone()),
        );
        let params = HarmonicsParams {
            highest_harmonic: 2,
            ..Default::default()
        };
        let report = run_harmonics(&sa_session(sa), Some(&awg_session), &params)
            .await
            .unwrap();

        let wave = awg.channel(1).unwrap();
        assert_eq!(wave.frequency_hz, 7.2e6);
        assert!((wave.amplitude_vpp - dbm_to_vpp(-40.0)).abs() < 1e-12);
        assert!(awg.is_on(1));
        assert_eq!(report.parameter("Use AWG"), Some(&serde_json::json!("YES")));
        assert_eq!(report.equipment.len(), 2);
    }

    #[tokio::test]
    async fn full_span_capture_is_attached() {
        let sa = Arc::new(transmitter().with_screen(vec![0x42; 64], 32));
        let params = HarmonicsParams {
            highest_harmonic: 3,
            full_span_capture: true,
            ..Default::default()
        };
        let report = run_harmonics(&sa_session(sa.clone()), None, &params)
            .await
            .unwrap();

        assert_eq!(report.screen_captures.len(), 1);
        assert_eq!(report.screen_captures[0].name, SCREEN_CAPTURE_NAME);
        assert_eq!(report.screen_captures[0].size_bytes, 32);
        let full_span = params.full_span_hz();
        assert!(sa.call_log().contains(&format!(
            "configure_sweep: {} Hz span {} Hz",
            full_span / 2.0,
            full_span
        )));
    }
}
