//! Two-tone intermodulation distortion.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::report::{format_figure, ReportBuilder, ResultTable, TestReport};
use super::{analyzer, generator, mhz, LOAD_OHMS};
use crate::analysis::{
    dbm_to_vpp, find_tolerance_match, relative_power_dbc, two_tone_products, MAX_INTERMOD_ORDER,
};
use crate::config::ConfigError;
use crate::error::{AppResult, BenchError};
use crate::instrument::SineWave;
use crate::measurement::{MeasurementEngine, PeakTable, SweepRequest};
use crate::session::InstrumentSession;

pub const TEST_NAME: &str = "Two-Tone IMD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImdParams {
    pub f1_hz: f64,
    pub f2_hz: f64,
    /// Level of each tone at the AWG output.
    pub tone_level_dbm: f64,
    pub span_hz: f64,
    pub resolution_bandwidth_hz: f64,
    pub max_order: u32,
    pub reference_offset_db: f64,
    pub display_line_db: f64,
    /// How far a peak may sit from a computed tone or product frequency.
    pub tolerance_hz: f64,
}

impl Default for ImdParams {
    fn default() -> Self {
        Self {
            f1_hz: 7.2e6,
            f2_hz: 7.2011e6,
            tone_level_dbm: -4.0,
            span_hz: 1e4,
            resolution_bandwidth_hz: 100.0,
            max_order: 7,
            reference_offset_db: 40.0,
            display_line_db: -10.0,
            tolerance_hz: 50.0,
        }
    }
}

impl ImdParams {
    pub fn center_hz(&self) -> f64 {
        (self.f1_hz + self.f2_hz) / 2.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.f1_hz <= 0.0 || self.f2_hz <= self.f1_hz {
            return Err(ConfigError::ValidationError(format!(
                "IMD tones must satisfy 0 < f1 < f2, got {} and {}",
                self.f1_hz, self.f2_hz
            )));
        }
        if self.max_order > MAX_INTERMOD_ORDER {
            return Err(ConfigError::ValidationError(format!(
                "IMD max_order {} exceeds {}",
                self.max_order, MAX_INTERMOD_ORDER
            )));
        }
        Ok(())
    }
}

/// Drive two tones into the device under test and measure its odd-order
/// products.
///
/// Product levels are reported in dBc against the stronger of the two tones.
/// Both generator outputs are switched off once the sweep ends, whether or
/// not it succeeded.
///
/// # Errors
/// `Config` for invalid tones or order, `NoMatchFound` when either tone is
/// absent from the sweep.
pub async fn run_imd(
    sa: &InstrumentSession,
    awg: &InstrumentSession,
    params: &ImdParams,
) -> AppResult<TestReport> {
    params.validate()?;
    analyzer(sa)?;
    let generator = generator(awg)?;
    let engine = MeasurementEngine::new();
    let mut report = ReportBuilder::start(TEST_NAME);

    info!(
        f1_hz = params.f1_hz,
        f2_hz = params.f2_hz,
        max_order = params.max_order,
        "Starting two-tone IMD test"
    );

    let amplitude_vpp = dbm_to_vpp(params.tone_level_dbm);
    generator.reset().await?;
    for (channel, frequency) in [(1, params.f1_hz), (2, params.f2_hz)] {
        generator.set_output_load(channel, LOAD_OHMS).await?;
        generator
            .sine(channel, SineWave::new(frequency, amplitude_vpp))
            .await?;
        generator.output_on(channel).await?;
    }

    let request = SweepRequest::new(params.center_hz())
        .with_span(params.span_hz)
        .with_bandwidths(params.resolution_bandwidth_hz, params.resolution_bandwidth_hz)
        .with_reference_offset(params.reference_offset_db)
        .with_display_line(params.display_line_db);
    let outcome = engine.run_sweep(sa, &request).await;

    let off = [generator.output_off(1).await, generator.output_off(2).await];
    let outcome = outcome?;
    for result in off {
        result?;
    }

    let peaks = outcome.peaks.unwrap_or_default();
    let tone = |frequency: f64| {
        find_tolerance_match(&peaks, frequency, params.tolerance_hz).ok_or_else(|| {
            BenchError::NoMatchFound {
                frequency_hz: frequency,
                hint: "tone not found in the peak data, check your cabling/setup".to_string(),
            }
        })
    };
    let f1 = tone(params.f1_hz)?;
    let f2 = tone(params.f2_hz)?;
    let reference_dbm = f1.amplitude_db.max(f2.amplitude_db);

    report
        .parameter("Tone 1 Frequency", params.f1_hz / 1e6, Some("MHz"))
        .parameter("Tone 2 Frequency", params.f2_hz / 1e6, Some("MHz"))
        .parameter("Tone Level", params.tone_level_dbm, Some("dBm"))
        .parameter("Span", params.span_hz / 1e3, Some("kHz"))
        .parameter("Maximum Order", params.max_order, None)
        .parameter("Reference Offset", params.reference_offset_db, Some("dB"))
        .parameter("Measurement Threshold", params.display_line_db, Some("dB"));
    report.equipment(sa).await?;
    report.equipment(awg).await?;

    let mut tones = ResultTable::new("Tones", &["Tone", "MHz", "Power", "Unit"]);
    for (label, peak) in [("f1", f1), ("f2", f2)] {
        tones.push_row(vec![
            label.to_string(),
            mhz(peak.frequency_hz),
            format_figure(peak.amplitude_db),
            "dBm".to_string(),
        ]);
    }

    report
        .table(tones)
        .table(product_table(&peaks, params, reference_dbm));
    Ok(report.finish())
}

fn product_table(peaks: &PeakTable, params: &ImdParams, reference_dbm: f64) -> ResultTable {
    let level = |frequency: f64| {
        find_tolerance_match(peaks, frequency, params.tolerance_hz)
            .map(|p| format_figure(relative_power_dbc(p.amplitude_db, reference_dbm)))
            .unwrap_or_else(|| "not detected".to_string())
    };

    let mut table = ResultTable::new(
        "Intermodulation Products",
        &["Order", "Low MHz", "Low Power", "High MHz", "High Power", "Unit"],
    );
    let products = two_tone_products(params.f1_hz, params.f2_hz, params.max_order);
    for (order, (low, high)) in &products.by_order {
        table.push_row(vec![
            order.to_string(),
            mhz(*low),
            level(*low),
            mhz(*high),
            level(*high),
            "dBc".to_string(),
        ]);
    }
    table
}
