//! Bench procedures against simulated instruments loaded through the
//! session manager.

use rf_bench::analysis::{dbm_to_vpp, two_tone_products};
use rf_bench::error::BenchError;
use rf_bench::instrument::mock::{MockSpectrumAnalyzer, MockWaveformGenerator};
use rf_bench::instrument::{InstrumentClass, InstrumentDescriptor, InstrumentHandle};
use rf_bench::procedures::{
    run_harmonics, run_imd, run_trx_lo, HarmonicsParams, ImdParams, TrxLoParams,
};
use rf_bench::registry::InstrumentRegistry;
use rf_bench::session::{DriverCatalog, SessionManager, SkipProbe};
use std::sync::Arc;

struct Bench {
    manager: SessionManager,
    sa: Arc<MockSpectrumAnalyzer>,
    awg: Arc<MockWaveformGenerator>,
}

fn bench(sa: MockSpectrumAnalyzer) -> Bench {
    let sa = Arc::new(sa);
    let awg = Arc::new(MockWaveformGenerator::new());

    let registry: InstrumentRegistry = [
        InstrumentDescriptor::local("SA1", InstrumentClass::SpectrumAnalyzer, "sim-sa"),
        InstrumentDescriptor::local("AWG1", InstrumentClass::WaveformGenerator, "sim-awg"),
    ]
    .into_iter()
    .collect();

    let mut catalog = DriverCatalog::new();
    let shared = sa.clone();
    catalog.register("sim-sa", move |_| {
        let sa = shared.clone();
        async move { Ok(InstrumentHandle::SpectrumAnalyzer(sa)) }
    });
    let shared = awg.clone();
    catalog.register("sim-awg", move |_| {
        let awg = shared.clone();
        async move { Ok(InstrumentHandle::WaveformGenerator(awg)) }
    });

    Bench {
        manager: SessionManager::new(registry, catalog, Arc::new(SkipProbe)),
        sa,
        awg,
    }
}

#[tokio::test]
async fn harmonics_screen_is_captured_and_saved() {
    let sa = MockSpectrumAnalyzer::new()
        .with_signals(&[(7.2e6, 30.0), (14.4e6, -12.0), (7.05e6, -15.0)])
        .with_screen(b"BM".iter().copied().cycle().take(600).collect(), 512);
    let bench = bench(sa);
    let sa = bench.manager.load("SA1").await.unwrap();
    let awg = bench.manager.load("AWG1").await.unwrap();

    let params = HarmonicsParams {
        highest_harmonic: 4,
        display_line_db: -20.0,
        full_span_capture: true,
        project_name: "40m QRP".to_string(),
        ..Default::default()
    };
    let report = run_harmonics(&sa, Some(&awg), &params).await.unwrap();

    assert_eq!(report.table("Harmonics").unwrap().len(), 1);
    let spurs = report.table("Spurious Emissions").unwrap();
    assert_eq!(spurs.len(), 1);
    assert_eq!(spurs.cell(0, "Power"), Some("-45.00"));
    assert!(bench.awg.is_on(1));

    let dir = tempfile::tempdir().unwrap();
    let path = report.screen_captures[0].save(dir.path()).await.unwrap();
    assert_eq!(path.file_name().unwrap(), "Harmonics Screen Dump.bmp");
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 512);

    // every sweep leaves the analyzer reset
    assert_eq!(bench.sa.call_log().last().map(String::as_str), Some("reset"));
}

#[tokio::test]
async fn imd_reports_every_order() {
    let (f1, f2) = (14.2e6, 14.2011e6);
    let products = two_tone_products(f1, f2, 7);
    let (low3, high3) = products.get(3).unwrap();
    let sa = MockSpectrumAnalyzer::new().with_signals(&[
        (f1, -2.0),
        (f2, -2.5),
        (low3 + 3.0, -38.0),
        (high3 - 3.0, -39.0),
    ]);
    let bench = bench(sa);
    let sa = bench.manager.load("SA1").await.unwrap();
    let awg = bench.manager.load("AWG1").await.unwrap();

    let params = ImdParams {
        f1_hz: f1,
        f2_hz: f2,
        display_line_db: -60.0,
        ..Default::default()
    };
    let report = run_imd(&sa, &awg, &params).await.unwrap();

    let table = report.table("Intermodulation Products").unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.cell(0, "Low Power"), Some("-36.00"));
    assert_eq!(table.cell(0, "High Power"), Some("-37.00"));
    assert_eq!(table.cell(2, "Order"), Some("7"));
    assert_eq!(table.cell(2, "High Power"), Some("not detected"));
    assert_eq!(bench.awg.channel(1).unwrap().amplitude_vpp, dbm_to_vpp(-4.0));
}

#[tokio::test]
async fn harmonics_without_signal_asks_to_check_setup() {
    let bench = bench(MockSpectrumAnalyzer::new());
    let sa = bench.manager.load("SA1").await.unwrap();
    let err = run_harmonics(&sa, None, &HarmonicsParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::NoMatchFound { .. }));
    assert!(err.to_string().contains("check your cabling/setup"));
}

#[tokio::test]
async fn trx_lo_drives_both_channels() {
    let bench = bench(MockSpectrumAnalyzer::new());
    let awg = bench.manager.load("AWG1").await.unwrap();
    let params = TrxLoParams {
        usb: true,
        lo_swap: true,
        ptt: true,
        ..Default::default()
    };
    let plan = run_trx_lo(&awg, &params).await.unwrap();

    assert_eq!(bench.awg.channel(1).unwrap().frequency_hz, 12.288e6);
    assert_eq!(bench.awg.channel(2).unwrap().frequency_hz, plan.injection_hz);
    assert!(bench.awg.is_on(1) && bench.awg.is_on(2));
}
