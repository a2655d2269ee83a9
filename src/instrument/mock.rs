//! Mock drivers that stand in for bench hardware.
//!
//! They provide:
//! - scripted replies (fixed peak table or a simulated RF scene)
//! - one-shot failure injection per operation
//! - a call log for test verification

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    DigitalIo, Instrument, InstrumentIdentity, SineWave, SpectrumAnalyzer, WaveformGenerator,
};
use crate::error::DriverError;
use crate::measurement::SweepRequest;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call log and failure injection shared by every mock.
#[derive(Clone, Default)]
struct CallRecorder {
    log: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<Mutex<Option<String>>>,
}

impl CallRecorder {
    /// Log `call`; fail if a failure was injected for `operation`.
    fn record(&self, operation: &str, call: String) -> Result<(), DriverError> {
        lock(&self.log).push(call);
        let mut fail_next = lock(&self.fail_next);
        if fail_next.as_deref() == Some(operation) {
            *fail_next = None;
            return Err(DriverError::Instrument(format!(
                "Injected failure in {}",
                operation
            )));
        }
        Ok(())
    }

    fn fail_on(&self, operation: &str) {
        *lock(&self.fail_next) = Some(operation.to_string());
    }

    fn calls(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    fn clear(&self) {
        lock(&self.log).clear();
    }
}

fn mock_identity(model: &str) -> InstrumentIdentity {
    InstrumentIdentity {
        make: "Mock Instruments".to_string(),
        model: model.to_string(),
        serial_number: "MOCK0001".to_string(),
        firmware_version: "1.0".to_string(),
    }
}

enum PeakSource {
    /// Same table for every sweep.
    Fixed(Vec<(f64, f64)>),
    /// Tones present at the input; a sweep reports those inside its window
    /// and at or above its display line.
    Scene(Vec<(f64, f64)>),
}

/// Simulated spectrum analyzer.
///
/// # Example
///
/// ```
/// use rf_bench::instrument::mock::MockSpectrumAnalyzer;
///
/// let sa = MockSpectrumAnalyzer::new().with_signals(&[(7.2e6, -3.0), (14.4e6, -52.0)]);
/// assert!(sa.call_log().is_empty());
/// ```
pub struct MockSpectrumAnalyzer {
    identity: InstrumentIdentity,
    source: PeakSource,
    screen: Option<Vec<u8>>,
    configured: Mutex<Option<SweepRequest>>,
    in_sync: AtomicBool,
    calls: CallRecorder,
}

impl Default for MockSpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpectrumAnalyzer {
    /// Analyzer with an empty peak table and no screen.
    pub fn new() -> Self {
        Self {
            identity: mock_identity("MockSA"),
            source: PeakSource::Fixed(Vec::new()),
            screen: None,
            configured: Mutex::new(None),
            in_sync: AtomicBool::new(true),
            calls: CallRecorder::default(),
        }
    }

    /// Report this peak table after every sweep.
    pub fn with_peaks(mut self, peaks: &[(f64, f64)]) -> Self {
        self.source = PeakSource::Fixed(peaks.to_vec());
        self
    }

    /// Simulate these tones at the analyzer input.
    pub fn with_signals(mut self, tones: &[(f64, f64)]) -> Self {
        self.source = PeakSource::Scene(tones.to_vec());
        self
    }

    /// Screen dump of `payload`, declared as `declared_size` bytes.
    pub fn with_screen(mut self, payload: Vec<u8>, declared_size: usize) -> Self {
        let mut raw = format!("#9{:09}", declared_size).into_bytes();
        raw.extend(payload);
        self.screen = Some(raw);
        self
    }

    /// Fail the next call to `operation` (e.g. `"peak_count"`).
    pub fn fail_on(&self, operation: &str) {
        self.calls.fail_on(operation);
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.calls()
    }

    pub fn clear_log(&self) {
        self.calls.clear();
    }

    /// Report the connection as out of sync from now on.
    pub fn lose_sync(&self) {
        self.in_sync.store(false, Ordering::SeqCst);
    }

    fn current_peaks(&self) -> Vec<(f64, f64)> {
        match &self.source {
            PeakSource::Fixed(peaks) => peaks.clone(),
            PeakSource::Scene(tones) => {
                let configured = lock(&self.configured);
                let Some(request) = configured.as_ref() else {
                    return Vec::new();
                };
                let low = request.center_frequency_hz - request.span_hz / 2.0;
                let high = request.center_frequency_hz + request.span_hz / 2.0;
                let mut peaks: Vec<(f64, f64)> = tones
                    .iter()
                    .copied()
                    .filter(|&(f, a)| f >= low && f <= high && a >= request.display_line_db)
                    .collect();
                peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
                peaks
            }
        }
    }
}

#[async_trait]
impl Instrument for MockSpectrumAnalyzer {
    async fn identify(&self) -> Result<InstrumentIdentity, DriverError> {
        self.calls.record("identify", "identify".into())?;
        Ok(self.identity.clone())
    }

    async fn reset(&self) -> Result<(), DriverError> {
        self.calls.record("reset", "reset".into())?;
        *lock(&self.configured) = None;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.in_sync.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpectrumAnalyzer for MockSpectrumAnalyzer {
    async fn configure_sweep(&self, request: &SweepRequest) -> Result<(), DriverError> {
        self.calls.record(
            "configure_sweep",
            format!(
                "configure_sweep: {} Hz span {} Hz",
                request.center_frequency_hz, request.span_hz
            ),
        )?;
        *lock(&self.configured) = Some(request.clone());
        Ok(())
    }

    async fn trigger_sweep(&self) -> Result<(), DriverError> {
        self.calls.record("trigger_sweep", "trigger_sweep".into())
    }

    async fn peak_count(&self) -> Result<usize, DriverError> {
        self.calls.record("peak_count", "peak_count".into())?;
        Ok(self.current_peaks().len())
    }

    async fn peak_table_payload(&self) -> Result<String, DriverError> {
        self.calls
            .record("peak_table_payload", "peak_table_payload".into())?;
        let peaks = self.current_peaks();
        if peaks.is_empty() {
            return Err(DriverError::Instrument(
                "peak table payload requested with no peaks".into(),
            ));
        }
        Ok(peaks
            .iter()
            .map(|(f, a)| format!("{:e},{}", f, a))
            .collect::<Vec<_>>()
            .join(","))
    }

    async fn screen_capture(&self) -> Result<Vec<u8>, DriverError> {
        self.calls.record("screen_capture", "screen_capture".into())?;
        self.screen
            .clone()
            .ok_or_else(|| DriverError::Instrument("no screen configured".into()))
    }
}

/// Simulated two-channel waveform generator.
pub struct MockWaveformGenerator {
    identity: InstrumentIdentity,
    channels: Mutex<HashMap<u8, SineWave>>,
    enabled: Mutex<HashMap<u8, bool>>,
    calls: CallRecorder,
}

impl Default for MockWaveformGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWaveformGenerator {
    pub fn new() -> Self {
        Self {
            identity: mock_identity("MockAWG"),
            channels: Mutex::new(HashMap::new()),
            enabled: Mutex::new(HashMap::new()),
            calls: CallRecorder::default(),
        }
    }

    /// Last sine programmed on `channel`.
    pub fn channel(&self, channel: u8) -> Option<SineWave> {
        lock(&self.channels).get(&channel).copied()
    }

    pub fn is_on(&self, channel: u8) -> bool {
        lock(&self.enabled).get(&channel).copied().unwrap_or(false)
    }

    pub fn fail_on(&self, operation: &str) {
        self.calls.fail_on(operation);
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.calls()
    }

    fn check_channel(channel: u8) -> Result<(), DriverError> {
        if channel == 1 || channel == 2 {
            Ok(())
        } else {
            Err(DriverError::InvalidArgument(format!(
                "channel {} does not exist",
                channel
            )))
        }
    }
}

#[async_trait]
impl Instrument for MockWaveformGenerator {
    async fn identify(&self) -> Result<InstrumentIdentity, DriverError> {
        self.calls.record("identify", "identify".into())?;
        Ok(self.identity.clone())
    }

    async fn reset(&self) -> Result<(), DriverError> {
        self.calls.record("reset", "reset".into())?;
        lock(&self.channels).clear();
        lock(&self.enabled).clear();
        Ok(())
    }
}

#[async_trait]
impl WaveformGenerator for MockWaveformGenerator {
    async fn set_output_load(&self, channel: u8, ohms: f64) -> Result<(), DriverError> {
        Self::check_channel(channel)?;
        self.calls.record(
            "set_output_load",
            format!("set_output_load: ch{} {} ohm", channel, ohms),
        )
    }

    async fn sine(&self, channel: u8, wave: SineWave) -> Result<(), DriverError> {
        Self::check_channel(channel)?;
        self.calls.record(
            "sine",
            format!("sine: ch{} {} Hz", channel, wave.frequency_hz),
        )?;
        lock(&self.channels).insert(channel, wave);
        Ok(())
    }

    async fn output_on(&self, channel: u8) -> Result<(), DriverError> {
        Self::check_channel(channel)?;
        self.calls
            .record("output_on", format!("output_on: ch{}", channel))?;
        lock(&self.enabled).insert(channel, true);
        Ok(())
    }

    async fn output_off(&self, channel: u8) -> Result<(), DriverError> {
        Self::check_channel(channel)?;
        self.calls
            .record("output_off", format!("output_off: ch{}", channel))?;
        lock(&self.enabled).insert(channel, false);
        Ok(())
    }
}

/// Pin names of the I2C/SPI adapter header.
const DIO_PINS: [&str; 6] = ["SCL", "SDA", "MISO", "SCLK", "MOSI", "SS"];

/// Simulated local-bus digital I/O adapter.
pub struct MockDigitalIo {
    identity: InstrumentIdentity,
    ports: Vec<u16>,
    pins: Mutex<HashMap<&'static str, bool>>,
    calls: CallRecorder,
}

impl Default for MockDigitalIo {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDigitalIo {
    /// Adapter with a single device on port 0.
    pub fn new() -> Self {
        Self {
            identity: mock_identity("MockDIO"),
            ports: vec![0],
            pins: Mutex::new(HashMap::new()),
            calls: CallRecorder::default(),
        }
    }

    pub fn pin(&self, pin: &str) -> Option<bool> {
        lock(&self.pins).get(pin).copied()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.calls()
    }
}

#[async_trait]
impl Instrument for MockDigitalIo {
    async fn identify(&self) -> Result<InstrumentIdentity, DriverError> {
        self.calls.record("identify", "identify".into())?;
        Ok(self.identity.clone())
    }

    async fn reset(&self) -> Result<(), DriverError> {
        self.calls.record("reset", "reset".into())?;
        lock(&self.pins).clear();
        Ok(())
    }
}

#[async_trait]
impl DigitalIo for MockDigitalIo {
    async fn devices(&self) -> Result<Vec<u16>, DriverError> {
        self.calls.record("devices", "devices".into())?;
        if self.ports.is_empty() {
            return Err(DriverError::Instrument("No devices detected".into()));
        }
        Ok(self.ports.clone())
    }

    async fn set_pin(&self, pin: &str, high: bool) -> Result<(), DriverError> {
        let name = DIO_PINS
            .iter()
            .copied()
            .find(|&p| p == pin)
            .ok_or_else(|| DriverError::InvalidArgument(format!("invalid pin name {}", pin)))?;
        self.calls
            .record("set_pin", format!("set_pin: {} {}", pin, high))?;
        lock(&self.pins).insert(name, high);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scene_filters_by_window_and_display_line() {
        let sa = MockSpectrumAnalyzer::new().with_signals(&[
            (7.2e6, -3.0),
            (7.3e6, -60.0),
            (14.4e6, -45.0),
        ]);
        sa.configure_sweep(
            &SweepRequest::new(7.2e6)
                .with_span(2e6)
                .with_display_line(-50.0),
        )
        .await
        .unwrap();
        assert_eq!(sa.peak_count().await.unwrap(), 1);
        assert_eq!(sa.peak_table_payload().await.unwrap(), "7.2e6,-3");
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let sa = MockSpectrumAnalyzer::new();
        sa.fail_on("reset");
        assert!(sa.reset().await.is_err());
        assert!(sa.reset().await.is_ok());
        assert_eq!(sa.call_log(), vec!["reset", "reset"]);
    }

    #[tokio::test]
    async fn generator_tracks_channel_state() {
        let awg = MockWaveformGenerator::new();
        awg.sine(2, SineWave::new(12.288e6, 2.0)).await.unwrap();
        awg.output_on(2).await.unwrap();
        assert!(awg.is_on(2));
        assert_eq!(awg.channel(2).unwrap().frequency_hz, 12.288e6);
        assert!(awg.output_on(3).await.is_err());
    }

    #[tokio::test]
    async fn digital_io_rejects_unknown_pin() {
        let dio = MockDigitalIo::new();
        assert_eq!(dio.devices().await.unwrap(), vec![0]);
        dio.set_pin("SDA", true).await.unwrap();
        assert_eq!(dio.pin("SDA"), Some(true));
        assert!(matches!(
            dio.set_pin("GPIO9", true).await,
            Err(DriverError::InvalidArgument(_))
        ));
    }
}
