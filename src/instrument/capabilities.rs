use async_trait::async_trait;
use std::sync::Arc;

use super::{InstrumentClass, InstrumentIdentity};
use crate::error::DriverError;
use crate::measurement::SweepRequest;

/// Operations every driver supports.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Identity captured when the driver connected.
    async fn identify(&self) -> Result<InstrumentIdentity, DriverError>;

    /// Return the instrument to its power-on state.
    async fn reset(&self) -> Result<(), DriverError>;

    /// `false` once the connection can no longer be trusted to pair commands
    /// with replies. Such a session is reopened on its next load.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Capability for frequency-domain analysis instruments.
///
/// Every method is a blocking request/response against the instrument: the
/// returned future resolves only after the instrument has completed the
/// command, so a caller awaiting each call in turn never overlaps commands.
#[async_trait]
pub trait SpectrumAnalyzer: Instrument {
    /// Select single sweep and apply the frequency plan, levels, bandwidths
    /// and peak-table settings of `request`.
    async fn configure_sweep(&self, request: &SweepRequest) -> Result<(), DriverError>;

    /// Start one sweep and wait for it to finish.
    async fn trigger_sweep(&self) -> Result<(), DriverError>;

    /// Number of rows currently in the peak table.
    async fn peak_count(&self) -> Result<usize, DriverError>;

    /// Raw peak-table payload, comma separated frequency/amplitude values.
    ///
    /// Must not be called while the peak table is empty.
    async fn peak_table_payload(&self) -> Result<String, DriverError>;

    /// Raw screen dump: 11-byte ASCII header followed by bitmap bytes.
    async fn screen_capture(&self) -> Result<Vec<u8>, DriverError>;
}

/// Sine output settings for one generator channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SineWave {
    pub frequency_hz: f64,
    pub amplitude_vpp: f64,
    pub offset_v: f64,
    pub phase_deg: f64,
}

impl SineWave {
    /// Zero offset, zero phase sine.
    pub fn new(frequency_hz: f64, amplitude_vpp: f64) -> Self {
        Self {
            frequency_hz,
            amplitude_vpp,
            offset_v: 0.0,
            phase_deg: 0.0,
        }
    }
}

/// Capability for arbitrary waveform generators.
#[async_trait]
pub trait WaveformGenerator: Instrument {
    async fn set_output_load(&self, channel: u8, ohms: f64) -> Result<(), DriverError>;
    async fn sine(&self, channel: u8, wave: SineWave) -> Result<(), DriverError>;
    async fn output_on(&self, channel: u8) -> Result<(), DriverError>;
    async fn output_off(&self, channel: u8) -> Result<(), DriverError>;
}

/// Capability for local digital I/O adapters.
#[async_trait]
pub trait DigitalIo: Instrument {
    /// Port numbers of the attached devices.
    async fn devices(&self) -> Result<Vec<u16>, DriverError>;
    async fn set_pin(&self, pin: &str, high: bool) -> Result<(), DriverError>;
}

/// Capability-typed handle held by a session.
#[derive(Clone)]
pub enum InstrumentHandle {
    SpectrumAnalyzer(Arc<dyn SpectrumAnalyzer>),
    WaveformGenerator(Arc<dyn WaveformGenerator>),
    DigitalIo(Arc<dyn DigitalIo>),
}

impl InstrumentHandle {
    pub fn class(&self) -> InstrumentClass {
        match self {
            InstrumentHandle::SpectrumAnalyzer(_) => InstrumentClass::SpectrumAnalyzer,
            InstrumentHandle::WaveformGenerator(_) => InstrumentClass::WaveformGenerator,
            InstrumentHandle::DigitalIo(_) => InstrumentClass::DigitalIo,
        }
    }

    pub fn as_spectrum_analyzer(&self) -> Option<Arc<dyn SpectrumAnalyzer>> {
        match self {
            InstrumentHandle::SpectrumAnalyzer(sa) => Some(sa.clone()),
            _ => None,
        }
    }

    pub fn as_waveform_generator(&self) -> Option<Arc<dyn WaveformGenerator>> {
        match self {
            InstrumentHandle::WaveformGenerator(awg) => Some(awg.clone()),
            _ => None,
        }
    }

    pub fn as_digital_io(&self) -> Option<Arc<dyn DigitalIo>> {
        match self {
            InstrumentHandle::DigitalIo(dio) => Some(dio.clone()),
            _ => None,
        }
    }

    pub async fn reset(&self) -> Result<(), DriverError> {
        match self {
            InstrumentHandle::SpectrumAnalyzer(sa) => sa.reset().await,
            InstrumentHandle::WaveformGenerator(awg) => awg.reset().await,
            InstrumentHandle::DigitalIo(dio) => dio.reset().await,
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self {
            InstrumentHandle::SpectrumAnalyzer(sa) => sa.is_healthy(),
            InstrumentHandle::WaveformGenerator(awg) => awg.is_healthy(),
            InstrumentHandle::DigitalIo(dio) => dio.is_healthy(),
        }
    }

    pub async fn identify(&self) -> Result<InstrumentIdentity, DriverError> {
        match self {
            InstrumentHandle::SpectrumAnalyzer(sa) => sa.identify().await,
            InstrumentHandle::WaveformGenerator(awg) => awg.identify().await,
            InstrumentHandle::DigitalIo(dio) => dio.identify().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::{MockSpectrumAnalyzer, MockWaveformGenerator};

    #[tokio::test]
    async fn handle_exposes_only_its_capability() {
        let handle = InstrumentHandle::SpectrumAnalyzer(Arc::new(MockSpectrumAnalyzer::new()));
        assert_eq!(handle.class(), InstrumentClass::SpectrumAnalyzer);
        assert!(handle.as_spectrum_analyzer().is_some());
        assert!(handle.as_waveform_generator().is_none());
        assert!(handle.as_digital_io().is_none());
    }

    #[tokio::test]
    async fn handle_reset_dispatches_to_driver() {
        let awg = Arc::new(MockWaveformGenerator::new());
        let handle = InstrumentHandle::WaveformGenerator(awg.clone());
        handle.reset().await.unwrap();
        assert_eq!(awg.call_log(), vec!["reset".to_string()]);
    }
}
