//! Siglent SDG1032X two-channel waveform generator driver.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::scpi::{ScpiTransport, TcpScpiTransportBuilder, DEFAULT_SCPI_PORT};
use super::{Instrument, InstrumentIdentity, SineWave, WaveformGenerator};
use crate::error::DriverError;

const IDENTITY_PREFIX: &str = "Siglent Technologies,SDG1032X";
const CHANNELS: u8 = 2;

pub struct Sdg1032x {
    transport: Arc<dyn ScpiTransport>,
    identity: InstrumentIdentity,
}

impl Sdg1032x {
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self, DriverError> {
        let transport = TcpScpiTransportBuilder::new(address)
            .with_port(DEFAULT_SCPI_PORT)
            .with_timeout(timeout)
            .connect()
            .await?;
        Self::with_transport(Arc::new(transport)).await
    }

    pub async fn with_transport(transport: Arc<dyn ScpiTransport>) -> Result<Self, DriverError> {
        let idn = transport.query("*IDN?").await?;
        if !idn.starts_with(IDENTITY_PREFIX) {
            return Err(DriverError::IdentityMismatch(idn));
        }
        let identity = InstrumentIdentity::parse_idn(&idn)?;
        info!(serial = %identity.serial_number, "SDG1032X connected");

        let generator = Self {
            transport,
            identity,
        };
        generator.reset().await?;
        Ok(generator)
    }

    fn channel_prefix(channel: u8) -> Result<String, DriverError> {
        if channel == 0 || channel > CHANNELS {
            return Err(DriverError::InvalidArgument(format!(
                "SDG1032X has no channel {}",
                channel
            )));
        }
        Ok(format!("C{}", channel))
    }
}

#[async_trait]
impl Instrument for Sdg1032x {
    async fn identify(&self) -> Result<InstrumentIdentity, DriverError> {
        Ok(self.identity.clone())
    }

    async fn reset(&self) -> Result<(), DriverError> {
        self.transport.write("*RST").await
    }

    fn is_healthy(&self) -> bool {
        self.transport.is_in_sync()
    }
}

#[async_trait]
impl WaveformGenerator for Sdg1032x {
    async fn set_output_load(&self, channel: u8, ohms: f64) -> Result<(), DriverError> {
        let ch = Self::channel_prefix(channel)?;
        if ohms <= 0.0 {
            return Err(DriverError::InvalidArgument(format!(
                "output load must be positive, got {}",
                ohms
            )));
        }
        self.transport
            .write(&format!("{}:OUTP LOAD,{}", ch, ohms))
            .await
    }

    async fn sine(&self, channel: u8, wave: SineWave) -> Result<(), DriverError> {
        let ch = Self::channel_prefix(channel)?;
        debug!(channel, ?wave, "Programming sine");
        self.transport
            .write(&format!(
                "{}:BSWV WVTP,SINE,FRQ,{},AMP,{},OFST,{},PHSE,{}",
                ch, wave.frequency_hz, wave.amplitude_vpp, wave.offset_v, wave.phase_deg
            ))
            .await
    }

    async fn output_on(&self, channel: u8) -> Result<(), DriverError> {
        let ch = Self::channel_prefix(channel)?;
        self.transport.write(&format!("{}:OUTP ON", ch)).await
    }

    async fn output_off(&self, channel: u8) -> Result<(), DriverError> {
        let ch = Self::channel_prefix(channel)?;
        self.transport.write(&format!("{}:OUTP OFF", ch)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScpiTransport for RecordingTransport {
        async fn write(&self, cmd: &str) -> Result<(), DriverError> {
            self.sent.lock().unwrap().push(cmd.to_string());
            Ok(())
        }

        async fn query(&self, _cmd: &str) -> Result<String, DriverError> {
            Ok("Siglent Technologies,SDG1032X,SDG1XCAD000001,1.01.01.33R1".to_string())
        }

        async fn query_raw(&self, _cmd: &str) -> Result<Vec<u8>, DriverError> {
            Err(DriverError::Instrument("not supported".into()))
        }
    }

    #[tokio::test]
    async fn programs_sine_on_channel() {
        let transport = Arc::new(RecordingTransport::default());
        let awg = Sdg1032x::with_transport(transport.clone()).await.unwrap();
        awg.set_output_load(1, 50.0).await.unwrap();
        awg.sine(1, SineWave::new(7.2e6, 0.5)).await.unwrap();
        awg.output_on(1).await.unwrap();

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                "*RST",
                "C1:OUTP LOAD,50",
                "C1:BSWV WVTP,SINE,FRQ,7200000,AMP,0.5,OFST,0,PHSE,0",
                "C1:OUTP ON",
            ]
        );
    }

    #[tokio::test]
    async fn rejects_missing_channel() {
        let awg = Sdg1032x::with_transport(Arc::new(RecordingTransport::default()))
            .await
            .unwrap();
        assert!(matches!(
            awg.output_on(3).await,
            Err(DriverError::InvalidArgument(_))
        ));
    }
}
