//! Rigol DSA815 spectrum analyzer driver.
//!
//! The DSA815 does not serialize commands on its own: every configuration
//! write is followed by `*WAI` so the next command only goes out once the
//! previous one has taken effect.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::scpi::{ScpiTransport, TcpScpiTransportBuilder};
use super::{Instrument, InstrumentIdentity, SpectrumAnalyzer};
use crate::error::DriverError;
use crate::measurement::SweepRequest;

/// LXI raw-socket port of Rigol analyzers.
pub const DSA815_PORT: u16 = 5555;

const IDENTITY_PREFIX: &str = "Rigol Technologies,DSA815";

pub struct Dsa815 {
    transport: Arc<dyn ScpiTransport>,
    identity: InstrumentIdentity,
}

impl Dsa815 {
    /// Open a socket to `address` and verify the instrument.
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self, DriverError> {
        let transport = TcpScpiTransportBuilder::new(address)
            .with_port(DSA815_PORT)
            .with_timeout(timeout)
            .connect()
            .await?;
        Self::with_transport(Arc::new(transport)).await
    }

    /// Verify the identity over an open transport and reset the analyzer.
    ///
    /// # Errors
    /// `IdentityMismatch` when something other than a DSA815 answers.
    pub async fn with_transport(transport: Arc<dyn ScpiTransport>) -> Result<Self, DriverError> {
        let idn = transport.query("*IDN?").await?;
        if !idn.starts_with(IDENTITY_PREFIX) {
            return Err(DriverError::IdentityMismatch(idn));
        }
        let identity = InstrumentIdentity::parse_idn(&idn)?;
        info!(
            model = %identity.model,
            serial = %identity.serial_number,
            firmware = %identity.firmware_version,
            "DSA815 connected"
        );

        let analyzer = Self {
            transport,
            identity,
        };
        analyzer.reset().await?;
        Ok(analyzer)
    }

    /// Write, then wait for the instrument to finish the command.
    async fn write(&self, cmd: &str) -> Result<(), DriverError> {
        self.transport.write(cmd).await?;
        self.transport.write("*WAI").await
    }
}

#[async_trait]
impl Instrument for Dsa815 {
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
impl SpectrumAnalyzer for Dsa815 {
    async fn configure_sweep(&self, request: &SweepRequest) -> Result<(), DriverError> {
        debug!(?request, "Configuring DSA815 sweep");
        self.write(":INIT:CONT OFF").await?;
        self.write(&format!(":SENS:FREQ:CENT {}", request.center_frequency_hz))
            .await?;
        self.write(&format!(":SENS:FREQ:SPAN {}", request.span_hz))
            .await?;
        self.write(":DISP:WIN:TRAC:Y:SCAL:RLEV 0").await?;
        self.write(&format!(
            ":DISP:WIN:TRAC:Y:SCAL:RLEV:OFFS {}",
            request.reference_offset_db
        ))
        .await?;
        self.write(&format!(
            ":SENS:BAND:RES {}",
            request.resolution_bandwidth_hz.round() as u64
        ))
        .await?;
        self.write(&format!(
            ":SENS:BAND:VID {}",
            request.video_bandwidth_hz.round() as u64
        ))
        .await?;
        self.write(&format!(":DISP:WIN:TRAC:Y:DLIN {}", request.display_line_db))
            .await?;
        self.write(":SENS:SWE:TIME:AUTO:RUL:NORM").await?;
        self.write(":TRAC:MATH:PEAK:TABL:SORT FREQ").await?;
        self.write(":TRAC:MATH:PEAK:THR DLM").await?;
        self.write(":TRAC:MATH:PEAK:TABL:STAT ON").await
    }

    async fn trigger_sweep(&self) -> Result<(), DriverError> {
        self.write(":INIT:IMM").await
    }

    /// Blocks until both queued sweeps have completed, however long that is.
    async fn peak_count(&self) -> Result<usize, DriverError> {
        let reply = self
            .transport
            .query_unbounded(":TRAC:MATH:PEAK:POIN?")
            .await?;
        reply.trim().parse::<usize>().map_err(|_| {
            DriverError::MalformedResponse(format!("peak count '{}' is not an integer", reply))
        })
    }

    async fn peak_table_payload(&self) -> Result<String, DriverError> {
        self.transport.query(":TRAC:MATH:PEAK:DATA?").await
    }

    async fn screen_capture(&self) -> Result<Vec<u8>, DriverError> {
        let continuous = self.transport.query(":INIT:CONT?").await?;
        self.write(":INIT:CONT 0").await?;
        let raw = self.transport.query_raw(":PRIV:SNAP?").await?;
        self.transport
            .write(&format!(":INIT:CONT {}", continuous.trim()))
            .await?;
        // Hand the front panel back to the operator.
        self.transport.write(":SYST:COMM:BRMT 0").await?;
        Ok(raw)
    }
}
