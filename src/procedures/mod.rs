//! Bench test procedures built on loaded sessions and the measurement engine.
//!
//! Each procedure borrows the sessions it needs; loading and caching stays
//! with the [`SessionManager`](crate::session::SessionManager).

pub mod harmonics;
pub mod imd;
pub mod report;
pub mod trx_lo;

use std::sync::Arc;

use crate::error::{AppResult, BenchError};
use crate::instrument::{InstrumentClass, SpectrumAnalyzer, WaveformGenerator};
use crate::session::InstrumentSession;

pub use harmonics::{run_harmonics, HarmonicsParams};
pub use imd::{run_imd, ImdParams};
pub use report::{ReportBuilder, ResultTable, TestReport};
pub use trx_lo::{plan_lo, run_trx_lo, LoPlan, TrxLoParams};

/// Load impedance every procedure programs on the generator outputs.
pub const LOAD_OHMS: f64 = 50.0;

pub(crate) fn analyzer(session: &InstrumentSession) -> AppResult<Arc<dyn SpectrumAnalyzer>> {
    session
        .handle()
        .as_spectrum_analyzer()
        .ok_or_else(|| BenchError::CapabilityMismatch {
            name: session.name().to_string(),
            expected: InstrumentClass::SpectrumAnalyzer,
        })
}

pub(crate) fn generator(session: &InstrumentSession) -> AppResult<Arc<dyn WaveformGenerator>> {
    session
        .handle()
        .as_waveform_generator()
        .ok_or_else(|| BenchError::CapabilityMismatch {
            name: session.name().to_string(),
            expected: InstrumentClass::WaveformGenerator,
        })
}

pub(crate) fn mhz(hz: f64) -> String {
    format!("{}", hz / 1e6)
}
