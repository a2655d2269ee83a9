//! Spectrum-analyzer measurements.
//!
//! - `sweep`: request and peak-table value types
//! - `capture`: screen-dump decoding
//! - `engine`: the sweep/peak-capture protocol run against a session

pub mod capture;
pub mod engine;
pub mod sweep;

pub use capture::ScreenCapture;
pub use engine::{MeasurementEngine, SweepOutcome};
pub use sweep::{Peak, PeakTable, SweepRequest};
