//! RF bench automation.
//!
//! Connects to networked and local-bus bench instruments by name, runs
//! single-sweep measurements on a spectrum analyzer and turns the resulting
//! peak tables into harmonic, spurious and intermodulation figures.
//!
//! - [`session::SessionManager`] resolves names to cached instrument sessions
//! - [`measurement::MeasurementEngine`] drives one sweep cycle
//! - [`analysis`] holds the pure frequency, matching and unit helpers
//! - [`procedures`] strings them together into bench tests

pub mod analysis;
pub mod config;
pub mod error;
pub mod instrument;
pub mod measurement;
pub mod procedures;
pub mod registry;
pub mod session;
