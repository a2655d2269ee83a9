//! Instrument descriptors, capability traits and drivers.
//!
//! Each physical instrument is reached through one capability trait
//! ([`SpectrumAnalyzer`], [`WaveformGenerator`] or [`DigitalIo`]). Drivers are
//! thin translators from those traits to the instrument's textual protocol,
//! carried by a [`scpi::ScpiTransport`].

pub mod capabilities;
pub mod dsa815;
pub mod mock;
pub mod scpi;
pub mod sdg1032x;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DriverError;

pub use capabilities::{
    DigitalIo, Instrument, InstrumentHandle, SineWave, SpectrumAnalyzer, WaveformGenerator,
};

/// Capability class of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentClass {
    SpectrumAnalyzer,
    WaveformGenerator,
    DigitalIo,
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstrumentClass::SpectrumAnalyzer => "Spectrum Analyzer",
            InstrumentClass::WaveformGenerator => "Arbitrary Waveform Generator",
            InstrumentClass::DigitalIo => "Digital I/O Adapter",
        };
        f.write_str(label)
    }
}

/// How the bench reaches an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceKind {
    /// LAN instrument addressed by hostname; probed before connecting.
    Networked,
    /// USB/local adapter that enumerates its own devices.
    LocalBus,
}

/// Immutable catalog entry for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDescriptor {
    /// Unique key in the registry
    pub name: String,
    /// Capability class
    pub class: InstrumentClass,
    /// Key into the driver catalog (e.g. "dsa815")
    pub driver: String,
    /// Networked or local bus
    pub interface: InterfaceKind,
    /// Hostname (optionally `host:port`) for networked instruments
    #[serde(default)]
    pub address: Option<String>,
}

impl InstrumentDescriptor {
    /// Descriptor for a LAN instrument.
    pub fn networked(
        name: impl Into<String>,
        class: InstrumentClass,
        driver: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            class,
            driver: driver.into(),
            interface: InterfaceKind::Networked,
            address: Some(address.into()),
        }
    }

    /// Descriptor for a local-bus adapter.
    pub fn local(
        name: impl Into<String>,
        class: InstrumentClass,
        driver: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            class,
            driver: driver.into(),
            interface: InterfaceKind::LocalBus,
            address: None,
        }
    }
}

/// Identity reported by an instrument (`*IDN?`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentIdentity {
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: String,
}

impl InstrumentIdentity {
    /// Parse a comma separated `*IDN?` reply.
    pub fn parse_idn(reply: &str) -> Result<Self, DriverError> {
        let fields: Vec<&str> = reply.trim().split(',').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(DriverError::MalformedResponse(format!(
                "identity reply has {} fields, expected 4: '{}'",
                fields.len(),
                reply.trim()
            )));
        }
        Ok(Self {
            make: fields[0].to_string(),
            model: fields[1].to_string(),
            serial_number: fields[2].to_string(),
            firmware_version: fields[3].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_idn_reply() {
        let id = InstrumentIdentity::parse_idn(
            "Rigol Technologies,DSA815,DSA8A1234567,00.01.19.00.02\n",
        )
        .unwrap();
        assert_eq!(id.make, "Rigol Technologies");
        assert_eq!(id.model, "DSA815");
        assert_eq!(id.serial_number, "DSA8A1234567");
        assert_eq!(id.firmware_version, "00.01.19.00.02");
    }

    #[test]
    fn short_idn_is_malformed() {
        let err = InstrumentIdentity::parse_idn("Rigol,DSA815").unwrap_err();
        assert!(matches!(err, DriverError::MalformedResponse(_)));
    }

    #[test]
    fn class_deserializes_kebab_case() {
        let class: InstrumentClass = serde_json::from_str("\"waveform-generator\"").unwrap();
        assert_eq!(class, InstrumentClass::WaveformGenerator);
    }
}
