//! Bench configuration using Figment.
//!
//! Sources, lowest to highest precedence:
//! 1. built-in defaults (the two-instrument bench and the procedure defaults)
//! 2. TOML file (default: `config/rf_bench.toml`)
//! 3. environment variables prefixed with `RFBENCH_`, nested keys separated
//!    by a double underscore
//!
//! ```text
//! RFBENCH_APPLICATION__LOG_LEVEL=debug
//! RFBENCH_PROBE__TIMEOUT_MS=2000
//! RFBENCH_HARMONICS__FUNDAMENTAL_HZ=14200000
//! ```
//!
//! ```no_run
//! use rf_bench::config::BenchConfig;
//!
//! let config = BenchConfig::load(None)?;
//! println!("{} instruments", config.instruments.len());
//! # Ok::<(), rf_bench::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::instrument::{InstrumentClass, InstrumentDescriptor, InterfaceKind};
use crate::procedures::{HarmonicsParams, ImdParams, TrxLoParams};
use crate::registry::InstrumentRegistry;

pub const DEFAULT_CONFIG_PATH: &str = "config/rf_bench.toml";
pub const ENV_PREFIX: &str = "RFBENCH_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration file {0} does not exist")]
    MissingFile(PathBuf),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    pub application: ApplicationConfig,
    pub probe: ProbeConfig,
    /// Registry contents, in file order
    pub instruments: Vec<InstrumentDescriptor>,
    pub harmonics: HarmonicsParams,
    pub imd: ImdParams,
    pub trx_lo: TrxLoParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    /// trace, debug, info, warn or error
    pub log_level: String,
    /// Where screen captures are written
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Ping networked instruments before connecting
    #[serde(default = "default_probe_enabled")]
    pub enabled: bool,
    #[serde(default = "default_probe_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_probe_enabled() -> bool {
    true
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_connect_timeout() -> u64 {
    5000
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: default_probe_enabled(),
            timeout_ms: default_probe_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig {
                name: "rf_bench".to_string(),
                log_level: "info".to_string(),
                results_dir: None,
            },
            probe: ProbeConfig::default(),
            instruments: vec![
                InstrumentDescriptor::networked(
                    "AWG1",
                    InstrumentClass::WaveformGenerator,
                    "sdg1032x",
                    "SDG-1032X",
                ),
                InstrumentDescriptor::networked(
                    "SA1",
                    InstrumentClass::SpectrumAnalyzer,
                    "dsa815",
                    "DSA-815",
                ),
            ],
            harmonics: HarmonicsParams::default(),
            imd: ImdParams::default(),
            trx_lo: TrxLoParams::default(),
        }
    }
}

impl BenchConfig {
    /// Load from `path` (or the default location) and the environment.
    ///
    /// An explicit `path` must exist; a missing default file just means the
    /// built-in bench is used.
    ///
    /// # Errors
    /// `MissingFile`, `LoadError` for unparsable input, or `ValidationError`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) if !p.exists() => return Err(ConfigError::MissingFile(p.to_path_buf())),
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };
        let config: Self = Figment::from(Serialized::defaults(BenchConfig::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Checks log level, unique instrument names, drivers and addresses.
    ///
    /// # Errors
    /// `ValidationError` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.probe.timeout_ms == 0 || self.probe.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Probe and connect timeouts must be non-zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for instrument in &self.instruments {
            if !names.insert(instrument.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate instrument name: '{}'",
                    instrument.name
                )));
            }
            if instrument.driver.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Instrument '{}' has no driver",
                    instrument.name
                )));
            }
            let has_address = instrument
                .address
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty());
            if instrument.interface == InterfaceKind::Networked && !has_address {
                return Err(ConfigError::ValidationError(format!(
                    "Networked instrument '{}' needs an address",
                    instrument.name
                )));
            }
        }

        self.harmonics.validate()?;
        self.imd.validate()
    }

    /// Registry holding every configured instrument, in file order.
    pub fn registry(&self) -> InstrumentRegistry {
        self.instruments.iter().cloned().collect()
    }

    /// First configured instrument of `class`.
    pub fn first_of_class(&self, class: InstrumentClass) -> Option<&InstrumentDescriptor> {
        self.instruments.iter().find(|i| i.class == class)
    }
}
