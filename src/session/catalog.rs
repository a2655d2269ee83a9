//! Driver catalog: maps a descriptor's driver id to a constructor.
//!
//! Constructors are registered up front; nothing is resolved by name at
//! connect time beyond a map lookup.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DriverError;
use crate::instrument::dsa815::Dsa815;
use crate::instrument::mock::{MockDigitalIo, MockSpectrumAnalyzer, MockWaveformGenerator};
use crate::instrument::sdg1032x::Sdg1032x;
use crate::instrument::InstrumentHandle;

/// What a constructor gets to open a connection with.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Hostname for networked instruments, `None` for local-bus adapters.
    pub address: Option<String>,
    pub timeout: Duration,
}

impl ConnectOptions {
    pub fn require_address(&self) -> Result<&str, DriverError> {
        self.address
            .as_deref()
            .ok_or_else(|| DriverError::InvalidArgument("driver requires an address".into()))
    }
}

pub type DriverConstructor = Arc<
    dyn Fn(ConnectOptions) -> BoxFuture<'static, Result<InstrumentHandle, DriverError>>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct DriverCatalog {
    constructors: HashMap<String, DriverConstructor>,
}

impl DriverCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every driver shipped in this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("dsa815", |opts: ConnectOptions| async move {
            let sa = Dsa815::connect(opts.require_address()?, opts.timeout).await?;
            Ok(InstrumentHandle::SpectrumAnalyzer(Arc::new(sa)))
        });
        catalog.register("sdg1032x", |opts: ConnectOptions| async move {
            let awg = Sdg1032x::connect(opts.require_address()?, opts.timeout).await?;
            Ok(InstrumentHandle::WaveformGenerator(Arc::new(awg)))
        });
        catalog.register("mock-sa", |_| async {
            Ok(InstrumentHandle::SpectrumAnalyzer(Arc::new(
                MockSpectrumAnalyzer::new(),
            )))
        });
        catalog.register("mock-awg", |_| async {
            Ok(InstrumentHandle::WaveformGenerator(Arc::new(
                MockWaveformGenerator::new(),
            )))
        });
        catalog.register("mock-dio", |_| async {
            Ok(InstrumentHandle::DigitalIo(Arc::new(MockDigitalIo::new())))
        });
        catalog
    }

    /// Register (or replace) the constructor for `driver_id`.
    pub fn register<F, Fut>(&mut self, driver_id: impl Into<String>, constructor: F)
    where
        F: Fn(ConnectOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<InstrumentHandle, DriverError>> + Send + 'static,
    {
        let constructor: DriverConstructor = Arc::new(move |opts| Box::pin(constructor(opts)));
        self.constructors.insert(driver_id.into(), constructor);
    }

    pub fn get(&self, driver_id: &str) -> Option<DriverConstructor> {
        self.constructors.get(driver_id).cloned()
    }

    pub fn contains(&self, driver_id: &str) -> bool {
        self.constructors.contains_key(driver_id)
    }

    /// Registered driver ids, sorted.
    pub fn driver_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
