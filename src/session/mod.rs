//! Instrument sessions: connect-on-first-use, cached for the process lifetime.
//!
//! ```no_run
//! use rf_bench::config::BenchConfig;
//! use rf_bench::session::SessionManager;
//!
//! # async fn demo() -> rf_bench::error::AppResult<()> {
//! let config = BenchConfig::load(None)?;
//! let manager = SessionManager::from_config(&config);
//! let sa = manager.load("SA1").await?;
//! println!("{:?}", sa.handle().identify().await?);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod manager;
pub mod probe;

use serde::Serialize;
use std::fmt;

use crate::instrument::{InstrumentDescriptor, InstrumentHandle};

pub use catalog::{ConnectOptions, DriverCatalog, DriverConstructor};
pub use manager::SessionManager;
pub use probe::{PingProbe, ReachabilityProbe, SkipProbe, DEFAULT_PROBE_TIMEOUT};

/// Lifecycle of a load attempt.
///
/// `Unresolved -> (ConnectivityChecked) -> Instantiated -> Cached`, with
/// `Failed` reachable from any non-terminal state. Only `Cached` sessions
/// are ever handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unresolved,
    ConnectivityChecked,
    Instantiated,
    Cached,
    Failed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Unresolved, ConnectivityChecked)
                | (Unresolved, Instantiated)
                | (ConnectivityChecked, Instantiated)
                | (Instantiated, Cached)
                | (Unresolved | ConnectivityChecked | Instantiated, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Cached | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unresolved => "unresolved",
            SessionState::ConnectivityChecked => "connectivity_checked",
            SessionState::Instantiated => "instantiated",
            SessionState::Cached => "cached",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A live, cached connection to one named instrument.
pub struct InstrumentSession {
    descriptor: InstrumentDescriptor,
    handle: InstrumentHandle,
}

impl InstrumentSession {
    pub(crate) fn new(descriptor: InstrumentDescriptor, handle: InstrumentHandle) -> Self {
        Self { descriptor, handle }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    pub fn handle(&self) -> &InstrumentHandle {
        &self.handle
    }

    /// Sessions only exist once cached.
    pub fn state(&self) -> SessionState {
        SessionState::Cached
    }
}

impl fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("name", &self.descriptor.name)
            .field("driver", &self.descriptor.driver)
            .field("class", &self.handle.class())
            .finish()
    }
}
