//! Session manager: resolves instrument names to live, cached sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::catalog::{ConnectOptions, DriverCatalog};
use super::probe::{probe_host, PingProbe, ReachabilityProbe, SkipProbe};
use super::{InstrumentSession, SessionState};
use crate::config::{BenchConfig, ConfigError};
use crate::error::{AppResult, BenchError};
use crate::instrument::{InstrumentDescriptor, InterfaceKind};
use crate::registry::InstrumentRegistry;

/// Default bound on opening a driver connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracks one load attempt through its lifecycle.
struct LoadAttempt<'a> {
    name: &'a str,
    state: SessionState,
}

impl<'a> LoadAttempt<'a> {
    fn new(name: &'a str) -> Self {
        debug!(instrument = name, state = %SessionState::Unresolved, "Loading instrument");
        Self {
            name,
            state: SessionState::Unresolved,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(self.state.can_transition_to(next));
        debug!(instrument = self.name, from = %self.state, to = %next, "Session transition");
        self.state = next;
    }

    fn fail(&mut self, err: BenchError) -> BenchError {
        warn!(instrument = self.name, from = %self.state, error = %err, "Instrument load failed");
        self.state = SessionState::Failed;
        err
    }
}

/// Owns the name -> session cache.
///
/// The cache lock is only held to look up, insert or remove entries. Each
/// name additionally has its own load lock, held for the whole of a load, so
/// two callers asking for the same name never open two connections while
/// loads of different names proceed independently.
pub struct SessionManager {
    registry: InstrumentRegistry,
    catalog: DriverCatalog,
    probe: Arc<dyn ReachabilityProbe>,
    connect_timeout: Duration,
    sessions: Mutex<HashMap<String, Arc<InstrumentSession>>>,
    load_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(
        registry: InstrumentRegistry,
        catalog: DriverCatalog,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        Self {
            registry,
            catalog,
            probe,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sessions: Mutex::new(HashMap::new()),
            load_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Manager over the configured instruments and the built-in drivers.
    pub fn from_config(config: &BenchConfig) -> Self {
        let probe: Arc<dyn ReachabilityProbe> = if config.probe.enabled {
            Arc::new(PingProbe::new(config.probe.timeout()))
        } else {
            Arc::new(SkipProbe)
        };
        Self::new(config.registry(), DriverCatalog::builtin(), probe)
            .with_connect_timeout(config.probe.connect_timeout())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Return a ready session for `name`, connecting on first use.
    ///
    /// A cached session is reset to factory defaults and returned as-is,
    /// unless its connection fell out of sync, in which case it is dropped
    /// and reopened. Otherwise the instrument is looked up, probed (networked
    /// only), built through its driver and cached. Nothing is cached when any
    /// step fails, and no step is retried.
    ///
    /// # Errors
    /// `NotFound`, `Config` (networked instrument without an address),
    /// `Unreachable`, `DriverNotFound`, `ConnectFailed`, `CapabilityMismatch`,
    /// or a driver error from resetting a cached session.
    pub async fn load(&self, name: &str) -> AppResult<Arc<InstrumentSession>> {
        let Some(descriptor) = self.registry.lookup(name) else {
            return Err(LoadAttempt::new(name).fail(BenchError::NotFound(name.to_string())));
        };

        let load_lock = self.load_lock(name).await;
        let _loading = load_lock.lock().await;

        if let Some(session) = self.reusable(name).await {
            debug!(instrument = name, "Reusing cached session");
            session.handle().reset().await?;
            return Ok(session);
        }

        self.open(descriptor).await
    }

    async fn load_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.load_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Cached session for `name` whose connection is still usable. A session
    /// with an out-of-sync connection is evicted.
    async fn reusable(&self, name: &str) -> Option<Arc<InstrumentSession>> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get(name)?;
        if session.handle().is_healthy() {
            return Some(session.clone());
        }
        warn!(instrument = name, "Evicting session with an out-of-sync connection");
        sessions.remove(name);
        None
    }

    /// Probe, construct and cache a new session for `descriptor`.
    async fn open(&self, descriptor: &InstrumentDescriptor) -> AppResult<Arc<InstrumentSession>> {
        let name = descriptor.name.as_str();
        let mut attempt = LoadAttempt::new(name);

        if descriptor.interface == InterfaceKind::Networked {
            let address = descriptor
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty());
            let Some(address) = address else {
                return Err(attempt.fail(BenchError::Config(ConfigError::ValidationError(
                    format!("Networked instrument '{}' has no address", name),
                ))));
            };
            let host = probe_host(address);
            if !self.probe.is_reachable(host).await {
                return Err(attempt.fail(BenchError::Unreachable(host.to_string())));
            }
            attempt.advance(SessionState::ConnectivityChecked);
        }

        let Some(constructor) = self.catalog.get(&descriptor.driver) else {
            return Err(attempt.fail(BenchError::DriverNotFound(descriptor.driver.clone())));
        };

        let options = ConnectOptions {
            address: descriptor.address.clone(),
            timeout: self.connect_timeout,
        };
        let handle = match constructor(options).await {
            Ok(h) => h,
            Err(source) => {
                return Err(attempt.fail(BenchError::ConnectFailed {
                    address: descriptor
                        .address
                        .clone()
                        .unwrap_or_else(|| descriptor.name.clone()),
                    source,
                }))
            }
        };
        attempt.advance(SessionState::Instantiated);

        if handle.class() != descriptor.class {
            return Err(attempt.fail(BenchError::CapabilityMismatch {
                name: descriptor.name.clone(),
                expected: descriptor.class,
            }));
        }

        let session = Arc::new(InstrumentSession::new(descriptor.clone(), handle));
        self.sessions
            .lock()
            .await
            .insert(name.to_string(), session.clone());
        attempt.advance(SessionState::Cached);
        info!(instrument = name, driver = %descriptor.driver, "Instrument ready");
        Ok(session)
    }

    /// Cached session for `name`, without resetting or connecting.
    pub async fn cached(&self, name: &str) -> Option<Arc<InstrumentSession>> {
        self.sessions.lock().await.get(name).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drop the cached session for `name`; `true` if there was one.
    pub async fn close(&self, name: &str) -> bool {
        let removed = self.sessions.lock().await.remove(name).is_some();
        if removed {
            info!(instrument = name, "Session closed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::instrument::mock::MockSpectrumAnalyzer;
    use crate::instrument::{InstrumentClass, InstrumentDescriptor, InstrumentHandle};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tracing_test::traced_test;

    struct CountingProbe {
        reachable: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReachabilityProbe for CountingProbe {
        async fn is_reachable(&self, _host: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reachable
        }
    }

    fn manager(reachable: bool) -> (SessionManager, Arc<CountingProbe>) {
        let registry: InstrumentRegistry = [
            InstrumentDescriptor::networked(
                "SA1",
                InstrumentClass::SpectrumAnalyzer,
                "mock-sa",
                "DSA-815:5555",
            ),
            InstrumentDescriptor::local("DIO1", InstrumentClass::DigitalIo, "mock-dio"),
            InstrumentDescriptor::networked(
                "SA9",
                InstrumentClass::SpectrumAnalyzer,
                "hp8563e",
                "HP-8563E",
            ),
        ]
        .into_iter()
        .collect();
        let probe = Arc::new(CountingProbe {
            reachable,
            calls: AtomicUsize::new(0),
        });
        (
            SessionManager::new(registry, DriverCatalog::builtin(), probe.clone()),
            probe,
        )
    }

    #[tokio::test]
    async fn second_load_reuses_session() {
        let (manager, probe) = manager(true);
        let first = manager.load("SA1").await.unwrap();
        let second = manager.load("SA1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let (manager, probe) = manager(true);
        let err = manager.load("SA7").await.unwrap_err();
        assert!(matches!(err, BenchError::NotFound(ref n) if n == "SA7"));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    /// Replace the `mock-sa` constructor with one that counts its calls and
    /// keeps every analyzer it builds.
    fn count_constructions(
        manager: &mut SessionManager,
    ) -> (Arc<AtomicUsize>, Arc<StdMutex<Vec<Arc<MockSpectrumAnalyzer>>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let built = Arc::new(StdMutex::new(Vec::new()));
        let (counter, store) = (calls.clone(), built.clone());
        manager.catalog.register("mock-sa", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let sa = Arc::new(MockSpectrumAnalyzer::new());
            store.lock().unwrap().push(sa.clone());
            async move { Ok(InstrumentHandle::SpectrumAnalyzer(sa)) }
        });
        (calls, built)
    }

    #[tokio::test]
    async fn offline_host_is_unreachable_and_not_cached() {
        let (mut manager, _) = manager(false);
        let (constructions, _) = count_constructions(&mut manager);
        let err = manager.load("SA1").await.unwrap_err();
        assert!(matches!(err, BenchError::Unreachable(ref h) if h == "DSA-815"));
        assert_eq!(manager.session_count().await, 0);
        // no connection is attempted for an offline host
        assert_eq!(constructions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn networked_instrument_without_address_is_a_config_error() {
        let mut descriptor = InstrumentDescriptor::networked(
            "SA2",
            InstrumentClass::SpectrumAnalyzer,
            "mock-sa",
            "unused",
        );
        descriptor.address = None;
        let reachability = Arc::new(CountingProbe {
            reachable: true,
            calls: AtomicUsize::new(0),
        });
        let mut manager = SessionManager::new(
            [descriptor].into_iter().collect(),
            DriverCatalog::builtin(),
            reachability.clone(),
        );
        let (constructions, _) = count_constructions(&mut manager);

        let err = manager.load("SA2").await.unwrap_err();
        assert!(matches!(
            err,
            BenchError::Config(ConfigError::ValidationError(_))
        ));
        assert!(!err.is_retryable());
        assert_eq!(reachability.calls.load(Ordering::SeqCst), 0);
        assert_eq!(constructions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn out_of_sync_session_is_reopened() {
        let (mut manager, _) = manager(true);
        let (constructions, built) = count_constructions(&mut manager);

        let first = manager.load("SA1").await.unwrap();
        built.lock().unwrap()[0].lose_sync();
        let second = manager.load("SA1").await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(constructions.load(Ordering::SeqCst), 2);
        assert!(second.handle().is_healthy());
        assert_eq!(manager.session_count().await, 1);
        // the stale analyzer is never reset through the evicted session
        assert_eq!(built.lock().unwrap()[0].call_log(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn concurrent_loads_of_one_name_connect_once() {
        let (mut manager, _) = manager(true);
        let (constructions, _) = count_constructions(&mut manager);

        let (a, b) = tokio::join!(manager.load("SA1"), manager.load("SA1"));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_load_does_not_block_other_instruments() {
        let (mut manager, _) = manager(true);
        let gate = Arc::new(tokio::sync::Notify::new());
        let opened = gate.clone();
        manager.catalog.register("mock-sa", move |_| {
            let opened = opened.clone();
            async move {
                opened.notified().await;
                Ok(InstrumentHandle::SpectrumAnalyzer(Arc::new(
                    MockSpectrumAnalyzer::new(),
                )))
            }
        });

        let (slow, (count, dio)) = tokio::join!(manager.load("SA1"), async {
            let count =
                tokio::time::timeout(Duration::from_secs(1), manager.session_count()).await;
            let dio = tokio::time::timeout(Duration::from_secs(1), manager.load("DIO1")).await;
            gate.notify_one();
            (count, dio)
        });

        assert_eq!(count.unwrap(), 0);
        assert!(dio.unwrap().is_ok());
        assert!(slow.is_ok());
        assert_eq!(manager.session_count().await, 2);
    }

    #[tokio::test]
    async fn local_bus_skips_probe() {
        let (manager, probe) = manager(false);
        let session = manager.load("DIO1").await.unwrap();
        assert_eq!(session.handle().class(), InstrumentClass::DigitalIo);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_driver_is_reported() {
        let (manager, _) = manager(true);
        let err = manager.load("SA9").await.unwrap_err();
        assert!(matches!(err, BenchError::DriverNotFound(ref d) if d == "hp8563e"));
    }

    #[tokio::test]
    async fn constructor_failure_is_connect_failed() {
        let (mut manager, _) = manager(true);
        manager.catalog.register("mock-sa", |_| async {
            Err::<InstrumentHandle, _>(DriverError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        });
        let err = manager.load("SA1").await.unwrap_err();
        assert!(matches!(err, BenchError::ConnectFailed { ref address, .. } if address == "DSA-815:5555"));
        assert!(manager.cached("SA1").await.is_none());
    }

    #[tokio::test]
    async fn cached_session_is_reset_on_reload() {
        let (mut manager, _) = manager(true);
        let sa = Arc::new(MockSpectrumAnalyzer::new());
        let shared = sa.clone();
        manager.catalog.register("mock-sa", move |_| {
            let sa = shared.clone();
            async move { Ok(InstrumentHandle::SpectrumAnalyzer(sa)) }
        });
        manager.load("SA1").await.unwrap();
        sa.clear_log();
        manager.load("SA1").await.unwrap();
        assert_eq!(sa.call_log(), vec!["reset"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_load_is_logged() {
        let (manager, _) = manager(false);
        let _ = manager.load("SA1").await;
        assert!(logs_contain("Instrument load failed"));
        assert!(logs_contain("DSA-815 is offline"));
    }

    #[tokio::test]
    async fn close_forgets_session() {
        let (manager, _) = manager(true);
        manager.load("SA1").await.unwrap();
        assert!(manager.close("SA1").await);
        assert!(!manager.close("SA1").await);
        assert_eq!(manager.session_count().await, 0);
    }
}
