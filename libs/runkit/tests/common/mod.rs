//! Test services shared by the integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use runkit::{
    Dependent, EventBus, EventKind, GracefulShutdown, LifecycleHandler, LogSink, LoggerBound,
    Registry, RuntimeConfig, Service, ServiceLogger, ServiceRef,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Registry with lifecycle logging off and service logs discarded.
pub fn quiet_registry() -> Registry {
    registry_with(RuntimeConfig::default())
}

pub fn registry_with(config: RuntimeConfig) -> Registry {
    let config = RuntimeConfig {
        lifecycle_logging: false,
        ..config
    };
    Registry::with_config_and_sink(config, LogSink::new(std::io::sink()))
}

pub fn names(services: &[ServiceRef]) -> Vec<String> {
    services.iter().map(|s| s.name().to_string()).collect()
}

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Records `(kind, service name)` for every emitted event of the given kinds.
pub fn record(bus: &EventBus, kinds: &[EventKind]) -> Arc<Mutex<Vec<(EventKind, String)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let seen = seen.clone();
        bus.subscribe(*kind, move |event| {
            let name = event.service().map(|s| s.name().to_string()).unwrap_or_default();
            seen.lock().push((event.kind(), name));
        });
    }
    seen
}

#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn sink(&self) -> LogSink {
        LogSink::new(self.clone())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/* ----------------------------- Plain ------------------------------ */

pub struct Plain {
    name: String,
    pub inits: AtomicUsize,
}

impl Plain {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inits: AtomicUsize::new(0),
        })
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for Plain {
    fn name(&self) -> &str {
        &self.name
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/* ----------------------------- Logged ----------------------------- */

#[derive(Default)]
pub struct Logged {
    logger: Mutex<Option<ServiceLogger>>,
    pub bound_at_init: AtomicBool,
}

impl Logged {
    pub fn say_debug(&self, msg: &str) {
        if let Some(logger) = self.logger.lock().as_ref() {
            logger.debug(msg);
        }
    }
}

#[async_trait]
impl Service for Logged {
    fn name(&self) -> &str {
        "logged"
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        let bound = self.logger.lock().is_some();
        self.bound_at_init.store(bound, Ordering::SeqCst);
        Ok(())
    }
    fn as_logger_bound(&self) -> Option<&dyn LoggerBound> {
        Some(self)
    }
}

impl LoggerBound for Logged {
    fn bind_logger(&self, logger: ServiceLogger) {
        *self.logger.lock() = Some(logger);
    }
    fn logger(&self) -> Option<ServiceLogger> {
        self.logger.lock().clone()
    }
}

/* --------------------------- Dependencies ------------------------- */

/// Dependency target, discovered by concrete type.
pub struct Store;

#[async_trait]
impl Service for Store {
    fn name(&self) -> &str {
        "store"
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct NeedsStore {
    store: Mutex<Option<Arc<Store>>>,
    pub inits: AtomicUsize,
    pub attempts: AtomicUsize,
    pub resolved_at_init: AtomicBool,
}

impl NeedsStore {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for NeedsStore {
    fn name(&self) -> &str {
        "needs-store"
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        self.resolved_at_init
            .store(self.store.lock().is_some(), Ordering::SeqCst);
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn as_dependent(&self) -> Option<&dyn Dependent> {
        Some(self)
    }
}

impl Dependent for NeedsStore {
    fn dependencies_resolved(&self) -> bool {
        self.store.lock().is_some()
    }
    fn resolve_dependencies(&self, registry: &Registry) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = registry.find::<Store>() {
            *self.store.lock() = Some(store);
        }
    }
}

/* ----------------------------- Broken ----------------------------- */

pub enum Breakage {
    Error,
    Panic,
}

pub struct Broken {
    pub breakage: Breakage,
}

#[async_trait]
impl Service for Broken {
    fn name(&self) -> &str {
        "broken"
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        match self.breakage {
            Breakage::Error => anyhow::bail!("disk on fire"),
            Breakage::Panic => panic!("init exploded"),
        }
    }
}

/* ----------------------------- Hooked ----------------------------- */

pub enum HookOutcome {
    Ok,
    Err,
    Panic,
    Hang,
}

pub struct Hooked {
    name: String,
    journal: Journal,
    delay: Duration,
    outcome: HookOutcome,
    pub calls: AtomicUsize,
}

impl Hooked {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            delay: Duration::ZERO,
            outcome: HookOutcome::Ok,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ending(mut self, outcome: HookOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for Hooked {
    fn name(&self) -> &str {
        &self.name
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_graceful(&self) -> Option<&dyn GracefulShutdown> {
        Some(self)
    }
}

#[async_trait]
impl GracefulShutdown for Hooked {
    async fn on_shutdown(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(format!("{}:start", self.name));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = match self.outcome {
            HookOutcome::Ok => Ok(()),
            HookOutcome::Err => Err(anyhow::anyhow!("flush failed")),
            HookOutcome::Panic => panic!("hook exploded"),
            HookOutcome::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        };
        self.journal.lock().push(format!("{}:end", self.name));
        result
    }
}

/* ----------------------------- Auditor ---------------------------- */

/// Handles `ServiceAdded` and `RuntimeShutdownInitiated` through per-kind callbacks.
#[derive(Default)]
pub struct Auditor {
    pub seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Service for Auditor {
    fn name(&self) -> &str {
        "auditor"
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_lifecycle_handler(&self) -> Option<&dyn LifecycleHandler> {
        Some(self)
    }
}

impl LifecycleHandler for Auditor {
    fn handled_events(&self) -> &[EventKind] {
        &[EventKind::ServiceAdded, EventKind::RuntimeShutdownInitiated]
    }
    fn on_service_added(&self, service: &ServiceRef) {
        self.seen.lock().push(format!("added:{}", service.name()));
    }
    fn on_runtime_shutdown_initiated(&self) {
        self.seen.lock().push("shutdown".to_string());
    }
    fn on_service_removed(&self, service: &ServiceRef) {
        // Not in handled_events, so never called.
        self.seen.lock().push(format!("removed:{}", service.name()));
    }
}

/* ----------------------------- Meddler ---------------------------- */

/// What a [`Meddler`] does to its registry from another thread while its
/// logger is being bound, i.e. between registration checks and the push.
pub enum Meddle {
    Shutdown,
    DebugLevel,
}

pub struct Meddler {
    registry: Registry,
    meddle: Meddle,
    fired: AtomicBool,
    logger: Mutex<Option<ServiceLogger>>,
    pub inits: AtomicUsize,
    pub hooks: AtomicUsize,
}

impl Meddler {
    pub fn new(registry: &Registry, meddle: Meddle) -> Arc<Self> {
        Arc::new(Self {
            registry: registry.clone(),
            meddle,
            fired: AtomicBool::new(false),
            logger: Mutex::new(None),
            inits: AtomicUsize::new(0),
            hooks: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Service for Meddler {
    fn name(&self) -> &str {
        "meddler"
    }
    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn as_logger_bound(&self) -> Option<&dyn LoggerBound> {
        Some(self)
    }
    fn as_graceful(&self) -> Option<&dyn GracefulShutdown> {
        Some(self)
    }
}

impl LoggerBound for Meddler {
    fn bind_logger(&self, logger: ServiceLogger) {
        *self.logger.lock() = Some(logger);
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        std::thread::scope(|s| {
            s.spawn(|| match self.meddle {
                Meddle::Shutdown => {
                    futures::executor::block_on(self.registry.shutdown());
                }
                Meddle::DebugLevel => self.registry.set_log_level(runkit::LevelFilter::DEBUG),
            });
        });
    }
    fn logger(&self) -> Option<ServiceLogger> {
        self.logger.lock().clone()
    }
}

#[async_trait]
impl GracefulShutdown for Meddler {
    async fn on_shutdown(&self) -> anyhow::Result<()> {
        self.hooks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
