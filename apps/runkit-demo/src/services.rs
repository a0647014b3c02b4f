//! Demo services, one per runtime capability.
//!
//! - [`ConfigStore`]: key/value settings read from the `services.config_store`
//!   section, persisted to `<home_dir>/<file>` on shutdown.
//! - [`Greeter`]: depends on the store; greets on init, says goodbye on shutdown.
//! - [`Auditor`]: watches the lifecycle bus and keeps counters.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use runkit::{
    BindsEvents, Dependent, EventBus, EventKind, GracefulShutdown, LifecycleHandler, LoggerBound,
    Registry, Service, ServiceLogger, ServiceRef,
};
use runkit_bootstrap::{service_config_typed, ConfigProvider};

/// Holds an optional bound logger; every demo service embeds one.
#[derive(Default)]
struct LoggerSlot(Mutex<Option<ServiceLogger>>);

impl LoggerSlot {
    fn set(&self, logger: ServiceLogger) {
        *self.0.lock() = Some(logger);
    }

    fn get(&self) -> Option<ServiceLogger> {
        self.0.lock().clone()
    }

    fn info(&self, msg: impl std::fmt::Display) {
        if let Some(logger) = self.get() {
            logger.info(msg);
        }
    }
}

/* ---------------------------- ConfigStore ------------------------- */

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigStoreCfg {
    /// File under home_dir the values are written to on shutdown.
    pub file: String,
    pub values: BTreeMap<String, serde_json::Value>,
}

impl Default for ConfigStoreCfg {
    fn default() -> Self {
        Self {
            file: "config-store.json".to_string(),
            values: BTreeMap::new(),
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, serde_json::Value>>,
    logger: LoggerSlot,
}

impl ConfigStore {
    pub const NAME: &'static str = "config_store";

    pub fn new(cfg: ConfigStoreCfg, home_dir: PathBuf) -> Self {
        Self {
            path: home_dir.join(&cfg.file),
            values: Mutex::new(cfg.values),
            logger: LoggerSlot::default(),
        }
    }

    pub fn from_provider(provider: &dyn ConfigProvider, home_dir: PathBuf) -> anyhow::Result<Self> {
        let cfg: ConfigStoreCfg = service_config_typed(provider, Self::NAME)?;
        Ok(Self::new(cfg, home_dir))
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.values.lock().insert(key.into(), value);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Service for ConfigStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        let keys = self.values.lock().len();
        self.logger
            .info(format!("{keys} value(s) loaded, persisting to {}", self.path.display()));
        Ok(())
    }

    fn as_logger_bound(&self) -> Option<&dyn LoggerBound> {
        Some(self)
    }

    fn as_graceful(&self) -> Option<&dyn GracefulShutdown> {
        Some(self)
    }
}

impl LoggerBound for ConfigStore {
    fn bind_logger(&self, logger: ServiceLogger) {
        self.logger.set(logger);
    }

    fn logger(&self) -> Option<ServiceLogger> {
        self.logger.get()
    }
}

#[async_trait]
impl GracefulShutdown for ConfigStore {
    async fn on_shutdown(&self) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(&*self.values.lock())?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        self.logger.info(format!("saved to {}", self.path.display()));
        Ok(())
    }
}

/* ------------------------------ Greeter --------------------------- */

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GreeterCfg {
    /// Store key holding the greeting text.
    pub greeting_key: String,
    /// Used when the store has no greeting.
    pub fallback: String,
}

impl Default for GreeterCfg {
    fn default() -> Self {
        Self {
            greeting_key: "greeting".to_string(),
            fallback: "hello".to_string(),
        }
    }
}

pub struct Greeter {
    cfg: GreeterCfg,
    store: Mutex<Option<Arc<ConfigStore>>>,
    greeted: AtomicUsize,
    logger: LoggerSlot,
}

impl Greeter {
    pub const NAME: &'static str = "greeter";

    pub fn new(cfg: GreeterCfg) -> Self {
        Self {
            cfg,
            store: Mutex::new(None),
            greeted: AtomicUsize::new(0),
            logger: LoggerSlot::default(),
        }
    }

    pub fn from_provider(provider: &dyn ConfigProvider) -> anyhow::Result<Self> {
        Ok(Self::new(service_config_typed(provider, Self::NAME)?))
    }

    pub fn greeting(&self) -> String {
        self.store
            .lock()
            .as_ref()
            .and_then(|store| store.get(&self.cfg.greeting_key))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| self.cfg.fallback.clone())
    }

    pub fn greeted(&self) -> usize {
        self.greeted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for Greeter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        self.greeted.fetch_add(1, Ordering::SeqCst);
        self.logger.info(format!("{}, world", self.greeting()));
        Ok(())
    }

    fn as_logger_bound(&self) -> Option<&dyn LoggerBound> {
        Some(self)
    }

    fn as_dependent(&self) -> Option<&dyn Dependent> {
        Some(self)
    }

    fn as_graceful(&self) -> Option<&dyn GracefulShutdown> {
        Some(self)
    }
}

impl LoggerBound for Greeter {
    fn bind_logger(&self, logger: ServiceLogger) {
        self.logger.set(logger);
    }

    fn logger(&self) -> Option<ServiceLogger> {
        self.logger.get()
    }
}

impl Dependent for Greeter {
    fn dependencies_resolved(&self) -> bool {
        self.store.lock().is_some()
    }

    fn resolve_dependencies(&self, registry: &Registry) {
        if self.dependencies_resolved() {
            return;
        }
        if let Some(store) = registry.find::<ConfigStore>() {
            *self.store.lock() = Some(store);
        }
    }
}

#[async_trait]
impl GracefulShutdown for Greeter {
    async fn on_shutdown(&self) -> anyhow::Result<()> {
        self.logger.info("goodbye");
        Ok(())
    }
}

/* ------------------------------ Auditor --------------------------- */

const AUDITED: &[EventKind] = &[
    EventKind::ServiceAdded,
    EventKind::ServiceRemoved,
    EventKind::DependencyResolutionStarted,
    EventKind::DependencyResolutionEnded,
    EventKind::RuntimeRunLoopInitiated,
    EventKind::RuntimeShutdownInitiated,
];

/// Counts lifecycle events per kind; logs a summary when shutdown starts.
#[derive(Default)]
pub struct Auditor {
    counts: Arc<Mutex<HashMap<EventKind, usize>>>,
    logger: LoggerSlot,
}

impl Auditor {
    pub const NAME: &'static str = "auditor";

    pub fn count(&self, kind: EventKind) -> usize {
        self.counts.lock().get(&kind).copied().unwrap_or_default()
    }

    fn bump(&self, kind: EventKind) {
        *self.counts.lock().entry(kind).or_default() += 1;
    }

    fn seen(&self, kind: EventKind, service: &ServiceRef) {
        self.bump(kind);
        self.logger.info(format!("{kind}: {}", service.name()));
    }
}

#[async_trait]
impl Service for Auditor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init(&self, _registry: &Registry) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_logger_bound(&self) -> Option<&dyn LoggerBound> {
        Some(self)
    }

    fn as_event_bound(&self) -> Option<&dyn BindsEvents> {
        Some(self)
    }

    fn as_lifecycle_handler(&self) -> Option<&dyn LifecycleHandler> {
        Some(self)
    }
}

impl LoggerBound for Auditor {
    fn bind_logger(&self, logger: ServiceLogger) {
        self.logger.set(logger);
    }

    fn logger(&self) -> Option<ServiceLogger> {
        self.logger.get()
    }
}

impl BindsEvents for Auditor {
    // Logger bindings are counted with a raw bus subscription rather than a handler method.
    fn bind_events(&self, bus: &EventBus) {
        let counts = self.counts.clone();
        bus.subscribe(EventKind::ServiceLoggerBound, move |_| {
            *counts.lock().entry(EventKind::ServiceLoggerBound).or_default() += 1;
        });
    }
}

impl LifecycleHandler for Auditor {
    fn handled_events(&self) -> &[EventKind] {
        AUDITED
    }

    fn on_service_added(&self, service: &ServiceRef) {
        self.seen(EventKind::ServiceAdded, service);
    }

    fn on_service_removed(&self, service: &ServiceRef) {
        self.seen(EventKind::ServiceRemoved, service);
    }

    fn on_dependency_resolution_started(&self, service: &ServiceRef) {
        self.seen(EventKind::DependencyResolutionStarted, service);
    }

    fn on_dependency_resolution_ended(&self, service: &ServiceRef) {
        self.seen(EventKind::DependencyResolutionEnded, service);
    }

    fn on_runtime_run_loop_initiated(&self) {
        self.bump(EventKind::RuntimeRunLoopInitiated);
    }

    fn on_runtime_shutdown_initiated(&self) {
        self.bump(EventKind::RuntimeShutdownInitiated);
        let summary: Vec<String> = AUDITED
            .iter()
            .map(|kind| format!("{kind}={}", self.count(*kind)))
            .collect();
        self.logger.info(format!("shutting down; saw {}", summary.join(" ")));
    }
}
