//! Service registry: owns the ordered set of services and drives each one
//! through registration, initialization and shutdown.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

use crate::capabilities::{self, Capabilities};
use crate::config::RuntimeConfig;
use crate::contracts::{downcast_service, same_service, Service, ServiceRef};
use crate::error::RuntimeError;
use crate::events::observer::LifecycleLogger;
use crate::events::{Event, EventBus, SubscriptionId};
use crate::logger::{LogSink, ServiceLogger};
use crate::runtime::{lifecycle, runner, shutdown, ShutdownOptions, ShutdownReport};

/// Where a registered service is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Registered,
    AwaitingDependencies,
    Initialized,
    Failed,
    ShuttingDown,
    ShutDown,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Registered => "registered",
            ServiceState::AwaitingDependencies => "awaiting_dependencies",
            ServiceState::Initialized => "initialized",
            ServiceState::Failed => "failed",
            ServiceState::ShuttingDown => "shutting_down",
            ServiceState::ShutDown => "shut_down",
        }
    }

    fn is_stopping(&self) -> bool {
        matches!(self, ServiceState::ShuttingDown | ServiceState::ShutDown)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntryId(u64);

struct ServiceEntry {
    id: EntryId,
    service: ServiceRef,
    caps: Capabilities,
    state: ServiceState,
    cancel: CancellationToken,
    handler_subscriptions: Vec<SubscriptionId>,
}

/// Entry data copied out of the registry for shutdown.
pub(crate) struct EntrySnapshot {
    pub(crate) id: EntryId,
    pub(crate) service: ServiceRef,
    pub(crate) caps: Capabilities,
}

struct LogSettings {
    level: LevelFilter,
    sink: LogSink,
    // Bumped on every level or destination change.
    epoch: u64,
}

impl LogSettings {
    fn logger(&self, name: &str) -> ServiceLogger {
        ServiceLogger::new(name, self.level, self.sink.clone())
    }
}

struct Inner {
    name: Arc<str>,
    config: RuntimeConfig,
    entries: RwLock<Vec<ServiceEntry>>,
    next_id: AtomicU64,
    bus: EventBus,
    log: RwLock<LogSettings>,
    generation: watch::Sender<u64>,
    cancel: CancellationToken,
    signals_armed: AtomicBool,
    // Held for the whole drain; `Some` once shutdown has completed.
    shutdown: Mutex<Option<Arc<ShutdownReport>>>,
}

/// Process-wide service container.
///
/// Cheap to clone; clones share the same services, event bus and shutdown
/// signal. `add` spawns onto the ambient Tokio runtime, so it must be called
/// from within one.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.read();
        let services: Vec<(&str, ServiceState)> = entries
            .iter()
            .map(|e| (e.service.name(), e.state))
            .collect();
        f.debug_struct("Registry")
            .field("name", &self.inner.name)
            .field("services", &services)
            .field("shutting_down", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_config_and_sink(config, LogSink::stderr())
    }

    /// Like [`Registry::with_config`], with per-service loggers writing to `sink`.
    pub fn with_config_and_sink(config: RuntimeConfig, sink: LogSink) -> Self {
        let name: Arc<str> = Arc::from(config.name.as_str());
        let bus = EventBus::new();
        if config.lifecycle_logging {
            LifecycleLogger::install(&bus, name.clone());
        }
        let (generation, _) = watch::channel(0);
        let log = LogSettings {
            level: config.log_level_filter(),
            sink,
            epoch: 0,
        };

        tracing::debug!(runtime = &*name, "registry created");
        Self {
            inner: Arc::new(Inner {
                name,
                config,
                entries: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                bus,
                log: RwLock::new(log),
                generation,
                cancel: CancellationToken::new(),
                signals_armed: AtomicBool::new(false),
                shutdown: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Registers `service` and starts its initialization in a new task.
    ///
    /// Capability wiring (event handlers, `bind_events`, logger binding) happens
    /// before this returns; `init` runs concurrently. The returned handle may be
    /// awaited for the outcome but does not have to be.
    pub fn add(&self, service: ServiceRef) -> InitHandle {
        let name = service.name().to_string();
        if self.is_shutting_down() {
            tracing::warn!(runtime = self.name(), service = %name, "registry is shutting down; service rejected");
            return InitHandle::rejected(RuntimeError::ShuttingDown { service: name });
        }

        let caps = Capabilities::detect(&*service);
        if self.inner.entries.read().iter().any(|e| e.service.name() == name) {
            tracing::warn!(runtime = self.name(), service = %name, "another service with this name is already registered");
        }
        tracing::debug!(runtime = self.name(), service = %name, capabilities = %caps, "registering service");

        let handler_subscriptions = self.subscribe_handler(&service, &caps);

        if let Some(bound) = service.as_event_bound() {
            bound.bind_events(&self.inner.bus);
            self.inner.bus.emit(&Event::ServiceEventsBound(service.clone()));
        }

        let mut log_epoch = None;
        if let Some(bound) = service.as_logger_bound() {
            let (logger, epoch) = {
                let log = self.inner.log.read();
                (log.logger(&name), log.epoch)
            };
            bound.bind_logger(logger);
            log_epoch = Some(epoch);
            self.inner.bus.emit(&Event::ServiceLoggerBound(service.clone()));
        }

        let id = EntryId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = self.inner.cancel.child_token();
        {
            // Shutdown cancels and snapshots under this same guard.
            let mut entries = self.inner.entries.write();
            if self.inner.cancel.is_cancelled() {
                drop(entries);
                for sub in handler_subscriptions {
                    self.inner.bus.unsubscribe(sub);
                }
                tracing::warn!(runtime = self.name(), service = %name, "registry is shutting down; service rejected");
                return InitHandle::rejected(RuntimeError::ShuttingDown { service: name });
            }
            entries.push(ServiceEntry {
                id,
                service: service.clone(),
                caps,
                state: ServiceState::Registered,
                cancel: cancel.clone(),
                handler_subscriptions,
            });
        }
        self.bump_generation();
        if let Some(epoch) = log_epoch {
            self.catch_up_logger(&service, epoch);
        }

        let task = tokio::spawn(lifecycle::start(self.clone(), id, service, cancel));
        InitHandle {
            service: name,
            inner: InitInner::Spawned(task),
        }
    }

    /// Removes the first entry holding `service`. Returns `false` if absent.
    ///
    /// A pending dependency wait for that entry is abandoned; an `init` that is
    /// already running is left to finish.
    pub fn remove(&self, service: &ServiceRef) -> bool {
        let removed = {
            let mut entries = self.inner.entries.write();
            entries
                .iter()
                .position(|e| same_service(&e.service, service))
                .map(|pos| entries.remove(pos))
        };
        let Some(entry) = removed else {
            return false;
        };

        entry.cancel.cancel();
        self.bump_generation();
        self.inner.bus.emit(&Event::ServiceRemoved(entry.service.clone()));
        for id in entry.handler_subscriptions {
            self.inner.bus.unsubscribe(id);
        }
        true
    }

    /// Independent copy of the registered services, in registration order.
    pub fn services(&self) -> Vec<ServiceRef> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|e| e.service.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// State of the first entry holding `service`, or `None` if not registered.
    pub fn state_of(&self, service: &ServiceRef) -> Option<ServiceState> {
        self.inner
            .entries
            .read()
            .iter()
            .find(|e| same_service(&e.service, service))
            .map(|e| e.state)
    }

    pub fn capabilities_of(&self, service: &ServiceRef) -> Option<Capabilities> {
        self.inner
            .entries
            .read()
            .iter()
            .find(|e| same_service(&e.service, service))
            .map(|e| e.caps.clone())
    }

    /// First registered service with this name.
    pub fn get_by_name(&self, name: &str) -> Option<ServiceRef> {
        self.inner
            .entries
            .read()
            .iter()
            .find(|e| e.service.name() == name)
            .map(|e| e.service.clone())
    }

    /// First registered service of concrete type `T`.
    pub fn find<T: Service>(&self) -> Option<Arc<T>> {
        self.inner
            .entries
            .read()
            .iter()
            .find_map(|e| downcast_service::<T>(&e.service))
    }

    /// Every registered service of concrete type `T`, in registration order.
    pub fn find_all<T: Service>(&self) -> Vec<Arc<T>> {
        self.inner
            .entries
            .read()
            .iter()
            .filter_map(|e| downcast_service::<T>(&e.service))
            .collect()
    }

    /// Fresh logger labeled `name` with the current level and destination.
    pub fn new_logger(&self, name: &str) -> ServiceLogger {
        self.inner.log.read().logger(name)
    }

    pub fn log_level(&self) -> LevelFilter {
        self.inner.log.read().level
    }

    /// Changes the level of every bound service logger and of loggers bound later.
    pub fn set_log_level(&self, level: LevelFilter) {
        {
            let mut log = self.inner.log.write();
            log.level = level;
            log.epoch += 1;
            self.rebind_loggers(&log, |current| current.with_level(level));
        }
        tracing::debug!(runtime = self.name(), level = %level, "service log level changed");
    }

    /// Redirects every bound service logger, and loggers bound later, to `sink`.
    pub fn set_log_destination(&self, sink: LogSink) {
        {
            let mut log = self.inner.log.write();
            log.sink = sink.clone();
            log.epoch += 1;
            self.rebind_loggers(&log, |current| current.with_sink(sink.clone()));
        }
        tracing::debug!(runtime = self.name(), "service log destination changed");
    }

    /// Runs the shutdown sequence once; every caller receives the same report.
    pub async fn shutdown(&self) -> Arc<ShutdownReport> {
        let mut done = self.inner.shutdown.lock().await;
        if let Some(report) = done.as_ref() {
            return report.clone();
        }
        let report = Arc::new(shutdown::drain(self).await);
        *done = Some(report.clone());
        report
    }

    /// Installs the OS signal listener now, so an interrupt that arrives
    /// before [`Registry::run`] starts shutdown as soon as `run` is reached.
    /// Idempotent. Must be called from within a Tokio runtime.
    pub fn listen_for_signals(&self) {
        if !self.inner.signals_armed.swap(true, Ordering::SeqCst) {
            runner::arm(ShutdownOptions::Signals, self.shutdown_token());
        }
    }

    /// Emits `RuntimeRunLoopInitiated`, waits for the shutdown trigger chosen
    /// by `options`, then runs [`Registry::shutdown`] to completion.
    pub async fn run(&self, options: ShutdownOptions) -> Arc<ShutdownReport> {
        let cancel = self.shutdown_token();
        match options {
            ShutdownOptions::Signals => self.listen_for_signals(),
            other => runner::arm(other, cancel.clone()),
        }

        self.inner.bus.emit(&Event::RuntimeRunLoopInitiated);
        cancel.cancelled().await;
        self.shutdown().await
    }

    /// Receiver that changes on every add or remove.
    pub(crate) fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }

    /// Cancels the registry token and snapshots the entries in one step, so
    /// every entry is either in the snapshot or rejected by `add`.
    pub(crate) fn begin_shutdown(&self) -> Vec<EntrySnapshot> {
        let entries = self.inner.entries.write();
        self.inner.cancel.cancel();
        entries
            .iter()
            .map(|e| EntrySnapshot {
                id: e.id,
                service: e.service.clone(),
                caps: e.caps.clone(),
            })
            .collect()
    }

    /// Moves the entry to `state`. No-op once the entry is gone, and an entry
    /// that is being stopped only moves forward to `ShutDown`.
    pub(crate) fn set_state(&self, id: EntryId, state: ServiceState) {
        let mut entries = self.inner.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            if entry.state.is_stopping() && state != ServiceState::ShutDown {
                return;
            }
            entry.state = state;
        }
    }

    fn bump_generation(&self) {
        self.inner.generation.send_modify(|g| *g = g.wrapping_add(1));
    }

    fn subscribe_handler(&self, service: &ServiceRef, caps: &Capabilities) -> Vec<SubscriptionId> {
        caps.handled_events
            .iter()
            .map(|kind| {
                let weak = Arc::downgrade(service);
                self.inner.bus.subscribe(*kind, move |event| {
                    if let Some(service) = weak.upgrade() {
                        if let Some(handler) = service.as_lifecycle_handler() {
                            capabilities::dispatch(handler, event);
                        }
                    }
                })
            })
            .collect()
    }

    /// Rebinds `service` if the log settings changed after its logger was built.
    fn catch_up_logger(&self, service: &ServiceRef, bound_epoch: u64) {
        let log = self.inner.log.read();
        if log.epoch == bound_epoch {
            return;
        }
        if let Some(target) = service.as_logger_bound() {
            target.bind_logger(log.logger(service.name()));
        }
    }

    /// Called with the settings write guard held, so a concurrent `add`
    /// either sees the new settings or is rebound here.
    fn rebind_loggers(
        &self,
        log: &LogSettings,
        rebuild: impl Fn(&ServiceLogger) -> ServiceLogger,
    ) {
        let bound: Vec<ServiceRef> = self
            .inner
            .entries
            .read()
            .iter()
            .filter(|e| e.caps.logger)
            .map(|e| e.service.clone())
            .collect();

        for service in bound {
            if let Some(target) = service.as_logger_bound() {
                let logger = match target.logger() {
                    Some(current) => rebuild(&current),
                    None => log.logger(service.name()),
                };
                target.bind_logger(logger);
            }
        }
    }
}

/// Outcome of one service's registration, resolved once `init` has run (or
/// could not run).
pub struct InitHandle {
    service: String,
    inner: InitInner,
}

enum InitInner {
    Spawned(JoinHandle<Result<(), RuntimeError>>),
    Rejected(RuntimeError),
}

impl fmt::Debug for InitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitHandle")
            .field("service", &self.service)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl InitHandle {
    fn rejected(err: RuntimeError) -> Self {
        let service = err.service().unwrap_or_default().to_string();
        Self {
            service,
            inner: InitInner::Rejected(err),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            InitInner::Spawned(task) => task.is_finished(),
            InitInner::Rejected(_) => true,
        }
    }

    /// Waits for initialization to finish.
    pub async fn wait(self) -> Result<(), RuntimeError> {
        match self.inner {
            InitInner::Rejected(err) => Err(err),
            InitInner::Spawned(task) => match task.await {
                Ok(outcome) => outcome,
                Err(join) => Err(RuntimeError::ServiceInitFailed {
                    service: self.service,
                    source: anyhow::anyhow!("initialization task aborted: {join}"),
                }),
            },
        }
    }
}
