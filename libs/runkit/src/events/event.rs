//! Typed lifecycle events.
//!
//! [`EventKind`] is the closed set of occurrences the runtime broadcasts.
//! [`Event`] carries the payload: the affected service for service-scoped
//! kinds, nothing for runtime-scoped ones.

use std::fmt;

use crate::contracts::ServiceRef;

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Service finished initialization successfully and is ready.
    ServiceAdded,
    /// Service was taken out of the registry.
    ServiceRemoved,
    /// `init` returned for the service.
    ServiceInitialized,
    /// Service received the bus through `BindsEvents`.
    ServiceEventsBound,
    /// Service received its labeled logger.
    ServiceLoggerBound,
    /// `Registry::run` started waiting for an interrupt.
    RuntimeRunLoopInitiated,
    /// Shutdown began; hooks are about to run.
    RuntimeShutdownInitiated,
    /// Resolver started polling a dependent service.
    DependencyResolutionStarted,
    /// Dependent service reported its dependencies resolved.
    DependencyResolutionEnded,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::ServiceAdded,
        EventKind::ServiceRemoved,
        EventKind::ServiceInitialized,
        EventKind::ServiceEventsBound,
        EventKind::ServiceLoggerBound,
        EventKind::RuntimeRunLoopInitiated,
        EventKind::RuntimeShutdownInitiated,
        EventKind::DependencyResolutionStarted,
        EventKind::DependencyResolutionEnded,
    ];

    /// Stable snake_case label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ServiceAdded => "service_added",
            EventKind::ServiceRemoved => "service_removed",
            EventKind::ServiceInitialized => "service_initialized",
            EventKind::ServiceEventsBound => "service_events_bound",
            EventKind::ServiceLoggerBound => "service_logger_bound",
            EventKind::RuntimeRunLoopInitiated => "runtime_run_loop_initiated",
            EventKind::RuntimeShutdownInitiated => "runtime_shutdown_initiated",
            EventKind::DependencyResolutionStarted => "dependency_resolution_started",
            EventKind::DependencyResolutionEnded => "dependency_resolution_ended",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event with its payload.
#[derive(Clone)]
pub enum Event {
    ServiceAdded(ServiceRef),
    ServiceRemoved(ServiceRef),
    ServiceInitialized(ServiceRef),
    ServiceEventsBound(ServiceRef),
    ServiceLoggerBound(ServiceRef),
    RuntimeRunLoopInitiated,
    RuntimeShutdownInitiated,
    DependencyResolutionStarted(ServiceRef),
    DependencyResolutionEnded(ServiceRef),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ServiceAdded(_) => EventKind::ServiceAdded,
            Event::ServiceRemoved(_) => EventKind::ServiceRemoved,
            Event::ServiceInitialized(_) => EventKind::ServiceInitialized,
            Event::ServiceEventsBound(_) => EventKind::ServiceEventsBound,
            Event::ServiceLoggerBound(_) => EventKind::ServiceLoggerBound,
            Event::RuntimeRunLoopInitiated => EventKind::RuntimeRunLoopInitiated,
            Event::RuntimeShutdownInitiated => EventKind::RuntimeShutdownInitiated,
            Event::DependencyResolutionStarted(_) => EventKind::DependencyResolutionStarted,
            Event::DependencyResolutionEnded(_) => EventKind::DependencyResolutionEnded,
        }
    }

    /// The affected service, if the event is service-scoped.
    pub fn service(&self) -> Option<&ServiceRef> {
        match self {
            Event::ServiceAdded(s)
            | Event::ServiceRemoved(s)
            | Event::ServiceInitialized(s)
            | Event::ServiceEventsBound(s)
            | Event::ServiceLoggerBound(s)
            | Event::DependencyResolutionStarted(s)
            | Event::DependencyResolutionEnded(s) => Some(s),
            Event::RuntimeRunLoopInitiated | Event::RuntimeShutdownInitiated => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Event");
        d.field("kind", &self.kind());
        if let Some(service) = self.service() {
            d.field("service", &service.name());
        }
        d.finish()
    }
}
