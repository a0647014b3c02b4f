//! Capability detection.
//!
//! [`Capabilities::detect`] runs every optional-contract query a [`Service`]
//! exposes and records the answers, so the registry never has to re-query
//! while deciding how to wire, initialize, or stop a service.

use std::fmt;

use crate::contracts::{LifecycleHandler, Service};
use crate::events::{Event, EventKind};

/// Which optional contracts a service satisfies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub logger: bool,
    pub dependent: bool,
    pub event_bound: bool,
    pub graceful: bool,
    /// Lifecycle kinds the service handles, first occurrence order, no repeats.
    pub handled_events: Vec<EventKind>,
}

impl Capabilities {
    pub fn detect(service: &dyn Service) -> Self {
        let mut handled_events = Vec::new();
        if let Some(handler) = service.as_lifecycle_handler() {
            for kind in handler.handled_events() {
                if !handled_events.contains(kind) {
                    handled_events.push(*kind);
                }
            }
        }

        Self {
            logger: service.as_logger_bound().is_some(),
            dependent: service.as_dependent().is_some(),
            event_bound: service.as_event_bound().is_some(),
            graceful: service.as_graceful().is_some(),
            handled_events,
        }
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handled_events.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        for (present, label) in [
            (self.logger, "logger"),
            (self.dependent, "dependent"),
            (self.event_bound, "event_bound"),
            (self.graceful, "graceful"),
        ] {
            if present {
                parts.push(label.to_string());
            }
        }
        if !self.handled_events.is_empty() {
            let kinds: Vec<&str> = self.handled_events.iter().map(EventKind::as_str).collect();
            parts.push(format!("handles[{}]", kinds.join(",")));
        }
        if parts.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// Route an event to the matching `on_*` method of `handler`.
pub(crate) fn dispatch(handler: &dyn LifecycleHandler, event: &Event) {
    match event {
        Event::ServiceAdded(s) => handler.on_service_added(s),
        Event::ServiceRemoved(s) => handler.on_service_removed(s),
        Event::ServiceInitialized(s) => handler.on_service_initialized(s),
        Event::ServiceEventsBound(s) => handler.on_service_events_bound(s),
        Event::ServiceLoggerBound(s) => handler.on_service_logger_bound(s),
        Event::RuntimeRunLoopInitiated => handler.on_runtime_run_loop_initiated(),
        Event::RuntimeShutdownInitiated => handler.on_runtime_shutdown_initiated(),
        Event::DependencyResolutionStarted(s) => handler.on_dependency_resolution_started(s),
        Event::DependencyResolutionEnded(s) => handler.on_dependency_resolution_ended(s),
    }
}
