//! Built-in subscriber that reports every lifecycle event through `tracing`.
//!
//! The registry installs it first on its own bus, so these log lines precede
//! any user handler for the same event.

use std::sync::Arc;

use super::bus::EventBus;
use super::event::{Event, EventKind};

pub(crate) struct LifecycleLogger {
    runtime: Arc<str>,
}

impl LifecycleLogger {
    pub(crate) fn install(bus: &EventBus, runtime: Arc<str>) {
        let observer = Arc::new(Self { runtime });
        for kind in EventKind::ALL {
            let observer = observer.clone();
            bus.subscribe(kind, move |ev| observer.log(ev));
        }
    }

    fn log(&self, event: &Event) {
        let runtime = &*self.runtime;
        match event {
            Event::ServiceAdded(s) => {
                tracing::info!(runtime, service = s.name(), "service has been added")
            }
            Event::ServiceRemoved(s) => {
                tracing::debug!(runtime, service = s.name(), "removed service")
            }
            Event::ServiceInitialized(s) => {
                tracing::debug!(runtime, service = s.name(), "service initialized")
            }
            Event::ServiceEventsBound(s) => {
                tracing::debug!(runtime, service = s.name(), "events bound for service")
            }
            Event::ServiceLoggerBound(s) => {
                tracing::debug!(runtime, service = s.name(), "logger bound for service")
            }
            Event::RuntimeRunLoopInitiated => tracing::debug!(runtime, "run loop started"),
            Event::RuntimeShutdownInitiated => {
                tracing::warn!(runtime, "initiating graceful shutdown")
            }
            Event::DependencyResolutionStarted(s) => {
                tracing::debug!(runtime, service = s.name(), "dependency resolution started")
            }
            Event::DependencyResolutionEnded(s) => {
                tracing::debug!(runtime, service = s.name(), "dependency resolution completed")
            }
        }
    }
}
