use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{EventBus, EventKind};
use crate::logger::ServiceLogger;
use crate::registry::Registry;

/// Shared handle to a registered service.
pub type ServiceRef = Arc<dyn Service>;

/// Type-erasure helpers so dependency resolution can recover concrete services.
///
/// Implemented for every `Send + Sync + 'static` type; services never implement it by hand.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Core service contract: a name and an initialization hook.
///
/// Optional capabilities are opted into by implementing the capability trait and
/// overriding the matching `as_*` query to return `Some(self)`. The registry runs
/// every query once at registration and records the answers in
/// [`Capabilities`](crate::Capabilities).
#[async_trait]
pub trait Service: AsAny {
    /// Human readable name. Not required to be unique within a registry.
    fn name(&self) -> &str;

    /// Called once per registration, after dependencies (if any) are resolved.
    async fn init(&self, registry: &Registry) -> anyhow::Result<()>;

    fn as_logger_bound(&self) -> Option<&dyn LoggerBound> {
        None
    }

    fn as_dependent(&self) -> Option<&dyn Dependent> {
        None
    }

    fn as_graceful(&self) -> Option<&dyn GracefulShutdown> {
        None
    }

    fn as_event_bound(&self) -> Option<&dyn BindsEvents> {
        None
    }

    fn as_lifecycle_handler(&self) -> Option<&dyn LifecycleHandler> {
        None
    }
}

/// Receives a per-service labeled logger before `init` runs.
pub trait LoggerBound: Send + Sync {
    fn bind_logger(&self, logger: ServiceLogger);
    fn logger(&self) -> Option<ServiceLogger>;
}

/// Gates initialization on collaborators becoming discoverable in the registry.
///
/// `resolve_dependencies` is invoked on every wake of the resolver, whether or not
/// the registry changed, so it must be cheap and idempotent.
pub trait Dependent: Send + Sync {
    fn dependencies_resolved(&self) -> bool;
    fn resolve_dependencies(&self, registry: &Registry);
}

/// Cleanup hook run sequentially, in registration order, during shutdown.
#[async_trait]
pub trait GracefulShutdown: Send + Sync {
    async fn on_shutdown(&self) -> anyhow::Result<()>;
}

/// Receives the event bus at registration to install its own subscriptions.
pub trait BindsEvents: Send + Sync {
    fn bind_events(&self, bus: &EventBus);
}

/// Per-kind lifecycle callbacks.
///
/// Only the kinds listed by `handled_events` are subscribed; the remaining
/// methods are never called.
pub trait LifecycleHandler: Send + Sync {
    fn handled_events(&self) -> &[EventKind];

    fn on_service_added(&self, _service: &ServiceRef) {}
    fn on_service_removed(&self, _service: &ServiceRef) {}
    fn on_service_initialized(&self, _service: &ServiceRef) {}
    fn on_service_events_bound(&self, _service: &ServiceRef) {}
    fn on_service_logger_bound(&self, _service: &ServiceRef) {}
    fn on_runtime_run_loop_initiated(&self) {}
    fn on_runtime_shutdown_initiated(&self) {}
    fn on_dependency_resolution_started(&self, _service: &ServiceRef) {}
    fn on_dependency_resolution_ended(&self, _service: &ServiceRef) {}
}

/// Recover the concrete type behind a [`ServiceRef`].
pub fn downcast_service<T: Service>(service: &ServiceRef) -> Option<Arc<T>> {
    AsAny::into_any_arc(Arc::clone(service)).downcast::<T>().ok()
}

/// Identity comparison on the service allocation, ignoring vtables.
pub fn same_service(a: &ServiceRef, b: &ServiceRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
