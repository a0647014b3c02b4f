//! Per-service initialization task.
//!
//! Phase order inside the task: **dependency resolution (if `Dependent`) →
//! cancellation check → init → `ServiceInitialized` → `ServiceAdded`**.
//! Everything after registration runs here, inside one failure boundary, so a
//! failing or panicking service only affects its own entry.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::contracts::ServiceRef;
use crate::error::{panic_message, RuntimeError};
use crate::events::Event;
use crate::registry::{EntryId, Registry, ServiceState};

use super::resolver;

pub(crate) async fn start(
    registry: Registry,
    id: EntryId,
    service: ServiceRef,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    let outcome = AssertUnwindSafe(run(&registry, id, &service, &cancel))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(RuntimeError::ServiceInitFailed {
                service: service.name().to_string(),
                source: anyhow::anyhow!("panicked: {}", panic_message(panic.as_ref())),
            })
        });

    if let Err(err) = &outcome {
        report(&registry, id, err);
    }
    outcome
}

async fn run(
    registry: &Registry,
    id: EntryId,
    service: &ServiceRef,
    cancel: &CancellationToken,
) -> Result<(), RuntimeError> {
    if let Some(dependent) = service.as_dependent() {
        registry.set_state(id, ServiceState::AwaitingDependencies);
        resolver::resolve(registry, service, dependent, cancel).await?;
    }
    if cancel.is_cancelled() {
        return Err(abandoned(registry, service.name()));
    }
    initialize(registry, id, service).await
}

/// Error for an entry whose token fired before `init`: shutdown or removal.
pub(super) fn abandoned(registry: &Registry, name: &str) -> RuntimeError {
    let service = name.to_string();
    if registry.is_shutting_down() {
        RuntimeError::ShuttingDown { service }
    } else {
        RuntimeError::DependencyResolutionCancelled { service }
    }
}

async fn initialize(
    registry: &Registry,
    id: EntryId,
    service: &ServiceRef,
) -> Result<(), RuntimeError> {
    let logger = service
        .as_logger_bound()
        .and_then(|bound| bound.logger())
        .unwrap_or_else(|| registry.new_logger(service.name()));
    logger.info("initializing");

    service
        .init(registry)
        .await
        .map_err(|source| RuntimeError::ServiceInitFailed {
            service: service.name().to_string(),
            source,
        })?;

    registry.set_state(id, ServiceState::Initialized);
    registry
        .events()
        .emit(&Event::ServiceInitialized(service.clone()));
    registry.events().emit(&Event::ServiceAdded(service.clone()));
    Ok(())
}

fn report(registry: &Registry, id: EntryId, err: &RuntimeError) {
    let runtime = registry.name();
    match err {
        RuntimeError::DependencyResolutionCancelled { service }
        | RuntimeError::ShuttingDown { service } => {
            tracing::info!(runtime, service = %service, reason = err.as_label(), "service start abandoned");
        }
        _ => {
            registry.set_state(id, ServiceState::Failed);
            tracing::error!(
                runtime,
                service = err.service().unwrap_or_default(),
                kind = err.as_label(),
                error = %err,
                cause = %chain(err),
                "service failed to start"
            );
        }
    }
}

fn chain(err: &RuntimeError) -> String {
    let mut out = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push(cause.to_string());
        source = cause.source();
    }
    out.join(": ")
}
