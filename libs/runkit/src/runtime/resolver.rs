//! Dependency resolution driver.
//!
//! Calls [`Dependent::resolve_dependencies`] until [`Dependent::dependencies_resolved`]
//! reports true. Between attempts the driver sleeps until the registry changes
//! (add/remove), the poll interval elapses, the entry is cancelled, or the
//! optional timeout expires, whichever comes first. There is no cycle
//! detection: two services waiting on each other wait until timeout or forever.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::contracts::{Dependent, ServiceRef};
use crate::error::RuntimeError;
use crate::events::Event;
use crate::registry::Registry;

use super::lifecycle;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Brackets the wait with `DependencyResolutionStarted` / `DependencyResolutionEnded`.
/// The end event is emitted on every exit path.
pub(crate) async fn resolve(
    registry: &Registry,
    service: &ServiceRef,
    dependent: &dyn Dependent,
    cancel: &CancellationToken,
) -> Result<(), RuntimeError> {
    let bus = registry.events();
    bus.emit(&Event::DependencyResolutionStarted(service.clone()));
    let outcome = wait_until_resolved(registry, service.name(), dependent, cancel).await;
    bus.emit(&Event::DependencyResolutionEnded(service.clone()));
    outcome
}

async fn wait_until_resolved(
    registry: &Registry,
    name: &str,
    dependent: &dyn Dependent,
    cancel: &CancellationToken,
) -> Result<(), RuntimeError> {
    let config = registry.config();
    let poll = config.dependency_poll_interval.max(MIN_POLL_INTERVAL);
    let started = Instant::now();
    let deadline = config.dependency_timeout.map(|limit| started + limit);
    let mut changes = registry.subscribe_changes();
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        dependent.resolve_dependencies(registry);
        if dependent.dependencies_resolved() {
            tracing::debug!(service = name, attempts, "dependencies resolved");
            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(lifecycle::abandoned(registry, name)),
            _ = expire(deadline) => {
                return Err(RuntimeError::DependencyResolutionTimeout {
                    service: name.to_string(),
                    waited: started.elapsed(),
                });
            }
            Ok(()) = changes.changed() => {}
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
