//! Shutdown coordinator.
//!
//! Phase order: **cancel token + snapshot → `RuntimeShutdownInitiated` → hooks**.
//! Hooks run one at a time in registration order over the snapshot taken when
//! the drain starts; `add` rejects anything later, and removals afterwards do
//! not affect the snapshot.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::contracts::GracefulShutdown;
use crate::error::{panic_message, RuntimeError};
use crate::events::Event;
use crate::registry::{Registry, ServiceState};

/// Outcome of a completed shutdown.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Services whose hook returned `Ok`, in the order they ran.
    pub stopped: Vec<String>,
    /// Hooks that returned an error, panicked or timed out.
    pub failures: Vec<RuntimeError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs every graceful hook. Caller guarantees this happens once per registry.
pub(crate) async fn drain(registry: &Registry) -> ShutdownReport {
    let runtime = registry.name();
    let entries = registry.begin_shutdown();
    registry.events().emit(&Event::RuntimeShutdownInitiated);

    let hook_timeout = registry.config().shutdown_hook_timeout;
    let mut report = ShutdownReport::default();
    tracing::info!(runtime, services = entries.len(), "shutting down services");

    for entry in entries {
        let graceful = match entry.service.as_graceful() {
            Some(hook) if entry.caps.graceful => hook,
            _ => {
                registry.set_state(entry.id, ServiceState::ShutDown);
                continue;
            }
        };

        let name = entry.service.name().to_string();
        registry.set_state(entry.id, ServiceState::ShuttingDown);
        match run_hook(graceful, hook_timeout).await {
            Ok(()) => {
                tracing::debug!(runtime, service = %name, "shutdown hook completed");
                report.stopped.push(name);
            }
            Err(source) => {
                tracing::error!(runtime, service = %name, error = %source, "shutdown hook failed");
                report.failures.push(RuntimeError::ServiceShutdownFailed {
                    service: name,
                    source,
                });
            }
        }
        registry.set_state(entry.id, ServiceState::ShutDown);
    }

    tracing::info!(
        runtime,
        stopped = report.stopped.len(),
        failed = report.failures.len(),
        "shutdown complete"
    );
    report
}

async fn run_hook(hook: &dyn GracefulShutdown, limit: Option<Duration>) -> anyhow::Result<()> {
    let guarded = AssertUnwindSafe(hook.on_shutdown()).catch_unwind();
    let outcome = match limit {
        Some(limit) => tokio::time::timeout(limit, guarded)
            .await
            .map_err(|_| anyhow::anyhow!("shutdown hook timed out after {limit:?}"))?,
        None => guarded.await,
    };
    outcome.unwrap_or_else(|panic| {
        Err(anyhow::anyhow!(
            "shutdown hook panicked: {}",
            panic_message(panic.as_ref())
        ))
    })
}
