//! Shutdown triggers for [`Registry::run`](crate::Registry::run).
//!
//! Shutdown can be driven by OS signals, an external `CancellationToken`, or an
//! arbitrary future. Whichever fires first cancels the registry's own token.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use super::signals;

/// How `run` should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGINT / SIGTERM / SIGQUIT).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, shutdown starts.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl std::fmt::Debug for ShutdownOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownOptions::Signals => f.write_str("Signals"),
            ShutdownOptions::Token(_) => f.write_str("Token"),
            ShutdownOptions::Future(_) => f.write_str("Future"),
        }
    }
}

/// Spawns the waiter that cancels `cancel` when the chosen trigger fires.
/// The waiter exits quietly if `cancel` is cancelled by someone else first.
pub(crate) fn arm(options: ShutdownOptions, cancel: CancellationToken) {
    match options {
        ShutdownOptions::Signals => {
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = signals::wait_for_shutdown() => {
                        if let Err(e) = result {
                            tracing::warn!(
                                error = %e,
                                "shutdown: primary waiter failed; falling back to ctrl_c()"
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                _ = tokio::signal::ctrl_c() => {}
                            }
                        }
                        tracing::info!("shutdown: signal received");
                    }
                }
                cancel.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = waiter => tracing::info!("shutdown: external future completed"),
                }
                cancel.cancel();
            });
        }
        ShutdownOptions::Token(external) => {
            tracing::info!("shutdown: external token will control lifecycle");
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = external.cancelled() => {}
                }
                cancel.cancel();
            });
        }
    }
}
