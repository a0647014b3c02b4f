use tokio::signal;

use crate::error::RuntimeError;

/// Wait for a termination signal: Ctrl+C everywhere, plus SIGTERM and SIGQUIT on unix.
pub async fn wait_for_shutdown() -> Result<(), RuntimeError> {
    let received = tokio::select! {
        result = ctrl_c() => result?,
        result = terminate() => result?,
    };

    tracing::info!(signal = received, "Shutdown signal received, initiating graceful shutdown");
    Ok(())
}

async fn ctrl_c() -> Result<&'static str, RuntimeError> {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(%e, "Failed to install Ctrl+C handler");
        return Err(RuntimeError::Signal(e));
    }
    Ok("Ctrl+C")
}

#[cfg(unix)]
async fn terminate() -> Result<&'static str, RuntimeError> {
    use signal::unix::SignalKind;

    let install = |kind: SignalKind, label: &str| {
        signal::unix::signal(kind).map_err(|e| {
            tracing::error!(%e, "Failed to install {label} handler");
            RuntimeError::Signal(e)
        })
    };
    let mut term = install(SignalKind::terminate(), "SIGTERM")?;
    let mut quit = install(SignalKind::quit(), "SIGQUIT")?;

    tokio::select! {
        _ = term.recv() => Ok("SIGTERM"),
        _ = quit.recv() => Ok("SIGQUIT"),
    }
}

#[cfg(not(unix))]
async fn terminate() -> Result<&'static str, RuntimeError> {
    std::future::pending().await
}
