//! Errors reported by the runtime on behalf of individual services.

use std::any::Any;
use std::time::Duration;

use thiserror::Error;

/// Failures contained at a single service's boundary.
///
/// None of these abort the registry: the failing service is logged and marked,
/// every other service keeps going.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("initialization failed for service '{service}'")]
    ServiceInitFailed {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("shutdown hook failed for service '{service}'")]
    ServiceShutdownFailed {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("dependencies of service '{service}' unresolved after {waited:?}")]
    DependencyResolutionTimeout { service: String, waited: Duration },

    #[error("dependency resolution for service '{service}' abandoned: service was removed")]
    DependencyResolutionCancelled { service: String },

    #[error("registry is shutting down; service '{service}' was not started")]
    ShuttingDown { service: String },

    #[error("failed to install shutdown signal handler")]
    Signal(#[source] std::io::Error),
}

impl RuntimeError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::ServiceInitFailed { .. } => "service_init_failed",
            RuntimeError::ServiceShutdownFailed { .. } => "service_shutdown_failed",
            RuntimeError::DependencyResolutionTimeout { .. } => "dependency_resolution_timeout",
            RuntimeError::DependencyResolutionCancelled { .. } => "dependency_resolution_cancelled",
            RuntimeError::ShuttingDown { .. } => "runtime_shutting_down",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }

    /// Name of the service the error is attributed to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            RuntimeError::ServiceInitFailed { service, .. }
            | RuntimeError::ServiceShutdownFailed { service, .. }
            | RuntimeError::DependencyResolutionTimeout { service, .. }
            | RuntimeError::DependencyResolutionCancelled { service }
            | RuntimeError::ShuttingDown { service } => Some(service),
            RuntimeError::Signal(_) => None,
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_service_attribution() {
        let err = RuntimeError::DependencyResolutionTimeout {
            service: "web".into(),
            waited: Duration::from_secs(1),
        };
        assert_eq!(err.as_label(), "dependency_resolution_timeout");
        assert_eq!(err.service(), Some("web"));

        let err = RuntimeError::Signal(std::io::Error::other("nope"));
        assert_eq!(err.service(), None);
    }

    #[test]
    fn init_failure_keeps_source_chain() {
        let err = RuntimeError::ServiceInitFailed {
            service: "db".into(),
            source: anyhow::anyhow!("connection refused"),
        };
        assert_eq!(err.to_string(), "initialization failed for service 'db'");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection refused"));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let boxed: Box<dyn Any + Send> = Box::new("static boom");
        assert_eq!(panic_message(boxed.as_ref()), "static boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(boxed.as_ref()), "owned boom");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
