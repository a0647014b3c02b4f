//! # runkit - Process-wide Service Runtime
//!
//! A container for heterogeneous application services. Each service implements
//! [`Service`] and opts into extra runtime behavior by implementing capability
//! traits and overriding the matching `as_*` query.
//!
//! ## Features
//!
//! - **Capability detection**: logger binding, dependency gating, event binding,
//!   per-kind lifecycle handlers and graceful shutdown, detected once at `add`
//! - **Concurrent init**: every service initializes in its own task and its own
//!   failure boundary
//! - **Dependency gating**: `Dependent` services are polled until their
//!   collaborators are discoverable, with an optional timeout
//! - **Ordered shutdown**: graceful hooks run one at a time in registration order
//!
//! ## Basic Example
//!
//! ```rust,ignore
//! use runkit::{async_trait, GracefulShutdown, Registry, Service, ShutdownOptions};
//! use std::sync::Arc;
//!
//! struct Cache;
//!
//! #[async_trait]
//! impl Service for Cache {
//!     fn name(&self) -> &str { "cache" }
//!     async fn init(&self, _registry: &Registry) -> anyhow::Result<()> { Ok(()) }
//!     fn as_graceful(&self) -> Option<&dyn GracefulShutdown> { Some(self) }
//! }
//!
//! #[async_trait]
//! impl GracefulShutdown for Cache {
//!     async fn on_shutdown(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! let registry = Registry::new();
//! registry.add(Arc::new(Cache));
//! let report = registry.run(ShutdownOptions::Signals).await;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod capabilities;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod logger;
pub mod registry;
pub mod runtime;

pub use capabilities::Capabilities;
pub use config::{parse_level_filter, RuntimeConfig};
pub use contracts::*;
pub use error::RuntimeError;
pub use events::{Event, EventBus, EventCallback, EventKind, SubscriptionId};
pub use logger::{LogSink, ServiceLogger};
pub use registry::{InitHandle, Registry, ServiceState};
pub use runtime::{ShutdownOptions, ShutdownReport};

pub use tracing::level_filters::LevelFilter;
