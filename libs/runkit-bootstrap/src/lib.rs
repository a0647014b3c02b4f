pub mod config;
pub mod config_provider;
pub mod logging;
pub mod paths;

pub use config::*;
pub use config_provider::*;
pub use logging::*;

/// Serializes tests that touch process-wide environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
