use crate::config::AppConfig;
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Configuration provider handed to services that read their own section.
pub trait ConfigProvider: Send + Sync {
    /// Raw configuration of one service, keyed by service name.
    fn service_config(&self, service_name: &str) -> Option<&serde_json::Value>;

    /// A top-level section ("runtime", "logging") as JSON.
    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value>;
}

/// Deserialize a service's section, falling back to `T::default()` when absent.
pub fn service_config_typed<T>(provider: &dyn ConfigProvider, service_name: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    match provider.service_config(service_name) {
        Some(raw) => serde_json::from_value(raw.clone())
            .with_context(|| format!("invalid configuration for service '{service_name}'")),
        None => Ok(T::default()),
    }
}

/// Implementation of ConfigProvider that uses AppConfig
#[derive(Clone)]
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }
}

impl ConfigProvider for AppConfigProvider {
    fn service_config(&self, service_name: &str) -> Option<&serde_json::Value> {
        self.0.services.get(service_name)
    }

    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "home_dir" => Some(serde_json::Value::String(self.0.home_dir.clone())),
            "runtime" => serde_json::to_value(&self.0.runtime).ok(),
            "logging" => self
                .0
                .logging
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            _ => None,
        }
    }
}
