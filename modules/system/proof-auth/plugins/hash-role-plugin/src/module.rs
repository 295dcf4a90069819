//! Hash-role plugin factory.

use std::sync::Arc;

use async_trait::async_trait;
use proof_auth_sdk::{AuthPlugin, PluginError, PluginFactory};
use serde_json::Value;
use tracing::info;

use crate::config::HashRolePluginConfig;
use crate::domain::Service;
use crate::domain::client::HashRolePlugin;

/// Name under which the plugin is registered.
pub const PLUGIN_NAME: &str = "hash-role";

#[derive(Debug, Clone, Copy, Default)]
pub struct HashRolePluginFactory;

#[async_trait]
impl PluginFactory for HashRolePluginFactory {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn create(&self, config: &Value) -> Result<Arc<dyn AuthPlugin>, PluginError> {
        info!("Initializing hash_role_plugin");

        let cfg: HashRolePluginConfig = if config.is_null() {
            HashRolePluginConfig::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| PluginError::config(e.to_string()))?
        };
        if cfg.roles.is_empty() {
            tracing::warn!("Hash-role plugin has no grants configured; every proof will be rejected");
        }

        let service = Service::from_config(&cfg)?;
        info!(
            grants = cfg.roles.len(),
            revoked = cfg.revoked.len(),
            "Hash-role plugin initialized"
        );
        Ok(Arc::new(HashRolePlugin::new(Arc::new(service))))
    }
}
