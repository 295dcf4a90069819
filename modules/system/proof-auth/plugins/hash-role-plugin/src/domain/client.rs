//! `AuthPlugin` implementation for the hash-role plugin.

use async_trait::async_trait;
use axum::Router;
use proof_auth_sdk::{AuthPlugin, OutputValidity, PluginError, ProofInput};
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;

use super::service::Service;

/// Shared handle registered with the plugin host.
pub struct HashRolePlugin {
    service: Arc<Service>,
}

impl HashRolePlugin {
    #[must_use]
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl AuthPlugin for HashRolePlugin {
    async fn verify_and_get_output(&self, input: &ProofInput) -> Result<Value, PluginError> {
        let output = self
            .service
            .verify(&input.public_input_args, &input.proof, OffsetDateTime::now_utc())?;
        tracing::debug!(role = %output.role, "Preimage accepted");
        serde_json::to_value(output).map_err(|e| PluginError::internal(e.to_string()))
    }

    async fn check_output_validity(&self, output: &Value) -> Result<OutputValidity, PluginError> {
        Ok(self.service.check(output, OffsetDateTime::now_utc()))
    }

    fn routes(&self) -> Option<Router> {
        Some(crate::api::router(Arc::clone(&self.service)))
    }
}
