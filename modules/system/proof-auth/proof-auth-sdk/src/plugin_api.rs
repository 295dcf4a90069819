//! Plugin API traits for proof-auth verification methods.
//!
//! The plugin host resolves every configured [`PluginFactory`] at startup and
//! dispatches verification and validity calls to the resulting
//! [`AuthPlugin`] instances by name.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PluginError;
use crate::models::{OutputValidity, PluginHealth, ProofInput};

/// Plugin API trait for a single category of proof.
#[async_trait]
pub trait AuthPlugin: Send + Sync {
    /// Verify a submitted proof and return the plugin-specific output.
    ///
    /// Must be deterministic: identical input yields identical output or an
    /// identical failure.
    ///
    /// # Errors
    ///
    /// - `Verification` if the proof does not check out or its public inputs
    ///   are absent or unrecognized
    /// - `Internal` for unexpected errors
    async fn verify_and_get_output(&self, input: &ProofInput) -> Result<Value, PluginError>;

    /// Re-check whether a previously produced output is still trusted.
    ///
    /// Never mutates plugin state.
    ///
    /// # Errors
    ///
    /// - `Internal` if the check itself could not be performed
    async fn check_output_validity(&self, output: &Value) -> Result<OutputValidity, PluginError>;

    /// Custom routes mounted by the host under `/plugins/{name}`.
    fn routes(&self) -> Option<axum::Router> {
        None
    }

    /// Liveness of the plugin's own dependencies.
    async fn health(&self) -> PluginHealth {
        PluginHealth::healthy()
    }
}

/// Startup-time constructor for a named plugin.
#[async_trait]
pub trait PluginFactory: Send + Sync {
    /// Name under which the plugin is registered and routed.
    fn name(&self) -> &str;

    /// Build the plugin from its configuration block.
    ///
    /// # Errors
    ///
    /// - `Config` if the configuration is malformed
    async fn create(&self, config: &Value) -> Result<Arc<dyn AuthPlugin>, PluginError>;
}
