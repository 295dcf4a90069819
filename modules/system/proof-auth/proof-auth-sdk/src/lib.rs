//! Proof-Auth SDK
//!
//! This crate provides the public contract of the `proof_auth` module:
//!
//! - [`AuthPlugin`] - Plugin API trait every verification method implements
//! - [`PluginFactory`] - Startup-time constructor for a named plugin
//! - [`AuthResponse`] - Unified outcome of evaluating one or more plugins
//! - [`OutputValidity`] - Result of re-checking a previously accepted output
//! - [`PluginError`] - Plugin-level error type
//!
//! ## Usage
//!
//! ```ignore
//! use proof_auth_sdk::{AuthPlugin, OutputValidity, PluginError, ProofInput};
//!
//! struct AlwaysValid;
//!
//! #[async_trait::async_trait]
//! impl AuthPlugin for AlwaysValid {
//!     async fn verify_and_get_output(&self, input: &ProofInput) -> Result<serde_json::Value, PluginError> {
//!         Ok(input.public_input_args.clone())
//!     }
//!
//!     async fn check_output_validity(&self, _output: &serde_json::Value) -> Result<OutputValidity, PluginError> {
//!         Ok(OutputValidity::Valid)
//!     }
//! }
//! ```

pub mod canonical;
pub mod error;
pub mod models;
pub mod plugin_api;

// Re-export main types at crate root
pub use canonical::{canonical_json_bytes, sha256_hex};
pub use error::PluginError;
pub use models::{
    AuthResponse, AuthStatus, OutputValidity, PluginHealth, PluginOutput, ProofInput,
    ProofSubmission,
};
pub use plugin_api::{AuthPlugin, PluginFactory};
