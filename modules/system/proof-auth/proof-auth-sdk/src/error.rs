//! Error types for proof-auth plugins.

use thiserror::Error;

/// Errors a plugin may return from verification or validity checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    /// The proof does not satisfy the plugin's check, or required public
    /// inputs are absent or unrecognized.
    #[error("verification failed: {0}")]
    Verification(String),

    /// The plugin could not be constructed from its configuration.
    #[error("invalid plugin configuration: {0}")]
    Config(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PluginError {
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
