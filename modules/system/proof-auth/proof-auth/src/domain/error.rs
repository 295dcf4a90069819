//! Domain errors for the proof-auth module.

use proof_auth_sdk::PluginError;
use thiserror::Error;

/// Errors raised by a [`ProofCache`](super::proof_cache::ProofCache) backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cannot replace existing entry '{hash}' in scope '{scope}'")]
    DuplicateEntry { scope: String, hash: String },

    #[error("no entry '{hash}' in scope '{scope}'")]
    NotFound { scope: String, hash: String },

    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    pub fn duplicate(scope: impl Into<String>, hash: impl Into<String>) -> Self {
        Self::DuplicateEntry {
            scope: scope.into(),
            hash: hash.into(),
        }
    }

    pub fn not_found(scope: impl Into<String>, hash: impl Into<String>) -> Self {
        Self::NotFound {
            scope: scope.into(),
            hash: hash.into(),
        }
    }
}

/// Errors raised by the plugin host when dispatching to a plugin.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("plugin '{0}' is not loaded")]
    PluginNotFound(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors that abort a whole `request_auth` call.
///
/// Per-plugin verification failures are folded into the resulting
/// `AuthResponse` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MapperError {
    #[error("no proofs supplied")]
    EmptyRequest,

    #[error("plugin '{0}' appears more than once in the request")]
    DuplicatePlugin(String),

    #[error("plugin '{0}' is not loaded")]
    PluginNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for MapperError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Errors of the token issuance and refresh-token store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("refresh token not found")]
    NotFound,

    #[error("access token expired")]
    Expired,

    #[error("invalid access token: {0}")]
    Invalid(String),

    #[error("failed to sign access token: {0}")]
    Signing(String),

    #[error("token store error: {0}")]
    Backend(String),
}

/// Session-boundary errors produced by the authentication strategy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("output no longer valid")]
    OutputNoLongerValid,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("plugin '{0}' is not loaded")]
    PluginNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MapperError> for StrategyError {
    fn from(e: MapperError) -> Self {
        match e {
            MapperError::PluginNotFound(name) => Self::PluginNotFound(name),
            MapperError::EmptyRequest | MapperError::DuplicatePlugin(_) => {
                Self::BadRequest(e.to_string())
            }
            MapperError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for StrategyError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::NotFound | TokenError::Expired | TokenError::Invalid(_) => {
                Self::InvalidRefreshToken
            }
            TokenError::Signing(msg) | TokenError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for StrategyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}
