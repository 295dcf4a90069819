//! Configuration for the proof-auth module.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::strategy::LoginPolicy;

/// Minimum accepted length of the HMAC signing secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Upper bound for both token lifetimes: ten years.
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_access_token_ttl_secs() -> u64 {
    3600
}

fn default_revalidation_interval_secs() -> u64 {
    300
}

fn default_body_limit_bytes() -> usize {
    1024 * 1024
}

fn default_enabled() -> bool {
    true
}

/// Module configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofAuthConfig {
    /// HMAC secret used to sign access tokens.
    pub jwt_secret: SecretString,

    /// Lifetime of issued access tokens.
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: u64,

    /// Optional server-side lifetime of refresh tokens. Unset means refresh
    /// tokens live until their bound outputs stop being valid.
    #[serde(default)]
    pub refresh_token_ttl_secs: Option<u64>,

    /// Which authentication statuses may log in.
    #[serde(default)]
    pub login_policy: LoginPolicy,

    /// Plugins that must all succeed for a `full` status. Empty means every
    /// plugin named in the request is required.
    #[serde(default)]
    pub required_plugins: Vec<String>,

    /// Period of the background cache sweep. `0` disables it.
    #[serde(default = "default_revalidation_interval_secs")]
    pub revalidation_interval_secs: u64,

    /// Request body size limit for the REST surface.
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,

    /// Per-plugin configuration keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,
}

impl ProofAuthConfig {
    /// Configuration with defaults for everything but the signing secret.
    #[must_use]
    pub fn with_secret(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            access_token_ttl_secs: default_access_token_ttl_secs(),
            refresh_token_ttl_secs: None,
            login_policy: LoginPolicy::default(),
            required_plugins: Vec::new(),
            revalidation_interval_secs: default_revalidation_interval_secs(),
            body_limit_bytes: default_body_limit_bytes(),
            plugins: BTreeMap::new(),
        }
    }

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing secret is too short or a token
    /// lifetime is zero or above [`MAX_TOKEN_TTL_SECS`].
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.expose_secret().len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!("jwt_secret must be at least {MIN_JWT_SECRET_LEN} bytes");
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.access_token_ttl_secs) {
            anyhow::bail!("access_token_ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS}");
        }
        if let Some(ttl) = self.refresh_token_ttl_secs
            && !(1..=MAX_TOKEN_TTL_SECS).contains(&ttl)
        {
            anyhow::bail!("refresh_token_ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS} when set");
        }
        Ok(())
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Option<Duration> {
        self.refresh_token_ttl_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn revalidation_interval(&self) -> Option<Duration> {
        (self.revalidation_interval_secs > 0)
            .then(|| Duration::from_secs(self.revalidation_interval_secs))
    }
}

/// Configuration block of a single plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Plugin-specific settings, handed to the plugin factory as-is.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            config: serde_json::Value::Null,
        }
    }
}
