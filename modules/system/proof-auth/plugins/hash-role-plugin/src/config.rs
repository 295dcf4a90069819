//! Configuration for the hash-role plugin.

use serde::{Deserialize, Serialize};

/// Plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashRolePluginConfig {
    /// Hashes that grant a role.
    pub roles: Vec<RoleGrant>,

    /// Hashes whose grants are withdrawn.
    pub revoked: Vec<String>,
}

/// One hash-to-role grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleGrant {
    /// Lowercase hex SHA-256 of the secret preimage.
    pub hash: String,

    /// Role granted to holders of the preimage.
    pub role: String,

    /// Unix timestamp (seconds) after which the grant is no longer valid.
    #[serde(default)]
    pub valid_until: Option<i64>,
}
