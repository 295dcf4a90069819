//! Service implementation for the hash-role plugin.

use std::collections::{BTreeMap, HashSet};

use proof_auth_sdk::{OutputValidity, PluginError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::config::{HashRolePluginConfig, RoleGrant};

/// Output produced for an accepted preimage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutput {
    pub hash: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
}

#[derive(Deserialize)]
struct PublicInput {
    hash: String,
}

#[derive(Deserialize)]
struct PreimageProof {
    preimage: String,
}

/// Hash-role verification service.
pub struct Service {
    grants: BTreeMap<String, RoleGrant>,
    revoked: HashSet<String>,
}

impl Service {
    /// Create a service from plugin configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a hash is not 64 hex characters or appears twice.
    pub fn from_config(cfg: &HashRolePluginConfig) -> Result<Self, PluginError> {
        let mut grants = BTreeMap::new();
        for grant in &cfg.roles {
            let hash = normalize_hash(&grant.hash)
                .ok_or_else(|| PluginError::config(format!("'{}' is not a SHA-256 hex digest", grant.hash)))?;
            let grant = RoleGrant {
                hash: hash.clone(),
                ..grant.clone()
            };
            if grants.insert(hash.clone(), grant).is_some() {
                return Err(PluginError::config(format!("hash '{hash}' is configured twice")));
            }
        }
        let revoked = cfg
            .revoked
            .iter()
            .filter_map(|h| normalize_hash(h))
            .collect();

        Ok(Self { grants, revoked })
    }

    /// Configured grants, ordered by hash.
    pub fn grants(&self) -> impl Iterator<Item = &RoleGrant> {
        self.grants.values()
    }

    /// Check the preimage against the named hash.
    ///
    /// # Errors
    ///
    /// Returns `Verification` for malformed inputs, unknown, revoked or
    /// expired (as of `now`) grants, and preimages that do not hash to the
    /// named value.
    pub fn verify(
        &self,
        public_input_args: &Value,
        proof: &Value,
        now: OffsetDateTime,
    ) -> Result<GrantOutput, PluginError> {
        let input: PublicInput = serde_json::from_value(public_input_args.clone())
            .map_err(|_| PluginError::verification("publicInputArgs.hash is required"))?;
        let proof: PreimageProof = serde_json::from_value(proof.clone())
            .map_err(|_| PluginError::verification("proof.preimage is required"))?;

        let hash = normalize_hash(&input.hash)
            .ok_or_else(|| PluginError::verification("hash is not a SHA-256 hex digest"))?;
        let grant = self
            .grants
            .get(&hash)
            .ok_or_else(|| PluginError::verification("hash is not recognized"))?;
        if self.revoked.contains(&hash) {
            return Err(PluginError::verification("grant has been revoked"));
        }
        if is_expired(grant, now) {
            return Err(PluginError::verification("grant has expired"));
        }

        let digest = hex::encode(Sha256::digest(proof.preimage.as_bytes()));
        if digest != hash {
            return Err(PluginError::verification("preimage does not match hash"));
        }

        Ok(GrantOutput {
            hash,
            role: grant.role.clone(),
            valid_until: grant.valid_until,
        })
    }

    /// Whether a previously produced output still grants its role.
    #[must_use]
    pub fn check(&self, output: &Value, now: OffsetDateTime) -> OutputValidity {
        let Ok(output) = serde_json::from_value::<GrantOutput>(output.clone()) else {
            return OutputValidity::invalid("output was not produced by this plugin");
        };
        let Some(grant) = self.grants.get(&output.hash) else {
            return OutputValidity::invalid("hash is no longer recognized");
        };
        if self.revoked.contains(&output.hash) {
            return OutputValidity::invalid("grant has been revoked");
        }
        if grant.role != output.role {
            return OutputValidity::invalid("role has changed");
        }
        if is_expired(grant, now) {
            return OutputValidity::invalid("grant has expired");
        }
        OutputValidity::Valid
    }
}

fn is_expired(grant: &RoleGrant, now: OffsetDateTime) -> bool {
    grant
        .valid_until
        .is_some_and(|until| now.unix_timestamp() >= until)
}

fn normalize_hash(hash: &str) -> Option<String> {
    let hash = hash.trim().to_ascii_lowercase();
    (hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())).then_some(hash)
}
