//! Domain models shared between the proof-auth module and its plugins.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonical_json_bytes, sha256_hex};

/// Public inputs and proof as submitted by a client for one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofInput {
    /// Non-secret parameters identifying what is being claimed.
    #[serde(default)]
    pub public_input_args: Value,
    /// Opaque, plugin-defined proof artifact.
    #[serde(default)]
    pub proof: Value,
}

impl ProofInput {
    #[must_use]
    pub fn new(public_input_args: Value, proof: Value) -> Self {
        Self {
            public_input_args,
            proof,
        }
    }
}

/// A [`ProofInput`] addressed to a named plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub plugin: String,
    #[serde(flatten)]
    pub input: ProofInput,
}

/// Result of re-checking a previously accepted verification output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutputValidity {
    Valid,
    Invalid { reason: String },
}

impl OutputValidity {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Overall status of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// No plugin succeeded.
    None,
    /// Some, but not every required plugin succeeded.
    Partial,
    /// Every required plugin succeeded.
    Full,
}

impl AuthStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Partial => "partial",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful plugin contribution to an [`AuthResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginOutput {
    /// Output produced by the plugin's verification.
    pub output: Value,
    /// Roles derived from `output`.
    pub roles: Vec<String>,
    /// Combined hash of the cached `(public_input_args, proof)` pair.
    pub proof_hash: String,
}

/// Unified result of an authentication attempt.
///
/// `roles` is always the union of the roles of every entry in `outputs`, and
/// a response with [`AuthStatus::None`] never carries outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub auth_status: AuthStatus,
    pub auth_message: String,
    pub roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, PluginOutput>>,
}

impl AuthResponse {
    /// A response in which no plugin contributed.
    pub fn none(message: impl Into<String>) -> Self {
        Self {
            auth_status: AuthStatus::None,
            auth_message: message.into(),
            roles: BTreeSet::new(),
            outputs: None,
        }
    }

    /// Build a response from the contributing outputs.
    ///
    /// An empty `outputs` map always yields [`AuthStatus::None`], whatever
    /// `status` was requested.
    #[must_use]
    pub fn from_outputs(
        status: AuthStatus,
        message: impl Into<String>,
        outputs: BTreeMap<String, PluginOutput>,
    ) -> Self {
        if outputs.is_empty() || status == AuthStatus::None {
            return Self::none(message);
        }
        let roles = outputs
            .values()
            .flat_map(|o| o.roles.iter().cloned())
            .collect();
        Self {
            auth_status: status,
            auth_message: message.into(),
            roles,
            outputs: Some(outputs),
        }
    }

    /// Contributing plugin outputs, empty for [`AuthStatus::None`].
    #[must_use]
    pub fn contributions(&self) -> impl Iterator<Item = (&str, &PluginOutput)> {
        self.outputs
            .iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Canonical byte form used for hashing and token binding.
    ///
    /// # Errors
    ///
    /// Returns an error if an output value cannot be encoded as JSON.
    pub fn serialized(&self) -> Result<Vec<u8>, serde_json::Error> {
        canonical_json_bytes(self)
    }

    /// Lowercase hex SHA-256 of [`Self::serialized`].
    ///
    /// # Errors
    ///
    /// Returns an error if an output value cannot be encoded as JSON.
    pub fn hash(&self) -> Result<String, serde_json::Error> {
        Ok(sha256_hex(&self.serialized()?))
    }
}

/// Liveness report of a single plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHealth {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PluginHealth {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            detail: None,
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(roles: &[&str]) -> PluginOutput {
        PluginOutput {
            output: json!({"role": roles.first().copied().unwrap_or_default()}),
            roles: roles.iter().map(|r| (*r).to_owned()).collect(),
            proof_hash: "h".to_owned(),
        }
    }

    #[test]
    fn roles_are_union_of_outputs() {
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_owned(), output(&["admin", "user"]));
        outputs.insert("b".to_owned(), output(&["user", "auditor"]));

        let resp = AuthResponse::from_outputs(AuthStatus::Full, "ok", outputs);

        let roles: Vec<&str> = resp.roles.iter().map(String::as_str).collect();
        assert_eq!(roles, vec!["admin", "auditor", "user"]);
    }

    #[test]
    fn empty_outputs_collapse_to_none() {
        let resp = AuthResponse::from_outputs(AuthStatus::Partial, "nothing", BTreeMap::new());
        assert_eq!(resp.auth_status, AuthStatus::None);
        assert!(resp.outputs.is_none());
        assert!(resp.roles.is_empty());
    }

    #[test]
    fn none_response_omits_outputs_field() {
        let value = serde_json::to_value(AuthResponse::none("no")).unwrap();
        assert_eq!(value["authStatus"], "none");
        assert!(value.get("outputs").is_none());
    }

    #[test]
    fn hash_is_stable_across_clones() {
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_owned(), output(&["admin"]));
        let resp = AuthResponse::from_outputs(AuthStatus::Full, "ok", outputs);

        assert_eq!(resp.hash().unwrap(), resp.clone().hash().unwrap());
        assert_eq!(resp.hash().unwrap().len(), 64);
    }

    #[test]
    fn output_validity_wire_format() {
        assert_eq!(
            serde_json::to_value(OutputValidity::invalid("revoked")).unwrap(),
            json!({"status": "invalid", "reason": "revoked"})
        );
        assert_eq!(
            serde_json::to_value(OutputValidity::Valid).unwrap(),
            json!({"status": "valid"})
        );
    }

    #[test]
    fn submission_flattens_proof_input() {
        let sub: ProofSubmission = serde_json::from_value(json!({
            "plugin": "hash-role",
            "publicInputArgs": {"hash": "ab"},
            "proof": {"preimage": "x"}
        }))
        .unwrap();
        assert_eq!(sub.plugin, "hash-role");
        assert_eq!(sub.input.public_input_args, json!({"hash": "ab"}));
    }
}
