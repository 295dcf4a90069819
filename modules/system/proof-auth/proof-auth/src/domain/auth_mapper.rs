//! Aggregation of per-plugin results into a single [`AuthResponse`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proof_auth_sdk::{AuthResponse, AuthStatus, OutputValidity, PluginOutput, ProofSubmission};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{HostError, MapperError};
use super::plugin_host::PluginHost;

/// Derives role strings from a plugin's verification output.
pub trait RoleMapper: Send + Sync {
    fn roles(&self, plugin: &str, output: &Value) -> Vec<String>;
}

impl<F> RoleMapper for F
where
    F: Fn(&str, &Value) -> Vec<String> + Send + Sync,
{
    fn roles(&self, plugin: &str, output: &Value) -> Vec<String> {
        self(plugin, output)
    }
}

/// Reads `role` (string) and `roles` (array of strings) from the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputRolesMapper;

impl RoleMapper for OutputRolesMapper {
    fn roles(&self, _plugin: &str, output: &Value) -> Vec<String> {
        let mut roles = Vec::new();
        if let Some(role) = output.get("role").and_then(Value::as_str) {
            roles.push(role.to_owned());
        }
        if let Some(list) = output.get("roles").and_then(Value::as_array) {
            roles.extend(list.iter().filter_map(Value::as_str).map(str::to_owned));
        }
        roles.sort();
        roles.dedup();
        roles
    }
}

/// Login body: either one submission or a `proofs` list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LoginRequest {
    Many { proofs: Vec<ProofSubmission> },
    Single(ProofSubmission),
}

impl LoginRequest {
    #[must_use]
    pub fn into_submissions(self) -> Vec<ProofSubmission> {
        match self {
            Self::Many { proofs } => proofs,
            Self::Single(one) => vec![one],
        }
    }
}

/// Output that did not survive a validity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidOutput {
    pub plugin: String,
    pub reason: String,
}

/// Result of [`AuthMapper::check_auth_validity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthValidity {
    /// The response rebuilt from the outputs that are still valid.
    pub response: AuthResponse,
    pub invalid: Vec<InvalidOutput>,
}

impl AuthValidity {
    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// One entry of a [`ValidityCheckInput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityCheckEntry {
    pub plugin: String,
    pub output: Value,
    pub proof_hash: String,
}

/// The parts of an [`AuthResponse`] needed to re-check it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidityCheckInput {
    pub entries: Vec<ValidityCheckEntry>,
}

pub struct AuthMapper {
    host: Arc<PluginHost>,
    role_mapper: Arc<dyn RoleMapper>,
    required_plugins: BTreeSet<String>,
}

impl AuthMapper {
    #[must_use]
    pub fn new(
        host: Arc<PluginHost>,
        role_mapper: Arc<dyn RoleMapper>,
        required_plugins: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            host,
            role_mapper,
            required_plugins: required_plugins.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &Arc<PluginHost> {
        &self.host
    }

    /// Verify every submission and aggregate the outcome.
    ///
    /// Individual verification failures lower the status instead of failing
    /// the call.
    ///
    /// # Errors
    ///
    /// - `EmptyRequest` for an empty list
    /// - `DuplicatePlugin` if a plugin is named twice
    /// - `PluginNotFound` if a named plugin is not loaded
    #[tracing::instrument(skip_all, fields(submissions = submissions.len()))]
    pub async fn request_auth(
        &self,
        submissions: Vec<ProofSubmission>,
    ) -> Result<AuthResponse, MapperError> {
        if submissions.is_empty() {
            return Err(MapperError::EmptyRequest);
        }
        let mut seen = BTreeSet::new();
        for sub in &submissions {
            if !seen.insert(sub.plugin.as_str()) {
                return Err(MapperError::DuplicatePlugin(sub.plugin.clone()));
            }
            if !self.host.contains(&sub.plugin) {
                return Err(MapperError::PluginNotFound(sub.plugin.clone()));
            }
        }

        let required: BTreeSet<String> = if self.required_plugins.is_empty() {
            seen.iter().map(|s| (*s).to_owned()).collect()
        } else {
            self.required_plugins.clone()
        };

        let attempts = submissions.iter().map(|sub| async move {
            (sub.plugin.clone(), self.host.verify(&sub.plugin, &sub.input).await)
        });
        let results = futures::future::join_all(attempts).await;

        let mut outputs = BTreeMap::new();
        let mut failures: BTreeMap<String, String> = BTreeMap::new();
        for (plugin, result) in results {
            match result {
                Ok(verified) => {
                    let roles = self.role_mapper.roles(&plugin, &verified.output);
                    debug!(plugin = %plugin, roles = ?roles, "Proof accepted");
                    outputs.insert(
                        plugin,
                        PluginOutput {
                            output: verified.output,
                            roles,
                            proof_hash: verified.proof_hash,
                        },
                    );
                }
                Err(e) => {
                    debug!(plugin = %plugin, error = %e, "Proof rejected");
                    failures.insert(plugin, e.to_string());
                }
            }
        }
        for name in &required {
            if !outputs.contains_key(name) && !failures.contains_key(name) {
                failures.insert(name.clone(), "no proof supplied".to_owned());
            }
        }

        let status = if outputs.is_empty() {
            AuthStatus::None
        } else if required.iter().all(|name| outputs.contains_key(name)) {
            AuthStatus::Full
        } else {
            AuthStatus::Partial
        };

        let message = match status {
            AuthStatus::Full => "authenticated".to_owned(),
            AuthStatus::Partial | AuthStatus::None => describe_failures(status, &failures),
        };

        Ok(AuthResponse::from_outputs(status, message, outputs))
    }

    /// The per-plugin data needed to re-check `response`.
    #[must_use]
    pub fn extract_validity_check(response: &AuthResponse) -> ValidityCheckInput {
        ValidityCheckInput {
            entries: response
                .contributions()
                .map(|(plugin, out)| ValidityCheckEntry {
                    plugin: plugin.to_owned(),
                    output: out.output.clone(),
                    proof_hash: out.proof_hash.clone(),
                })
                .collect(),
        }
    }

    /// Re-check every contributing output of `response`.
    ///
    /// An output counts as invalid if its proof has left the cache, if the
    /// plugin reports it invalid, if the plugin errors, or if the plugin is
    /// no longer loaded.
    #[tracing::instrument(skip_all, fields(status = %response.auth_status))]
    pub async fn check_auth_validity(&self, response: &AuthResponse) -> AuthValidity {
        let check = Self::extract_validity_check(response);
        let checks = check.entries.iter().map(|entry| async move {
            (entry.plugin.clone(), self.check_entry(entry).await)
        });
        let results = futures::future::join_all(checks).await;

        let mut invalid = Vec::new();
        let mut still_valid = BTreeSet::new();
        for (plugin, verdict) in results {
            match verdict {
                Ok(()) => {
                    still_valid.insert(plugin);
                }
                Err(reason) => {
                    debug!(plugin = %plugin, %reason, "Output no longer valid");
                    invalid.push(InvalidOutput { plugin, reason });
                }
            }
        }

        if invalid.is_empty() {
            return AuthValidity {
                response: response.clone(),
                invalid,
            };
        }

        let outputs: BTreeMap<String, PluginOutput> = response
            .contributions()
            .filter(|(plugin, _)| still_valid.contains(*plugin))
            .map(|(plugin, out)| (plugin.to_owned(), out.clone()))
            .collect();
        let status = if outputs.is_empty() {
            AuthStatus::None
        } else {
            AuthStatus::Partial
        };
        let message = invalid
            .iter()
            .map(|i| format!("{}: {}", i.plugin, i.reason))
            .collect::<Vec<_>>()
            .join("; ");

        AuthValidity {
            response: AuthResponse::from_outputs(status, message, outputs),
            invalid,
        }
    }

    async fn check_entry(&self, entry: &ValidityCheckEntry) -> Result<(), String> {
        match self.host.is_cached(&entry.plugin, &entry.proof_hash).await {
            Ok(true) => {}
            Ok(false) => return Err("proof is no longer accepted".to_owned()),
            Err(e) => return Err(e.to_string()),
        }
        match self
            .host
            .check_output_validity(&entry.plugin, &entry.output)
            .await
        {
            Ok(OutputValidity::Valid) => Ok(()),
            Ok(OutputValidity::Invalid { reason }) => Err(reason),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Drop the cached proofs behind `response` so they can be submitted
    /// again.
    pub async fn release(&self, response: &AuthResponse) {
        for (plugin, out) in response.contributions() {
            if let Err(e) = self.host.revoke(plugin, &out.proof_hash).await
                && !matches!(e, HostError::PluginNotFound(_))
            {
                warn!(plugin, error = %e, "Failed to release cached proof");
            }
        }
    }
}

fn describe_failures(status: AuthStatus, failures: &BTreeMap<String, String>) -> String {
    let detail = failures
        .iter()
        .map(|(plugin, reason)| format!("{plugin}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ");
    match status {
        AuthStatus::Partial => format!("partially authenticated; {detail}"),
        _ if detail.is_empty() => "authentication failed".to_owned(),
        _ => format!("authentication failed; {detail}"),
    }
}
