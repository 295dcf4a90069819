//! Content-addressed cache of accepted proofs.
//!
//! Every plugin owns one scope. Within a scope an entry is keyed by the
//! combined hash of its `(public_input_args, proof)` pair and may be stored
//! at most once.

use async_trait::async_trait;
use futures::future::BoxFuture;
use proof_auth_sdk::{PluginError, canonical_json_bytes, sha256_hex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CacheError;

/// A cached `(public_input_args, proof)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProof {
    pub combined_hash: String,
    pub public_input_args: Value,
    pub proof: Value,
}

/// Outcome of a [`ProofCache::check_each`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub removed: usize,
}

/// Predicate deciding whether a cached entry is kept.
///
/// `Ok(false)` and `Err(_)` both drop the entry.
pub type ProofPredicate =
    dyn Fn(CachedProof) -> BoxFuture<'static, Result<bool, PluginError>> + Send + Sync;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashInput<'a> {
    public_input_args: &'a Value,
    proof: &'a Value,
}

/// Hex SHA-256 over the canonical JSON of `{publicInputArgs, proof}`.
///
/// # Errors
///
/// Returns `Backend` if the values cannot be encoded.
pub fn compute_combined_hash(public_input_args: &Value, proof: &Value) -> Result<String, CacheError> {
    let bytes = canonical_json_bytes(&HashInput {
        public_input_args,
        proof,
    })
    .map_err(|e| CacheError::Backend(e.to_string()))?;
    Ok(sha256_hex(&bytes))
}

/// Storage backend for accepted proofs.
#[async_trait]
pub trait ProofCache: Send + Sync {
    /// Store a pair and return its combined hash.
    ///
    /// The duplicate check and the insert are atomic per hash.
    ///
    /// # Errors
    ///
    /// - `DuplicateEntry` if the hash is already present in `scope`
    async fn store_proof(
        &self,
        scope: &str,
        public_input_args: Value,
        proof: Value,
    ) -> Result<String, CacheError>;

    /// # Errors
    ///
    /// - `NotFound` if no entry has this hash in `scope`
    async fn get_proof(&self, scope: &str, combined_hash: &str) -> Result<CachedProof, CacheError>;

    /// Remove an entry. Removing an absent entry succeeds.
    ///
    /// # Errors
    ///
    /// - `Backend` if the store is unreachable
    async fn invalidate_proof(&self, scope: &str, combined_hash: &str) -> Result<(), CacheError>;

    /// Keep only the entries of `scope` for which `predicate` returns
    /// `Ok(true)`.
    ///
    /// # Errors
    ///
    /// - `Backend` if the store is unreachable; predicate failures never
    ///   abort the sweep
    async fn check_each(
        &self,
        scope: &str,
        predicate: &ProofPredicate,
    ) -> Result<SweepReport, CacheError>;

    /// Number of entries in `scope`.
    ///
    /// # Errors
    ///
    /// - `Backend` if the store is unreachable
    async fn count(&self, scope: &str) -> Result<usize, CacheError>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn combined_hash_ignores_key_order() {
        let a = compute_combined_hash(&json!({"x": 1, "y": 2}), &json!({"p": "q"})).unwrap();
        let b = compute_combined_hash(&json!({"y": 2, "x": 1}), &json!({"p": "q"})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn combined_hash_binds_both_halves() {
        let base = compute_combined_hash(&json!({"x": 1}), &json!("proof")).unwrap();
        let other_proof = compute_combined_hash(&json!({"x": 1}), &json!("proof2")).unwrap();
        let other_input = compute_combined_hash(&json!({"x": 2}), &json!("proof")).unwrap();
        assert_ne!(base, other_proof);
        assert_ne!(base, other_input);
    }
}
