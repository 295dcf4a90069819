//! In-memory [`ProofCache`] backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use crate::domain::error::CacheError;
use crate::domain::proof_cache::{
    CachedProof, ProofCache, ProofPredicate, SweepReport, compute_combined_hash,
};

/// A stored proof and the insert that produced it. A sweep only removes the
/// generation it checked.
struct Slot {
    proof: CachedProof,
    generation: u64,
}

type Scope = DashMap<String, Slot>;

/// Process-local proof cache.
///
/// One `DashMap` per plugin scope; the entry API makes the duplicate check
/// and the insert a single locked operation on the hash's shard.
#[derive(Default)]
pub struct InMemoryProofCache {
    scopes: DashMap<String, Arc<Scope>>,
    generations: AtomicU64,
}

impl InMemoryProofCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, scope: &str) -> Option<Arc<Scope>> {
        self.scopes.get(scope).map(|s| Arc::clone(s.value()))
    }

    fn scope_or_create(&self, scope: &str) -> Arc<Scope> {
        if let Some(existing) = self.scope(scope) {
            return existing;
        }
        Arc::clone(
            self.scopes
                .entry(scope.to_owned())
                .or_insert_with(|| Arc::new(DashMap::new()))
                .value(),
        )
    }
}

#[async_trait]
impl ProofCache for InMemoryProofCache {
    async fn store_proof(
        &self,
        scope: &str,
        public_input_args: Value,
        proof: Value,
    ) -> Result<String, CacheError> {
        let combined_hash = compute_combined_hash(&public_input_args, &proof)?;
        let entries = self.scope_or_create(scope);

        match entries.entry(combined_hash.clone()) {
            Entry::Occupied(_) => Err(CacheError::duplicate(scope, combined_hash)),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    proof: CachedProof {
                        combined_hash: combined_hash.clone(),
                        public_input_args,
                        proof,
                    },
                    generation: self.generations.fetch_add(1, Ordering::Relaxed),
                });
                tracing::debug!(scope, hash = %combined_hash, "Stored proof");
                Ok(combined_hash)
            }
        }
    }

    async fn get_proof(&self, scope: &str, combined_hash: &str) -> Result<CachedProof, CacheError> {
        self.scope(scope)
            .and_then(|entries| entries.get(combined_hash).map(|e| e.value().proof.clone()))
            .ok_or_else(|| CacheError::not_found(scope, combined_hash))
    }

    async fn invalidate_proof(&self, scope: &str, combined_hash: &str) -> Result<(), CacheError> {
        if let Some(entries) = self.scope(scope)
            && entries.remove(combined_hash).is_some()
        {
            tracing::debug!(scope, hash = %combined_hash, "Invalidated proof");
        }
        Ok(())
    }

    async fn check_each(
        &self,
        scope: &str,
        predicate: &ProofPredicate,
    ) -> Result<SweepReport, CacheError> {
        let Some(entries) = self.scope(scope) else {
            return Ok(SweepReport::default());
        };

        let snapshot: Vec<(u64, CachedProof)> = entries
            .iter()
            .map(|e| (e.value().generation, e.value().proof.clone()))
            .collect();
        let checks = snapshot.into_iter().map(|(generation, entry)| {
            let hash = entry.combined_hash.clone();
            let fut = predicate(entry);
            async move { (hash, generation, fut.await) }
        });
        let results = futures::future::join_all(checks).await;

        let mut report = SweepReport {
            checked: results.len(),
            removed: 0,
        };
        for (hash, generation, result) in results {
            let keep = match result {
                Ok(keep) => keep,
                Err(e) => {
                    tracing::warn!(scope, hash = %hash, error = %e, "Proof check failed, dropping entry");
                    false
                }
            };
            if !keep
                && entries
                    .remove_if(&hash, |_, slot| slot.generation == generation)
                    .is_some()
            {
                report.removed += 1;
            }
        }

        tracing::debug!(
            scope,
            checked = report.checked,
            removed = report.removed,
            "Proof cache sweep finished"
        );
        Ok(report)
    }

    async fn count(&self, scope: &str) -> Result<usize, CacheError> {
        Ok(self.scope(scope).map_or(0, |entries| entries.len()))
    }
}
