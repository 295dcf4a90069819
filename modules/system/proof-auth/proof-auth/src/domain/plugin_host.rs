//! Plugin host: name-keyed registry of active plugins.
//!
//! The host is the only component that talks to plugins and the only owner
//! of the proof cache. Plugins are resolved once at startup from their
//! factories; a factory that fails does not prevent the others from loading.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::Router;
use futures::FutureExt;
use proof_auth_sdk::{
    AuthPlugin, OutputValidity, PluginError, PluginFactory, PluginHealth, ProofInput,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::error::{CacheError, HostError};
use super::proof_cache::{CachedProof, ProofCache, SweepReport};
use crate::config::PluginConfig;

/// Path segments under `/plugins` used by the host itself.
pub const RESERVED_PLUGIN_NAMES: &[&str] = &["activePlugins", "health"];

const PLUGIN_PANICKED: &str = "plugin panicked";

/// Await a plugin call, turning a panic into `PluginError::Internal`.
async fn contained<T>(call: impl Future<Output = Result<T, PluginError>>) -> Result<T, PluginError> {
    AssertUnwindSafe(call)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(PluginError::internal(PLUGIN_PANICKED)))
}

/// A plugin that failed to initialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPlugin {
    pub name: String,
    pub reason: String,
}

/// Startup report of which plugins were loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginManifest {
    pub loaded: Vec<String>,
    pub disabled: Vec<String>,
    pub failed: Vec<FailedPlugin>,
}

/// Successful verification through the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub output: Value,
    pub proof_hash: String,
}

/// Aggregated liveness of all loaded plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostHealth {
    pub healthy: bool,
    pub plugins: BTreeMap<String, PluginHealth>,
}

pub struct PluginHost {
    plugins: BTreeMap<String, Arc<dyn AuthPlugin>>,
    cache: Arc<dyn ProofCache>,
}

impl PluginHost {
    #[must_use]
    pub fn new(cache: Arc<dyn ProofCache>) -> Self {
        Self {
            plugins: BTreeMap::new(),
            cache,
        }
    }

    /// Initialize every factory against its configuration block.
    ///
    /// Plugins without a configuration block are created with a `null`
    /// config. Configuration blocks naming no known factory are reported as
    /// failed.
    #[tracing::instrument(skip_all, fields(factories = factories.len()))]
    pub async fn load(
        factories: &[Arc<dyn PluginFactory>],
        configs: &BTreeMap<String, PluginConfig>,
        cache: Arc<dyn ProofCache>,
    ) -> (Self, PluginManifest) {
        let mut host = Self::new(cache);
        let mut manifest = PluginManifest::default();

        for factory in factories {
            let name = factory.name().to_owned();
            let cfg = configs.get(&name).cloned().unwrap_or_default();

            if !cfg.enabled {
                info!(plugin = %name, "Plugin disabled by configuration");
                manifest.disabled.push(name);
                continue;
            }

            match host.try_create(factory.as_ref(), &name, &cfg.config).await {
                Ok(plugin) => {
                    host.plugins.insert(name.clone(), plugin);
                    info!(plugin = %name, "Plugin loaded");
                    manifest.loaded.push(name);
                }
                Err(reason) => {
                    warn!(plugin = %name, %reason, "Plugin failed to load");
                    manifest.failed.push(FailedPlugin { name, reason });
                }
            }
        }

        for name in configs.keys() {
            if !factories.iter().any(|f| f.name() == name) {
                warn!(plugin = %name, "Configuration names an unknown plugin");
                manifest.failed.push(FailedPlugin {
                    name: name.clone(),
                    reason: "no plugin factory registered under this name".to_owned(),
                });
            }
        }

        info!(
            loaded = manifest.loaded.len(),
            disabled = manifest.disabled.len(),
            failed = manifest.failed.len(),
            "Plugin host ready"
        );
        (host, manifest)
    }

    async fn try_create(
        &self,
        factory: &dyn PluginFactory,
        name: &str,
        config: &Value,
    ) -> Result<Arc<dyn AuthPlugin>, String> {
        if RESERVED_PLUGIN_NAMES.contains(&name) {
            return Err(format!("'{name}' is a reserved plugin name"));
        }
        if self.plugins.contains_key(name) {
            return Err(format!("a plugin named '{name}' is already loaded"));
        }
        AssertUnwindSafe(factory.create(config))
            .catch_unwind()
            .await
            .map_err(|_| "plugin factory panicked".to_owned())?
            .map_err(|e| e.to_string())
    }

    /// Register an already constructed plugin.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is reserved or already taken.
    pub fn register(&mut self, name: &str, plugin: Arc<dyn AuthPlugin>) -> anyhow::Result<()> {
        if RESERVED_PLUGIN_NAMES.contains(&name) {
            anyhow::bail!("'{name}' is a reserved plugin name");
        }
        if self.plugins.contains_key(name) {
            anyhow::bail!("a plugin named '{name}' is already loaded");
        }
        self.plugins.insert(name.to_owned(), plugin);
        Ok(())
    }

    /// Names of the active plugins, sorted.
    #[must_use]
    pub fn active_plugins(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    fn plugin(&self, name: &str) -> Result<&Arc<dyn AuthPlugin>, HostError> {
        self.plugins
            .get(name)
            .ok_or_else(|| HostError::PluginNotFound(name.to_owned()))
    }

    /// Verify a proof with the named plugin and cache the accepted pair.
    ///
    /// The cache write runs on its own task so that it completes even if the
    /// caller is dropped mid-request.
    ///
    /// # Errors
    ///
    /// - `PluginNotFound` for unknown names
    /// - `Plugin` if verification fails or the plugin panics; the cache is
    ///   left untouched
    /// - `Cache(DuplicateEntry)` if this exact proof was already accepted
    pub async fn verify(&self, name: &str, input: &ProofInput) -> Result<Verified, HostError> {
        let plugin = self.plugin(name)?;
        let output = contained(plugin.verify_and_get_output(input)).await?;

        let cache = Arc::clone(&self.cache);
        let scope = name.to_owned();
        let public_input_args = input.public_input_args.clone();
        let proof = input.proof.clone();
        let proof_hash = tokio::spawn(async move {
            cache.store_proof(&scope, public_input_args, proof).await
        })
        .await
        .map_err(|e| CacheError::Backend(format!("cache write task failed: {e}")))??;

        Ok(Verified { output, proof_hash })
    }

    /// # Errors
    ///
    /// - `PluginNotFound` for unknown names
    /// - `Plugin` if the plugin could not perform the check or panicked
    pub async fn check_output_validity(
        &self,
        name: &str,
        output: &Value,
    ) -> Result<OutputValidity, HostError> {
        let plugin = self.plugin(name)?;
        Ok(contained(plugin.check_output_validity(output)).await?)
    }

    /// Whether the proof behind `proof_hash` is still accepted.
    ///
    /// # Errors
    ///
    /// - `Cache(Backend)` if the cache is unreachable
    pub async fn is_cached(&self, name: &str, proof_hash: &str) -> Result<bool, HostError> {
        match self.cache.get_proof(name, proof_hash).await {
            Ok(_) => Ok(true),
            Err(CacheError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a cached proof.
    ///
    /// # Errors
    ///
    /// - `Cache(NotFound)` if it is not cached
    pub async fn cached_proof(&self, name: &str, proof_hash: &str) -> Result<CachedProof, HostError> {
        Ok(self.cache.get_proof(name, proof_hash).await?)
    }

    /// Explicitly revoke an accepted proof.
    ///
    /// # Errors
    ///
    /// - `PluginNotFound` for unknown names
    pub async fn revoke(&self, name: &str, proof_hash: &str) -> Result<(), HostError> {
        self.plugin(name)?;
        self.cache.invalidate_proof(name, proof_hash).await?;
        info!(plugin = name, hash = proof_hash, "Proof revoked");
        Ok(())
    }

    /// Re-verify every cached proof of one plugin and drop those whose
    /// output is no longer valid.
    ///
    /// # Errors
    ///
    /// - `PluginNotFound` for unknown names
    /// - `Cache` if the sweep could not run
    pub async fn revalidate(&self, name: &str) -> Result<SweepReport, HostError> {
        let plugin = Arc::clone(self.plugin(name)?);
        let predicate = move |entry: CachedProof| {
            let plugin = Arc::clone(&plugin);
            async move {
                let input = ProofInput::new(entry.public_input_args, entry.proof);
                let output = contained(plugin.verify_and_get_output(&input)).await?;
                let validity = contained(plugin.check_output_validity(&output)).await?;
                Ok::<_, PluginError>(validity.is_valid())
            }
            .boxed()
        };
        Ok(self.cache.check_each(name, &predicate).await?)
    }

    /// Run [`Self::revalidate`] over every loaded plugin.
    pub async fn revalidate_all(&self) -> BTreeMap<String, Result<SweepReport, HostError>> {
        let mut reports = BTreeMap::new();
        for name in self.plugins.keys() {
            reports.insert(name.clone(), self.revalidate(name).await);
        }
        reports
    }

    /// Every plugin's custom routes nested under `/plugins/{name}`.
    #[must_use]
    pub fn routes(&self) -> Router {
        let mut router = Router::new();
        for (name, plugin) in &self.plugins {
            if let Some(plugin_router) = plugin.routes() {
                router = router.nest(&format!("/plugins/{name}"), plugin_router);
            }
        }
        router
    }

    pub async fn health(&self) -> HostHealth {
        let checks = self
            .plugins
            .iter()
            .map(|(name, plugin)| async move {
                let health = AssertUnwindSafe(plugin.health())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| PluginHealth::unhealthy(PLUGIN_PANICKED));
                (name.clone(), health)
            });
        let plugins: BTreeMap<String, PluginHealth> =
            futures::future::join_all(checks).await.into_iter().collect();
        HostHealth {
            healthy: plugins.values().all(|h| h.healthy),
            plugins,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::infra::storage::InMemoryProofCache;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Accepts any proof equal to `"ok"`; validity is toggled externally.
    struct EchoPlugin {
        valid: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AuthPlugin for EchoPlugin {
        async fn verify_and_get_output(&self, input: &ProofInput) -> Result<Value, PluginError> {
            if input.proof == json!("ok") {
                Ok(json!({"role": input.public_input_args["role"]}))
            } else {
                Err(PluginError::verification("bad proof"))
            }
        }

        async fn check_output_validity(&self, _output: &Value) -> Result<OutputValidity, PluginError> {
            if self.valid.load(Ordering::SeqCst) {
                Ok(OutputValidity::Valid)
            } else {
                Ok(OutputValidity::invalid("revoked"))
            }
        }
    }

    struct EchoFactory {
        name: &'static str,
        valid: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PluginFactory for EchoFactory {
        fn name(&self) -> &str {
            self.name
        }

        async fn create(&self, config: &Value) -> Result<Arc<dyn AuthPlugin>, PluginError> {
            if config.get("fail").is_some() {
                return Err(PluginError::config("asked to fail"));
            }
            Ok(Arc::new(EchoPlugin {
                valid: Arc::clone(&self.valid),
            }))
        }
    }

    /// Panics on proof `"panic"`, in every validity check and in health.
    struct Panicky;

    #[async_trait]
    impl AuthPlugin for Panicky {
        async fn verify_and_get_output(&self, input: &ProofInput) -> Result<Value, PluginError> {
            assert_ne!(input.proof, json!("panic"), "verifier blew up");
            Ok(input.public_input_args.clone())
        }

        async fn check_output_validity(&self, _output: &Value) -> Result<OutputValidity, PluginError> {
            panic!("validity check blew up")
        }

        async fn health(&self) -> PluginHealth {
            panic!("health check blew up")
        }
    }

    fn with_panicky(cache: Arc<dyn ProofCache>) -> PluginHost {
        let mut host = PluginHost::new(cache);
        host.register(
            "good",
            Arc::new(EchoPlugin {
                valid: Arc::new(AtomicBool::new(true)),
            }),
        )
        .unwrap();
        host.register("bad", Arc::new(Panicky)).unwrap();
        host
    }

    fn factory(name: &'static str) -> (Arc<dyn PluginFactory>, Arc<AtomicBool>) {
        let valid = Arc::new(AtomicBool::new(true));
        (
            Arc::new(EchoFactory {
                name,
                valid: Arc::clone(&valid),
            }),
            valid,
        )
    }

    fn cache() -> Arc<dyn ProofCache> {
        Arc::new(InMemoryProofCache::new())
    }

    #[tokio::test]
    async fn failing_plugin_does_not_block_others() {
        let (a, _) = factory("a");
        let (b, _) = factory("b");
        let mut configs = BTreeMap::new();
        configs.insert(
            "b".to_owned(),
            PluginConfig {
                enabled: true,
                config: json!({"fail": true}),
            },
        );

        let (host, manifest) = PluginHost::load(&[a, b], &configs, cache()).await;

        assert_eq!(host.active_plugins(), vec!["a".to_owned()]);
        assert_eq!(manifest.loaded, vec!["a".to_owned()]);
        assert_eq!(manifest.failed.len(), 1);
        assert_eq!(manifest.failed[0].name, "b");
    }

    #[tokio::test]
    async fn disabled_and_unknown_plugins_are_reported() {
        let (a, _) = factory("a");
        let mut configs = BTreeMap::new();
        configs.insert(
            "a".to_owned(),
            PluginConfig {
                enabled: false,
                config: Value::Null,
            },
        );
        configs.insert("ghost".to_owned(), PluginConfig::default());

        let (host, manifest) = PluginHost::load(&[a], &configs, cache()).await;

        assert!(host.active_plugins().is_empty());
        assert_eq!(manifest.disabled, vec!["a".to_owned()]);
        assert_eq!(manifest.failed[0].name, "ghost");
    }

    #[tokio::test]
    async fn reserved_names_are_refused() {
        let (health, _) = factory("health");
        let (host, manifest) = PluginHost::load(&[health], &BTreeMap::new(), cache()).await;
        assert!(host.active_plugins().is_empty());
        assert_eq!(manifest.failed[0].name, "health");
    }

    #[tokio::test]
    async fn verify_unknown_plugin_is_not_found() {
        let host = PluginHost::new(cache());
        let err = host
            .verify("nope", &ProofInput::new(json!({}), json!("ok")))
            .await
            .unwrap_err();
        assert_eq!(err, HostError::PluginNotFound("nope".to_owned()));
    }

    #[tokio::test]
    async fn verify_caches_accepted_proof_and_rejects_replay() {
        let (a, _) = factory("a");
        let (host, _) = PluginHost::load(&[a], &BTreeMap::new(), cache()).await;
        let input = ProofInput::new(json!({"role": "admin"}), json!("ok"));

        let verified = host.verify("a", &input).await.unwrap();
        assert_eq!(verified.output, json!({"role": "admin"}));
        assert!(host.is_cached("a", &verified.proof_hash).await.unwrap());

        let replay = host.verify("a", &input).await.unwrap_err();
        assert!(matches!(
            replay,
            HostError::Cache(CacheError::DuplicateEntry { .. })
        ));
    }

    #[tokio::test]
    async fn failed_verification_leaves_cache_untouched() {
        let shared = cache();
        let (a, _) = factory("a");
        let (host, _) = PluginHost::load(&[a], &BTreeMap::new(), Arc::clone(&shared)).await;

        let err = host
            .verify("a", &ProofInput::new(json!({}), json!("bad")))
            .await
            .unwrap_err();

        assert!(matches!(err, HostError::Plugin(PluginError::Verification(_))));
        assert_eq!(shared.count("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn revalidate_drops_entries_once_output_turns_invalid() {
        let (a, valid) = factory("a");
        let (host, _) = PluginHost::load(&[a], &BTreeMap::new(), cache()).await;
        let verified = host
            .verify("a", &ProofInput::new(json!({"role": "x"}), json!("ok")))
            .await
            .unwrap();

        let report = host.revalidate("a").await.unwrap();
        assert_eq!(report.removed, 0);

        valid.store(false, Ordering::SeqCst);
        let report = host.revalidate("a").await.unwrap();
        assert_eq!(report, SweepReport { checked: 1, removed: 1 });
        assert!(!host.is_cached("a", &verified.proof_hash).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_removes_cached_proof() {
        let (a, _) = factory("a");
        let (host, _) = PluginHost::load(&[a], &BTreeMap::new(), cache()).await;
        let verified = host
            .verify("a", &ProofInput::new(json!({}), json!("ok")))
            .await
            .unwrap();

        host.revoke("a", &verified.proof_hash).await.unwrap();
        host.revoke("a", &verified.proof_hash).await.unwrap();

        assert!(!host.is_cached("a", &verified.proof_hash).await.unwrap());
    }

    #[tokio::test]
    async fn health_aggregates_plugins() {
        let (a, _) = factory("a");
        let (b, _) = factory("b");
        let (host, _) = PluginHost::load(&[a, b], &BTreeMap::new(), cache()).await;

        let health = host.health().await;
        assert!(health.healthy);
        assert_eq!(health.plugins.len(), 2);
    }

    #[tokio::test]
    async fn panicking_verifier_becomes_internal_error() {
        let shared = cache();
        let host = with_panicky(Arc::clone(&shared));

        let err = host
            .verify("bad", &ProofInput::new(json!({}), json!("panic")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HostError::Plugin(PluginError::Internal("plugin panicked".to_owned()))
        );
        assert_eq!(shared.count("bad").await.unwrap(), 0);

        assert!(
            host.verify("good", &ProofInput::new(json!({}), json!("ok")))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn panicking_validity_check_becomes_internal_error() {
        let host = with_panicky(cache());
        let err = host
            .check_output_validity("bad", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HostError::Plugin(PluginError::Internal("plugin panicked".to_owned()))
        );
    }

    #[tokio::test]
    async fn panicking_plugin_does_not_abort_revalidation() {
        let host = with_panicky(cache());
        let bad = host
            .verify("bad", &ProofInput::new(json!({"n": 1}), json!("fine")))
            .await
            .unwrap();
        let good = host
            .verify("good", &ProofInput::new(json!({}), json!("ok")))
            .await
            .unwrap();

        let reports = host.revalidate_all().await;

        assert_eq!(
            reports["bad"].as_ref().unwrap(),
            &SweepReport { checked: 1, removed: 1 }
        );
        assert_eq!(
            reports["good"].as_ref().unwrap(),
            &SweepReport { checked: 1, removed: 0 }
        );
        assert!(!host.is_cached("bad", &bad.proof_hash).await.unwrap());
        assert!(host.is_cached("good", &good.proof_hash).await.unwrap());
    }

    #[tokio::test]
    async fn panicking_health_check_reports_unhealthy() {
        let host = with_panicky(cache());
        let health = host.health().await;
        assert!(!health.healthy);
        assert!(health.plugins["good"].healthy);
        assert_eq!(
            health.plugins["bad"],
            PluginHealth::unhealthy("plugin panicked")
        );
    }
}
