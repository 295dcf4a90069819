//! Proof-auth module wiring.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Router;
use proof_auth_sdk::PluginFactory;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::rest;
use crate::config::ProofAuthConfig;
use crate::domain::auth_mapper::{AuthMapper, OutputRolesMapper, RoleMapper};
use crate::domain::plugin_host::{PluginHost, PluginManifest};
use crate::domain::proof_cache::ProofCache;
use crate::domain::revalidation::RevalidationTask;
use crate::domain::strategy::AuthStrategy;
use crate::domain::token::{RefreshTokenStore, TokenIssuer};
use crate::infra::storage::{InMemoryProofCache, InMemoryRefreshTokenStore};

/// Proof-auth module.
///
/// Owns the plugin host, the stores and the session strategy. Stores default
/// to the in-memory backends and may be replaced before [`build`] is called.
///
/// [`build`]: ProofAuthModuleBuilder::build
pub struct ProofAuthModule {
    config: ProofAuthConfig,
    host: Arc<PluginHost>,
    strategy: Arc<AuthStrategy>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    manifest: PluginManifest,
}

pub struct ProofAuthModuleBuilder {
    config: ProofAuthConfig,
    factories: Vec<Arc<dyn PluginFactory>>,
    proof_cache: Option<Arc<dyn ProofCache>>,
    refresh_tokens: Option<Arc<dyn RefreshTokenStore>>,
    role_mapper: Option<Arc<dyn RoleMapper>>,
}

impl ProofAuthModuleBuilder {
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn PluginFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    #[must_use]
    pub fn proof_cache(mut self, cache: Arc<dyn ProofCache>) -> Self {
        self.proof_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn refresh_token_store(mut self, store: Arc<dyn RefreshTokenStore>) -> Self {
        self.refresh_tokens = Some(store);
        self
    }

    #[must_use]
    pub fn role_mapper(mut self, mapper: Arc<dyn RoleMapper>) -> Self {
        self.role_mapper = Some(mapper);
        self
    }

    /// Validate the configuration and load every plugin.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a required plugin
    /// has no registered factory. Plugins that fail to load are reported in
    /// the manifest instead.
    #[tracing::instrument(skip_all, fields(factories = self.factories.len()))]
    pub async fn build(self) -> anyhow::Result<ProofAuthModule> {
        self.config.validate()?;
        let known: BTreeSet<&str> = self.factories.iter().map(|f| f.name()).collect();
        if let Some(unknown) = self
            .config
            .required_plugins
            .iter()
            .find(|name| !known.contains(name.as_str()))
        {
            anyhow::bail!("required plugin '{unknown}' has no registered factory");
        }
        info!(
            policy = ?self.config.login_policy,
            access_token_ttl_secs = self.config.access_token_ttl_secs,
            "Initializing proof_auth"
        );

        let cache = self
            .proof_cache
            .unwrap_or_else(|| Arc::new(InMemoryProofCache::new()));
        let refresh_tokens = self
            .refresh_tokens
            .unwrap_or_else(|| Arc::new(InMemoryRefreshTokenStore::new()));
        let role_mapper = self
            .role_mapper
            .unwrap_or_else(|| Arc::new(OutputRolesMapper));

        let (host, manifest) =
            PluginHost::load(&self.factories, &self.config.plugins, cache).await;
        if manifest.loaded.is_empty() {
            warn!("No authentication plugin loaded; every login will fail");
        }
        for name in &self.config.required_plugins {
            if !host.contains(name) {
                warn!(plugin = %name, "Required plugin is not loaded; no login can be full");
            }
        }
        let host = Arc::new(host);

        let mapper = Arc::new(AuthMapper::new(
            Arc::clone(&host),
            role_mapper,
            self.config.required_plugins.iter().cloned(),
        ));
        let issuer = Arc::new(TokenIssuer::new(
            &self.config.jwt_secret,
            self.config.access_token_ttl(),
        ));
        let strategy = Arc::new(AuthStrategy::new(
            mapper,
            issuer,
            Arc::clone(&refresh_tokens),
            self.config.login_policy,
            self.config.refresh_token_ttl(),
        ));

        Ok(ProofAuthModule {
            config: self.config,
            host,
            strategy,
            refresh_tokens,
            manifest,
        })
    }
}

impl ProofAuthModule {
    #[must_use]
    pub fn builder(config: ProofAuthConfig) -> ProofAuthModuleBuilder {
        ProofAuthModuleBuilder {
            config,
            factories: Vec::new(),
            proof_cache: None,
            refresh_tokens: None,
            role_mapper: None,
        }
    }

    #[must_use]
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    #[must_use]
    pub fn host(&self) -> &Arc<PluginHost> {
        &self.host
    }

    #[must_use]
    pub fn strategy(&self) -> &Arc<AuthStrategy> {
        &self.strategy
    }

    /// Full REST router with request tracing and the body size limit.
    #[must_use]
    pub fn router(&self) -> Router {
        rest::router(Arc::clone(&self.strategy), Arc::clone(&self.host))
            .layer(RequestBodyLimitLayer::new(self.config.body_limit_bytes))
            .layer(TraceLayer::new_for_http())
    }

    /// Background sweep task, or `None` when revalidation is disabled.
    #[must_use]
    pub fn revalidation_task(&self) -> Option<RevalidationTask> {
        let interval = self.config.revalidation_interval()?;
        Some(RevalidationTask::new(
            Arc::clone(&self.host),
            Arc::clone(&self.refresh_tokens),
            interval,
            self.config.refresh_token_ttl(),
        ))
    }
}
