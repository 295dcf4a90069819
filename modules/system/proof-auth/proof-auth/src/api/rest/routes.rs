use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router, middleware};

use super::handlers;
use super::middleware::bearer_auth;
use crate::domain::plugin_host::PluginHost;
use crate::domain::strategy::AuthStrategy;

/// Session, health and plugin routes.
///
/// `/token`, `/logout` and `/protected` require a bearer access token.
#[must_use]
pub fn router(strategy: Arc<AuthStrategy>, host: Arc<PluginHost>) -> Router {
    let session = Router::new()
        .route("/token", post(handlers::refresh_token))
        .route("/logout", post(handlers::logout))
        .route("/protected", get(handlers::protected))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(strategy.issuer()),
            bearer_auth,
        ));

    Router::new()
        .route("/login", post(handlers::login))
        .route("/health", get(handlers::health))
        .route("/plugins/activePlugins", get(handlers::active_plugins))
        .route("/plugins/health", get(handlers::plugins_health))
        .merge(session)
        .merge(host.routes())
        .layer(Extension(strategy))
        .layer(Extension(host))
}
