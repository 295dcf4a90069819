//! Custom routes, mounted under `/plugins/hash-role`.

use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use crate::domain::Service;

/// A grantable role as advertised to clients. Hashes are public inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDto {
    pub hash: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
}

#[must_use]
pub fn router(service: Arc<Service>) -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .layer(Extension(service))
}

async fn list_roles(Extension(service): Extension<Arc<Service>>) -> Json<Vec<RoleDto>> {
    Json(
        service
            .grants()
            .map(|g| RoleDto {
                hash: g.hash.clone(),
                role: g.role.clone(),
                valid_until: g.valid_until,
            })
            .collect(),
    )
}
