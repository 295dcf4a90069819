use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::{Extension, Json};

use super::dto::{LoginResponseDto, MessageDto, ProtectedDto, RefreshRequestDto, TokenResponseDto};
use super::error::Problem;
use crate::domain::auth_mapper::LoginRequest;
use crate::domain::plugin_host::{HostHealth, PluginHost};
use crate::domain::strategy::AuthStrategy;
use crate::domain::token::AccessTokenClaims;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Problem> {
    payload.map(|Json(v)| v).map_err(|rejection| {
        let status = rejection.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Problem::new(status, "Payload Too Large", rejection.body_text())
        } else {
            Problem::bad_request(rejection.body_text())
        }
    })
}

#[tracing::instrument(skip_all)]
pub async fn login(
    Extension(strategy): Extension<Arc<AuthStrategy>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponseDto>, Problem> {
    let request = body(payload)?;
    let success = strategy.login(request.into_submissions()).await?;
    Ok(Json(LoginResponseDto {
        message: success.message,
        token: success.token,
        refresh_token: success.refresh_token,
    }))
}

#[tracing::instrument(skip_all)]
pub async fn refresh_token(
    Extension(strategy): Extension<Arc<AuthStrategy>>,
    Extension(claims): Extension<AccessTokenClaims>,
    payload: Result<Json<RefreshRequestDto>, JsonRejection>,
) -> Result<Json<TokenResponseDto>, Problem> {
    let request = body(payload)?;
    let token = strategy.refresh(&request.refresh_token, &claims).await?;
    Ok(Json(TokenResponseDto { token }))
}

#[tracing::instrument(skip_all)]
pub async fn logout(
    Extension(strategy): Extension<Arc<AuthStrategy>>,
    Extension(claims): Extension<AccessTokenClaims>,
    payload: Result<Json<RefreshRequestDto>, JsonRejection>,
) -> Result<Json<MessageDto>, Problem> {
    let request = body(payload)?;
    strategy.logout(&request.refresh_token, &claims).await?;
    Ok(Json(MessageDto::new("logged out")))
}

pub async fn protected(Extension(claims): Extension<AccessTokenClaims>) -> Json<ProtectedDto> {
    Json(ProtectedDto {
        message: "authenticated".to_owned(),
        auth_resp_hash: claims.auth_resp_hash,
    })
}

pub async fn health() -> Json<MessageDto> {
    Json(MessageDto::new("OK"))
}

pub async fn active_plugins(Extension(host): Extension<Arc<PluginHost>>) -> Json<Vec<String>> {
    Json(host.active_plugins())
}

pub async fn plugins_health(
    Extension(host): Extension<Arc<PluginHost>>,
) -> (StatusCode, Json<HostHealth>) {
    let health = host.health().await;
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}
