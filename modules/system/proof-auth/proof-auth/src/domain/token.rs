//! Access tokens and refresh tokens.
//!
//! Access tokens are HS256 JWTs whose only binding claim is the hash of the
//! [`AuthResponse`] they were issued for. Refresh tokens are opaque random
//! strings mapped server-side to that same response.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use proof_auth_sdk::AuthResponse;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::TokenError;

/// Number of random bytes in a refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 48;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenClaims {
    pub auth_resp_hash: String,
    pub iat: u64,
    pub exp: u64,
}

/// Signs and verifies access tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let key = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a fresh token bound to `auth_resp_hash`.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the token cannot be encoded.
    pub fn sign(&self, auth_resp_hash: &str) -> Result<String, TokenError> {
        let iat = jsonwebtoken::get_current_timestamp();
        let claims = AccessTokenClaims {
            auth_resp_hash: auth_resp_hash.to_owned(),
            iat,
            exp: iat.saturating_add(self.ttl.as_secs()),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry.
    ///
    /// # Errors
    ///
    /// - `Expired` if `exp` has passed
    /// - `Invalid` for any other defect
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}

/// Fresh hex-encoded refresh token.
#[must_use]
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// What a refresh token maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub auth_response: AuthResponse,
    pub issued_at: OffsetDateTime,
}

/// Server-side refresh-token storage.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Store `auth_response` under a fresh token and return the token.
    ///
    /// # Errors
    ///
    /// - `Backend` if the store is unreachable
    async fn store_auth_response(&self, auth_response: AuthResponse) -> Result<String, TokenError>;

    /// # Errors
    ///
    /// - `NotFound` if the token is unknown or was invalidated
    async fn get_auth_response(&self, refresh_token: &str)
    -> Result<RefreshTokenRecord, TokenError>;

    /// Forget a token. Forgetting an unknown token succeeds.
    ///
    /// # Errors
    ///
    /// - `Backend` if the store is unreachable
    async fn invalidate_refresh_token(&self, refresh_token: &str) -> Result<(), TokenError>;

    /// Drop every token issued before `cutoff` and return how many went.
    ///
    /// # Errors
    ///
    /// - `Backend` if the store is unreachable
    async fn purge_issued_before(&self, cutoff: OffsetDateTime) -> Result<usize, TokenError>;
}
