//! In-memory [`RefreshTokenStore`] backend.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use proof_auth_sdk::AuthResponse;
use time::OffsetDateTime;

use crate::domain::error::TokenError;
use crate::domain::token::{RefreshTokenRecord, RefreshTokenStore, generate_refresh_token};

/// Attempts at drawing an unused token before giving up.
const MAX_GENERATION_ATTEMPTS: usize = 4;

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: DashMap<String, RefreshTokenRecord>,
}

impl InMemoryRefreshTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, refresh_token: &str, by: time::Duration) {
        self.tokens.alter(refresh_token, |_, mut record| {
            record.issued_at -= by;
            record
        });
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store_auth_response(&self, auth_response: AuthResponse) -> Result<String, TokenError> {
        let record = RefreshTokenRecord {
            auth_response,
            issued_at: OffsetDateTime::now_utc(),
        };
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let token = generate_refresh_token();
            if let Entry::Vacant(slot) = self.tokens.entry(token.clone()) {
                slot.insert(record);
                return Ok(token);
            }
            tracing::warn!("Refresh token collision, drawing again");
        }
        Err(TokenError::Backend(
            "could not allocate an unused refresh token".to_owned(),
        ))
    }

    async fn get_auth_response(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshTokenRecord, TokenError> {
        self.tokens
            .get(refresh_token)
            .map(|r| r.value().clone())
            .ok_or(TokenError::NotFound)
    }

    async fn invalidate_refresh_token(&self, refresh_token: &str) -> Result<(), TokenError> {
        self.tokens.remove(refresh_token);
        Ok(())
    }

    async fn purge_issued_before(&self, cutoff: OffsetDateTime) -> Result<usize, TokenError> {
        let before = self.tokens.len();
        self.tokens.retain(|_, record| record.issued_at >= cutoff);
        Ok(before.saturating_sub(self.tokens.len()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_get_invalidate() {
        let store = InMemoryRefreshTokenStore::new();
        let resp = AuthResponse::none("x");

        let token = store.store_auth_response(resp.clone()).await.unwrap();
        assert_eq!(store.get_auth_response(&token).await.unwrap().auth_response, resp);

        store.invalidate_refresh_token(&token).await.unwrap();
        store.invalidate_refresh_token(&token).await.unwrap();
        assert_eq!(
            store.get_auth_response(&token).await,
            Err(TokenError::NotFound)
        );
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let store = InMemoryRefreshTokenStore::new();
        assert_eq!(
            store.get_auth_response("nope").await,
            Err(TokenError::NotFound)
        );
    }

    #[tokio::test]
    async fn purge_drops_only_older_tokens() {
        let store = InMemoryRefreshTokenStore::new();
        let old = store.store_auth_response(AuthResponse::none("old")).await.unwrap();
        let fresh = store.store_auth_response(AuthResponse::none("new")).await.unwrap();
        store.backdate(&old, time::Duration::hours(2));

        let cutoff = OffsetDateTime::now_utc() - time::Duration::hours(1);
        assert_eq!(store.purge_issued_before(cutoff).await.unwrap(), 1);
        assert!(store.get_auth_response(&old).await.is_err());
        assert!(store.get_auth_response(&fresh).await.is_ok());
    }
}
