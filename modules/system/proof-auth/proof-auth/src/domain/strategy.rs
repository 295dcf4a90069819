//! Session lifecycle: login, refresh and logout.

use std::sync::Arc;
use std::time::Duration;

use proof_auth_sdk::{AuthResponse, AuthStatus, ProofSubmission};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::auth_mapper::AuthMapper;
use super::error::{StrategyError, TokenError};
use super::token::{AccessTokenClaims, RefreshTokenStore, TokenIssuer};

/// Which authentication statuses are allowed to start a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginPolicy {
    /// Only [`AuthStatus::Full`].
    #[default]
    FullOnly,
    /// [`AuthStatus::Full`] and [`AuthStatus::Partial`].
    AllowPartial,
}

impl LoginPolicy {
    #[must_use]
    pub fn accepts(self, status: AuthStatus) -> bool {
        match self {
            Self::FullOnly => status == AuthStatus::Full,
            Self::AllowPartial => status != AuthStatus::None,
        }
    }
}

/// Tokens handed out by a successful login.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub message: String,
    pub token: String,
    pub refresh_token: String,
    pub auth_response: AuthResponse,
}

pub struct AuthStrategy {
    mapper: Arc<AuthMapper>,
    issuer: Arc<TokenIssuer>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    policy: LoginPolicy,
    refresh_ttl: Option<Duration>,
}

impl AuthStrategy {
    #[must_use]
    pub fn new(
        mapper: Arc<AuthMapper>,
        issuer: Arc<TokenIssuer>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        policy: LoginPolicy,
        refresh_ttl: Option<Duration>,
    ) -> Self {
        Self {
            mapper,
            issuer,
            refresh_tokens,
            policy,
            refresh_ttl,
        }
    }

    #[must_use]
    pub fn mapper(&self) -> &Arc<AuthMapper> {
        &self.mapper
    }

    #[must_use]
    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Authenticate `submissions` and open a session.
    ///
    /// On rejection, or if the session cannot be stored, the proofs accepted
    /// during this attempt are released from the cache.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` with the aggregated message if the status is not
    ///   accepted by the login policy
    /// - `BadRequest`/`PluginNotFound` for malformed requests
    /// - `Internal` if signing or the refresh-token store fails
    #[tracing::instrument(skip_all)]
    pub async fn login(
        &self,
        submissions: Vec<ProofSubmission>,
    ) -> Result<LoginSuccess, StrategyError> {
        let auth_response = self.mapper.request_auth(submissions).await?;

        if !self.policy.accepts(auth_response.auth_status) {
            info!(status = %auth_response.auth_status, "Login rejected");
            self.mapper.release(&auth_response).await;
            return Err(StrategyError::Unauthorized(auth_response.auth_message));
        }

        let (token, refresh_token) = match self.open_session(&auth_response).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Session could not be opened");
                self.mapper.release(&auth_response).await;
                return Err(e);
            }
        };

        info!(
            status = %auth_response.auth_status,
            roles = auth_response.roles.len(),
            "Login succeeded"
        );
        Ok(LoginSuccess {
            message: auth_response.auth_message.clone(),
            token,
            refresh_token,
            auth_response,
        })
    }

    async fn open_session(
        &self,
        auth_response: &AuthResponse,
    ) -> Result<(String, String), StrategyError> {
        let hash = auth_response.hash()?;
        let token = self.issuer.sign(&hash)?;
        let refresh_token = self
            .refresh_tokens
            .store_auth_response(auth_response.clone())
            .await?;
        Ok((token, refresh_token))
    }

    /// Issue a new access token for the session behind `refresh_token`.
    ///
    /// # Errors
    ///
    /// - `InvalidRefreshToken` if the token is unknown, expired, or bound to
    ///   a different response than `claims`
    /// - `OutputNoLongerValid` if any bound output stopped being valid; the
    ///   refresh token is invalidated
    #[tracing::instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        claims: &AccessTokenClaims,
    ) -> Result<String, StrategyError> {
        let auth_response = self.bound_response(refresh_token, claims).await?;

        let validity = self.mapper.check_auth_validity(&auth_response).await;
        if !validity.all_valid() {
            info!(invalid = validity.invalid.len(), "Session outputs no longer valid");
            self.refresh_tokens
                .invalidate_refresh_token(refresh_token)
                .await?;
            return Err(StrategyError::OutputNoLongerValid);
        }

        let token = self.issuer.sign(&claims.auth_resp_hash)?;
        debug!("Access token refreshed");
        Ok(token)
    }

    /// End the session behind `refresh_token`. Logging out twice succeeds.
    ///
    /// # Errors
    ///
    /// - `InvalidRefreshToken` if the token is bound to a different response
    ///   than `claims`
    #[tracing::instrument(skip_all)]
    pub async fn logout(
        &self,
        refresh_token: &str,
        claims: &AccessTokenClaims,
    ) -> Result<(), StrategyError> {
        let record = match self.refresh_tokens.get_auth_response(refresh_token).await {
            Ok(record) => record,
            Err(TokenError::NotFound) => {
                debug!("Refresh token already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if record.auth_response.hash()? != claims.auth_resp_hash {
            warn!("Logout attempted with an access token of another session");
            return Err(StrategyError::InvalidRefreshToken);
        }
        self.refresh_tokens
            .invalidate_refresh_token(refresh_token)
            .await?;
        info!("Logged out");
        Ok(())
    }

    async fn bound_response(
        &self,
        refresh_token: &str,
        claims: &AccessTokenClaims,
    ) -> Result<AuthResponse, StrategyError> {
        let record = self.refresh_tokens.get_auth_response(refresh_token).await?;

        if let Some(ttl) = self.refresh_ttl
            && OffsetDateTime::now_utc() - record.issued_at > ttl
        {
            self.refresh_tokens
                .invalidate_refresh_token(refresh_token)
                .await?;
            debug!("Refresh token expired");
            return Err(StrategyError::InvalidRefreshToken);
        }

        if record.auth_response.hash()? != claims.auth_resp_hash {
            warn!("Refresh token presented with an access token of another session");
            return Err(StrategyError::InvalidRefreshToken);
        }
        Ok(record.auth_response)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::auth_mapper::OutputRolesMapper;
    use crate::domain::plugin_host::PluginHost;
    use crate::domain::token::RefreshTokenRecord;
    use crate::infra::storage::{InMemoryProofCache, InMemoryRefreshTokenStore};
    use async_trait::async_trait;
    use proof_auth_sdk::{AuthPlugin, OutputValidity, PluginError, ProofInput};
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Toggle {
        valid: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AuthPlugin for Toggle {
        async fn verify_and_get_output(&self, input: &ProofInput) -> Result<Value, PluginError> {
            if input.proof == json!("ok") {
                Ok(input.public_input_args.clone())
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

    struct Fixture {
        strategy: AuthStrategy,
        store: Arc<InMemoryRefreshTokenStore>,
        valid: Arc<AtomicBool>,
    }

    fn fixture(policy: LoginPolicy, refresh_ttl: Option<Duration>) -> Fixture {
        let mut host = PluginHost::new(Arc::new(InMemoryProofCache::new()));
        let valid = Arc::new(AtomicBool::new(true));
        host.register(
            "a",
            Arc::new(Toggle {
                valid: Arc::clone(&valid),
            }),
        )
        .unwrap();
        host.register(
            "b",
            Arc::new(Toggle {
                valid: Arc::new(AtomicBool::new(true)),
            }),
        )
        .unwrap();
        let mapper = Arc::new(AuthMapper::new(
            Arc::new(host),
            Arc::new(OutputRolesMapper),
            Vec::new(),
        ));
        let issuer = Arc::new(TokenIssuer::new(
            &SecretString::from("s".repeat(32)),
            Duration::from_secs(60),
        ));
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        Fixture {
            strategy: AuthStrategy::new(
                mapper,
                issuer,
                Arc::clone(&store) as Arc<dyn RefreshTokenStore>,
                policy,
                refresh_ttl,
            ),
            store,
            valid,
        }
    }

    fn sub(plugin: &str, role: &str, proof: &str) -> ProofSubmission {
        ProofSubmission {
            plugin: plugin.to_owned(),
            input: ProofInput::new(json!({"role": role}), json!(proof)),
        }
    }

    /// Store whose every operation fails.
    struct Unreachable;

    #[async_trait]
    impl RefreshTokenStore for Unreachable {
        async fn store_auth_response(&self, _: AuthResponse) -> Result<String, TokenError> {
            Err(TokenError::Backend("unreachable".to_owned()))
        }

        async fn get_auth_response(
            &self,
            _: &str,
        ) -> Result<RefreshTokenRecord, TokenError> {
            Err(TokenError::Backend("unreachable".to_owned()))
        }

        async fn invalidate_refresh_token(&self, _: &str) -> Result<(), TokenError> {
            Err(TokenError::Backend("unreachable".to_owned()))
        }

        async fn purge_issued_before(&self, _: OffsetDateTime) -> Result<usize, TokenError> {
            Err(TokenError::Backend("unreachable".to_owned()))
        }
    }

    async fn login(f: &Fixture, role: &str) -> (LoginSuccess, AccessTokenClaims) {
        let ok = f.strategy.login(vec![sub("a", role, "ok")]).await.unwrap();
        let claims = f.strategy.issuer().verify(&ok.token).unwrap();
        (ok, claims)
    }

    #[tokio::test]
    async fn login_binds_token_to_response_hash() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let (ok, claims) = login(&f, "admin").await;

        assert_eq!(claims.auth_resp_hash, ok.auth_response.hash().unwrap());
        assert_eq!(ok.message, "authenticated");
        assert_eq!(ok.refresh_token.len(), 96);
    }

    #[tokio::test]
    async fn store_failure_releases_proofs() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let broken = AuthStrategy::new(
            Arc::clone(f.strategy.mapper()),
            Arc::clone(f.strategy.issuer()),
            Arc::new(Unreachable),
            LoginPolicy::FullOnly,
            None,
        );

        let err = broken
            .login(vec![sub("a", "admin", "ok")])
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Internal(_)));

        let ok = f
            .strategy
            .login(vec![sub("a", "admin", "ok")])
            .await
            .unwrap();
        assert_eq!(ok.auth_response.auth_status, AuthStatus::Full);
    }

    #[tokio::test]
    async fn partial_login_depends_on_policy() {
        let strict = fixture(LoginPolicy::FullOnly, None);
        let err = strict
            .strategy
            .login(vec![sub("a", "x", "ok"), sub("b", "y", "bad")])
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Unauthorized(ref m) if m.contains("partially")));
        assert!(strict.store.is_empty());

        let lenient = fixture(LoginPolicy::AllowPartial, None);
        let ok = lenient
            .strategy
            .login(vec![sub("a", "x", "ok"), sub("b", "y", "bad")])
            .await
            .unwrap();
        assert_eq!(ok.auth_response.auth_status, AuthStatus::Partial);
    }

    #[tokio::test]
    async fn rejected_login_releases_proofs() {
        let f = fixture(LoginPolicy::FullOnly, None);
        f.strategy
            .login(vec![sub("a", "x", "ok"), sub("b", "y", "bad")])
            .await
            .unwrap_err();

        let ok = f
            .strategy
            .login(vec![sub("a", "x", "ok"), sub("b", "y", "ok")])
            .await
            .unwrap();
        assert_eq!(ok.auth_response.auth_status, AuthStatus::Full);
    }

    #[tokio::test]
    async fn none_login_is_unauthorized() {
        let f = fixture(LoginPolicy::AllowPartial, None);
        let err = f.strategy.login(vec![sub("a", "x", "bad")]).await.unwrap_err();
        assert!(matches!(err, StrategyError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn refresh_reissues_for_same_hash() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let (ok, claims) = login(&f, "admin").await;

        let token = f.strategy.refresh(&ok.refresh_token, &claims).await.unwrap();
        let new_claims = f.strategy.issuer().verify(&token).unwrap();
        assert_eq!(new_claims.auth_resp_hash, claims.auth_resp_hash);
    }

    #[tokio::test]
    async fn refresh_with_unknown_token_fails() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let (_, claims) = login(&f, "admin").await;
        assert_eq!(
            f.strategy.refresh("nope", &claims).await,
            Err(StrategyError::InvalidRefreshToken)
        );
    }

    #[tokio::test]
    async fn refresh_with_foreign_access_token_fails_without_revoking() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let (first, _) = login(&f, "admin").await;
        let (_, other_claims) = login(&f, "user").await;

        assert_eq!(
            f.strategy.refresh(&first.refresh_token, &other_claims).await,
            Err(StrategyError::InvalidRefreshToken)
        );
        assert!(f.store.get_auth_response(&first.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_after_invalidation_revokes_session() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let (ok, claims) = login(&f, "admin").await;

        f.valid.store(false, Ordering::SeqCst);
        assert_eq!(
            f.strategy.refresh(&ok.refresh_token, &claims).await,
            Err(StrategyError::OutputNoLongerValid)
        );
        assert_eq!(
            f.strategy.refresh(&ok.refresh_token, &claims).await,
            Err(StrategyError::InvalidRefreshToken)
        );
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected_and_removed() {
        let f = fixture(LoginPolicy::FullOnly, Some(Duration::from_secs(1)));
        let (ok, claims) = login(&f, "admin").await;
        f.store
            .backdate(&ok.refresh_token, time::Duration::seconds(10));

        assert_eq!(
            f.strategy.refresh(&ok.refresh_token, &claims).await,
            Err(StrategyError::InvalidRefreshToken)
        );
        assert!(f.store.get_auth_response(&ok.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let (ok, claims) = login(&f, "admin").await;

        f.strategy.logout(&ok.refresh_token, &claims).await.unwrap();
        f.strategy.logout(&ok.refresh_token, &claims).await.unwrap();

        assert_eq!(
            f.strategy.refresh(&ok.refresh_token, &claims).await,
            Err(StrategyError::InvalidRefreshToken)
        );
    }

    #[tokio::test]
    async fn logout_with_foreign_access_token_is_refused() {
        let f = fixture(LoginPolicy::FullOnly, None);
        let (first, _) = login(&f, "admin").await;
        let (_, other_claims) = login(&f, "user").await;

        assert_eq!(
            f.strategy.logout(&first.refresh_token, &other_claims).await,
            Err(StrategyError::InvalidRefreshToken)
        );
        assert!(f.store.get_auth_response(&first.refresh_token).await.is_ok());
    }
}
