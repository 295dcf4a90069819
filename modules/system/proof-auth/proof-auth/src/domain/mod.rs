//! Domain layer for proof-auth.

pub mod auth_mapper;
pub mod error;
pub mod plugin_host;
pub mod proof_cache;
pub mod revalidation;
pub mod strategy;
pub mod token;

pub use auth_mapper::{AuthMapper, LoginRequest, OutputRolesMapper, RoleMapper};
pub use error::{CacheError, HostError, MapperError, StrategyError, TokenError};
pub use plugin_host::{PluginHost, PluginManifest};
pub use proof_cache::{ProofCache, SweepReport};
pub use revalidation::RevalidationTask;
pub use strategy::{AuthStrategy, LoginPolicy, LoginSuccess};
pub use token::{AccessTokenClaims, RefreshTokenStore, TokenIssuer};
