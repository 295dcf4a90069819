//! Proof-auth module
//!
//! Routes client-supplied proofs to verification plugins, aggregates their
//! outputs into a single authentication result, and issues session tokens
//! bound to that result. Sessions stay alive only while every bound output
//! remains valid.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod module;

pub use config::{PluginConfig, ProofAuthConfig};
pub use domain::{AuthMapper, AuthStrategy, LoginPolicy, PluginHost, RevalidationTask};
pub use module::{ProofAuthModule, ProofAuthModuleBuilder};
