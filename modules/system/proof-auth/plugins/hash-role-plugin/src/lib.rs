#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Hash-role proof-auth plugin
//!
//! Grants a configured role to whoever can present the preimage of a
//! configured SHA-256 hash. The public input names the hash, the proof
//! carries the preimage:
//!
//! ```json
//! {"plugin": "hash-role", "publicInputArgs": {"hash": "<hex>"}, "proof": {"preimage": "..."}}
//! ```
//!
//! A grant stops being valid once its `valid_until` passes or its hash is
//! listed under `revoked`.
//!
//! ## Configuration
//!
//! ```yaml
//! plugins:
//!   hash-role:
//!     config:
//!       roles:
//!         - hash: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
//!           role: admin
//!           valid_until: 1893456000
//!       revoked: []
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod module;

pub use module::{HashRolePluginFactory, PLUGIN_NAME};
