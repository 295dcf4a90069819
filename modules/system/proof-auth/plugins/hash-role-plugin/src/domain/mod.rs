//! Domain layer for the hash-role plugin.

pub mod client;
pub mod service;

pub use service::Service;
