//! Storage backends for proofs and refresh tokens.

mod memory_proof_cache;
mod memory_refresh_tokens;

pub use memory_proof_cache::InMemoryProofCache;
pub use memory_refresh_tokens::InMemoryRefreshTokenStore;
