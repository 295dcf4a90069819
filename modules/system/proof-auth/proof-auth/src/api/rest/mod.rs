//! REST surface of the proof-auth module.

pub mod dto;
pub mod error;
mod handlers;
mod middleware;
pub mod routes;

pub use error::Problem;
pub use routes::router;
