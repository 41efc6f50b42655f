//! Signing key material: validated key records, the shared store, and rate-limited retrieval.

pub mod fetch;
pub mod limiter;
pub mod store;
