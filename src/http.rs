//! HTTP helpers for provider requests and retry spacing.

pub mod client;
pub mod retry;
