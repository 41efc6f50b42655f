//! Integration tests driven by mock identity providers.

mod common;
mod configure;
mod key_fetch;
mod redirect;
