//! OAuth 2.0 / OpenID Connect backend core: provider profiles, discovery, rate-limited signing
//! key acquisition, and login redirects for identity gateways.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod backend;
pub mod config;
pub mod discovery;
pub mod http;
pub mod keys;
pub mod metrics;
pub mod provider;
pub mod redirect;
pub mod registry;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	backend::{Backend, BackendState},
	config::BackendConfig,
	discovery::{MetadataDocument, ResolvedEndpoints},
	error::{Error, Result},
	http::retry::RetryPolicy,
	keys::{fetch::SigningKey, store::KeySnapshot},
	metrics::{BackendMetrics, BackendMetricsSnapshot},
	provider::{IdentityToken, Provider, ProviderProfile, Quirks, ScopeSet},
	redirect::{RedirectDirective, Separator},
	registry::{BackendRegistry, BackendStatus},
};
