//! Named collection of configured backends with status reporting.

// std
use std::collections::HashMap;
// crates.io
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	backend::{Backend, BackendState},
	config::BackendConfig,
	metrics::BackendMetricsSnapshot,
	provider::Provider,
};

/// Registry of backends keyed by name.
#[derive(Clone, Debug, Default)]
pub struct BackendRegistry {
	inner: Arc<RwLock<RegistryState>>,
	client: Option<Client>,
}
impl BackendRegistry {
	/// Create an empty registry; every backend builds its own HTTP client.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create an empty registry whose backends share `client`.
	pub fn with_client(client: Client) -> Self {
		Self { inner: Default::default(), client: Some(client) }
	}

	/// Configure a backend and register it, replacing any backend with the same name.
	///
	/// Configuration runs before the registry lock is taken, so a slow provider never blocks
	/// lookups of other backends.
	pub async fn register(&self, config: BackendConfig) -> Result<Backend> {
		let backend = match &self.client {
			Some(client) => Backend::configure_with_client(config, client.clone()).await?,
			None => Backend::configure(config).await?,
		};

		self.insert(backend.clone()).await;

		Ok(backend)
	}

	/// Register an already configured backend, returning the one it replaced.
	pub async fn insert(&self, backend: Backend) -> Option<Backend> {
		let name = backend.name().to_string();
		let replaced = {
			let mut state = self.inner.write().await;

			state.backends.insert(name.clone(), backend)
		};

		if replaced.is_some() {
			tracing::debug!(backend = %name, "replaced registered backend");
		}

		replaced
	}

	/// Look up a backend by name.
	pub async fn get(&self, name: &str) -> Result<Backend> {
		let state = self.inner.read().await;

		state.backends.get(name).cloned().ok_or_else(|| Error::NotRegistered(name.to_string()))
	}

	/// Remove a backend if present.
	pub async fn unregister(&self, name: &str) -> bool {
		let mut state = self.inner.write().await;

		state.backends.remove(name).is_some()
	}

	/// Registered backend names in lexical order.
	pub async fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = {
			let state = self.inner.read().await;

			state.backends.keys().cloned().collect()
		};

		names.sort_unstable();

		names
	}

	/// Status of a single backend.
	pub async fn status(&self, name: &str) -> Result<BackendStatus> {
		let backend = self.get(name).await?;

		Ok(BackendStatus::of(&backend).await)
	}

	/// Status of every backend, ordered by name.
	pub async fn statuses(&self) -> Vec<BackendStatus> {
		let backends: Vec<Backend> = {
			let state = self.inner.read().await;

			state.backends.values().cloned().collect()
		};
		let mut statuses = Vec::with_capacity(backends.len());

		for backend in backends {
			statuses.push(BackendStatus::of(&backend).await);
		}

		statuses.sort_unstable_by(|a, b| a.name.cmp(&b.name));

		statuses
	}
}

/// Status projection for a backend.
#[derive(Clone, Debug, Serialize)]
pub struct BackendStatus {
	/// Backend name.
	pub name: String,
	/// Realm served by the backend.
	pub realm: String,
	/// Identity provider.
	pub provider: Provider,
	/// Lifecycle state.
	#[serde(flatten)]
	pub state: BackendState,
	/// Authorization endpoint, once resolved.
	pub authorization_url: Option<String>,
	/// Whether signing keys are acquired for this backend.
	pub key_verification: bool,
	/// Number of signing keys held.
	pub key_count: usize,
	/// When keys were last merged.
	pub last_key_fetch: Option<DateTime<Utc>>,
	/// Acquisition counters.
	pub metrics: BackendMetricsSnapshot,
}
impl BackendStatus {
	async fn of(backend: &Backend) -> Self {
		let keys = backend.key_snapshot().await;
		let profile = backend.profile();

		Self {
			name: backend.name().to_string(),
			realm: backend.config().realm.clone(),
			provider: profile.provider,
			state: backend.state(),
			authorization_url: backend
				.endpoints()
				.ok()
				.map(|endpoints| endpoints.authorization_url.clone()),
			key_verification: !profile.quirks.key_verification_disabled,
			key_count: keys.len(),
			last_key_fetch: keys.updated_at,
			metrics: backend.metrics().snapshot(),
		}
	}
}

#[derive(Debug, Default)]
struct RegistryState {
	backends: HashMap<String, Backend>,
}
