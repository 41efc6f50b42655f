//! Backend configurator: turns a [`BackendConfig`] into a backend with resolved endpoints and
//! signing keys.

// std
use std::sync::OnceLock;
// crates.io
use reqwest::Client;
use serde::Serialize;
use tokio::{sync::watch, time};
use url::Url;
// self
use crate::{
	_prelude::*,
	config::BackendConfig,
	discovery::{self, ResolvedEndpoints},
	http::{client, retry::RetryPolicy},
	keys::{
		fetch::{self, SigningKey},
		limiter::KeyFetchLimiter,
		store::{KeySnapshot, KeyStore},
	},
	metrics::BackendMetrics,
	provider::ProviderProfile,
	redirect::RedirectDirective,
};

/// Lifecycle of a backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BackendState {
	/// Nothing has been checked yet.
	Unconfigured,
	/// Mandatory identity fields are being checked.
	Validating,
	/// Provider defaults and quirks are being applied.
	ResolvingProvider,
	/// The discovery document is being fetched.
	AcquiringMetadata,
	/// The key set is being fetched.
	AcquiringKeys,
	/// Endpoints and keys are usable.
	Ready,
	/// Configuration or acquisition failed.
	Failed(String),
}
impl BackendState {
	/// Whether no further transitions are expected.
	pub fn is_terminal(&self) -> bool {
		matches!(self, BackendState::Ready | BackendState::Failed(_))
	}
}

/// A configured OAuth 2.0 / OIDC backend.
///
/// Cheap to clone; clones share endpoints, keys, limiter, and state.
#[derive(Clone, Debug)]
pub struct Backend {
	inner: Arc<BackendInner>,
}
impl Backend {
	/// Configure a backend with the default HTTP client.
	pub async fn configure(config: BackendConfig) -> Result<Self> {
		let client = client::build_client()?;

		Self::configure_with_client(config, client).await
	}

	/// Configure a backend using the supplied HTTP client.
	///
	/// Configuration errors are returned before any network call. Without a delayed start,
	/// metadata and keys are acquired before returning and acquisition failures are returned
	/// too. With a delayed start, acquisition runs in a background task and its outcome is
	/// observable through [`Backend::state`] and [`Backend::wait_ready`].
	#[tracing::instrument(skip_all, fields(backend = %config.name, provider = %config.provider))]
	pub async fn configure_with_client(mut config: BackendConfig, client: Client) -> Result<Self> {
		let (state, _) = watch::channel(BackendState::Unconfigured);

		publish(&state, &config.name, BackendState::Validating);
		config.validate_identity()?;

		let retry_policy = config.normalize_resilience();

		publish(&state, &config.name, BackendState::ResolvingProvider);

		let profile = ProviderProfile::resolve(&mut config)?;
		let endpoints = OnceLock::new();

		if let Some(resolved) = ResolvedEndpoints::from_profile(&profile) {
			let _ = endpoints.set(Arc::new(resolved));
		}

		let metrics = BackendMetrics::new(config.name.clone(), profile.provider.as_str());
		let backend = Self {
			inner: Arc::new(BackendInner {
				config,
				profile,
				retry_policy,
				client,
				endpoints,
				keys: KeyStore::new(),
				limiter: KeyFetchLimiter::new(),
				state,
				metrics,
			}),
		};

		match backend.inner.config.delay() {
			Some(delay) if backend.needs_acquisition() => {
				backend.set_state(backend.first_acquisition_state());

				let background = backend.clone();

				tokio::spawn(background.acquire_in_background(delay));
				tracing::info!(?delay, "backend configured; acquisition deferred");
			},
			_ => {
				backend.acquire().await?;
				tracing::info!("backend configured");
			},
		}

		Ok(backend)
	}

	/// Backend name.
	pub fn name(&self) -> &str {
		&self.inner.config.name
	}

	/// Normalized configuration.
	pub fn config(&self) -> &BackendConfig {
		&self.inner.config
	}

	/// Resolved provider profile.
	pub fn profile(&self) -> &ProviderProfile {
		&self.inner.profile
	}

	/// Effective retry policy for acquisition.
	pub fn retry_policy(&self) -> RetryPolicy {
		self.inner.retry_policy
	}

	/// Short human-readable description of the backend identity.
	pub fn summary(&self) -> String {
		self.inner.config.summary()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> BackendState {
		self.inner.state.borrow().clone()
	}

	/// Whether endpoints and keys have been acquired.
	pub fn is_ready(&self) -> bool {
		matches!(*self.inner.state.borrow(), BackendState::Ready)
	}

	/// Wait until acquisition finishes, returning its failure if any.
	pub async fn wait_ready(&self) -> Result<()> {
		let mut receiver = self.inner.state.subscribe();
		let state =
			receiver.wait_for(BackendState::is_terminal).await.map_err(|_| Error::NotReady)?;

		match &*state {
			BackendState::Failed(reason) => Err(Error::AcquisitionFailed(reason.clone())),
			_ => Ok(()),
		}
	}

	/// Resolved endpoints, once the backend is ready.
	///
	/// Fails closed like [`Backend::signing_key`]: a backend that is still acquiring or whose
	/// acquisition failed hands out nothing.
	pub fn endpoints(&self) -> Result<Arc<ResolvedEndpoints>> {
		if !self.is_ready() {
			return Err(Error::NotReady);
		}

		self.inner.endpoints.get().cloned().ok_or(Error::NotReady)
	}

	/// Redirect directive pointing at the resolved authorization endpoint.
	pub fn redirect_directive(&self, query_parameter: impl Into<String>) -> Result<RedirectDirective> {
		let endpoints = self.endpoints()?;

		Ok(RedirectDirective::new(endpoints.authorization_url.clone(), query_parameter))
	}

	/// Per-backend counters.
	pub fn metrics(&self) -> Arc<BackendMetrics> {
		self.inner.metrics.clone()
	}

	/// Consistent view of the key store.
	pub async fn key_snapshot(&self) -> Arc<KeySnapshot> {
		self.inner.keys.snapshot().await
	}

	/// Look up a signing key without contacting the provider.
	///
	/// Fails closed: nothing is returned until acquisition has completed.
	pub async fn signing_key(&self, kid: &str) -> Result<Arc<SigningKey>> {
		if self.inner.profile.quirks.key_verification_disabled {
			return Err(Error::KeyVerificationDisabled);
		}
		if !self.is_ready() {
			return Err(Error::NotReady);
		}

		self.inner.keys.get(kid).await.ok_or_else(|| Error::KeyNotFound(kid.to_string()))
	}

	/// Look up a signing key, refreshing the key set once when the identifier is unknown.
	///
	/// The refresh goes through the key fetch limiter, so repeated unknown identifiers end in
	/// [`Error::TooManyAttempts`] rather than hammering the provider.
	#[tracing::instrument(skip(self), fields(backend = %self.inner.config.name))]
	pub async fn resolve_signing_key(&self, kid: &str) -> Result<Arc<SigningKey>> {
		match self.signing_key(kid).await {
			Err(Error::KeyNotFound(_)) => {
				tracing::debug!("unknown key identifier; refreshing key set");

				self.refresh_keys().await?;
				self.signing_key(kid).await
			},
			result => result,
		}
	}

	/// Run one rate-limited key fetch and merge the result.
	///
	/// Returns the number of keys held afterwards.
	#[tracing::instrument(skip(self), fields(backend = %self.inner.config.name))]
	pub async fn refresh_keys(&self) -> Result<usize> {
		if self.inner.profile.quirks.key_verification_disabled {
			return Err(Error::KeyVerificationDisabled);
		}

		let url = self.keys_url()?;
		let held = self.fetch_keys_once(&url).await?;
		let recovered = self.inner.state.send_if_modified(|state| {
			if matches!(state, BackendState::Failed(_)) {
				*state = BackendState::Ready;

				true
			} else {
				false
			}
		});

		if recovered {
			tracing::info!("key refresh recovered a failed backend");
		}

		Ok(held)
	}

	fn needs_acquisition(&self) -> bool {
		self.inner.endpoints.get().is_none() || !self.inner.profile.quirks.key_verification_disabled
	}

	fn first_acquisition_state(&self) -> BackendState {
		if self.inner.endpoints.get().is_none() {
			BackendState::AcquiringMetadata
		} else {
			BackendState::AcquiringKeys
		}
	}

	fn set_state(&self, next: BackendState) {
		publish(&self.inner.state, &self.inner.config.name, next);
	}

	async fn acquire_in_background(self, delay: Duration) {
		tracing::debug!(backend = %self.inner.config.name, ?delay, "delaying acquisition");

		time::sleep(delay).await;

		if let Err(err) = self.acquire().await {
			tracing::warn!(
				backend = %self.inner.config.name,
				error = %err,
				"background acquisition failed"
			);
		}
	}

	async fn acquire(&self) -> Result<()> {
		match self.acquire_endpoints_and_keys().await {
			Ok(()) => {
				self.set_state(BackendState::Ready);

				Ok(())
			},
			Err(err) => {
				self.set_state(BackendState::Failed(err.to_string()));

				Err(err)
			},
		}
	}

	async fn acquire_endpoints_and_keys(&self) -> Result<()> {
		if self.inner.endpoints.get().is_none() {
			self.set_state(BackendState::AcquiringMetadata);

			let endpoints = self.acquire_metadata().await?;

			let _ = self.inner.endpoints.set(Arc::new(endpoints));
		}
		if self.inner.profile.quirks.key_verification_disabled {
			tracing::debug!(
				backend = %self.inner.config.name,
				"key verification disabled; skipping key acquisition"
			);

			return Ok(());
		}

		self.set_state(BackendState::AcquiringKeys);
		self.acquire_keys().await.map(|_| ())
	}

	async fn acquire_metadata(&self) -> Result<ResolvedEndpoints> {
		let url = self.inner.profile.metadata_url.as_ref().ok_or_else(|| {
			Error::metadata_fetch_failed(Error::Validation {
				field: "metadata_url",
				reason: "No metadata URL is configured.".into(),
			})
		})?;
		let document = self
			.inner
			.retry_policy
			.run("metadata", |attempt| async move {
				tracing::debug!(attempt, url = %url, "fetching metadata");

				let result = discovery::fetch_metadata(&self.inner.client, url).await;

				self.inner.metrics.record_metadata_attempt(result.is_ok());

				result
			})
			.await
			.map_err(Error::metadata_fetch_failed)?;

		ResolvedEndpoints::from_metadata(document, self.inner.profile.server_hostname.clone())
			.map_err(Error::metadata_fetch_failed)
	}

	async fn acquire_keys(&self) -> Result<usize> {
		let url = self.keys_url().map_err(Error::key_fetch_failed)?;
		let url = &url;

		self.inner
			.retry_policy
			.run("keys", |_| self.fetch_keys_once(url))
			.await
			.map_err(Error::key_fetch_failed)
	}

	fn keys_url(&self) -> Result<Url> {
		let endpoints = self.inner.endpoints.get().ok_or(Error::NotReady)?;
		let raw = endpoints.keys_url.as_deref().ok_or_else(|| Error::Validation {
			field: "jwks_uri",
			reason: "No key set URL was resolved for this backend.".into(),
		})?;

		client::parse_url("jwks_uri", raw)
	}

	async fn fetch_keys_once(&self, url: &Url) -> Result<usize> {
		let started = Instant::now();
		let inner = &self.inner;

		match fetch::fetch_keys(&inner.client, url, &inner.limiter, &inner.keys).await {
			Ok(held) => {
				inner.metrics.record_key_fetch_success(held, started.elapsed());

				Ok(held)
			},
			Err(Error::TooManyAttempts) => {
				inner.metrics.record_key_fetch_rejected();

				Err(Error::TooManyAttempts)
			},
			Err(err) => {
				inner.metrics.record_key_fetch_error();

				Err(err)
			},
		}
	}
}

#[derive(Debug)]
struct BackendInner {
	config: BackendConfig,
	profile: ProviderProfile,
	retry_policy: RetryPolicy,
	client: Client,
	endpoints: OnceLock<Arc<ResolvedEndpoints>>,
	keys: KeyStore,
	limiter: KeyFetchLimiter,
	state: watch::Sender<BackendState>,
	metrics: Arc<BackendMetrics>,
}

fn publish(sender: &watch::Sender<BackendState>, backend: &str, next: BackendState) {
	tracing::debug!(backend, state = ?next, "backend state changed");

	sender.send_replace(next);
}
