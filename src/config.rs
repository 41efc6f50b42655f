//! Backend configuration record and its identity/resilience normalization.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, http::retry::RetryPolicy};

/// Retry attempts applied when a delayed start is configured without explicit retries.
pub const DEFAULT_DELAYED_RETRY_ATTEMPTS: u32 = 2;
/// Retry interval (seconds) applied when retries are configured without an interval.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Declarative configuration for a single OAuth 2.0 / OIDC backend.
///
/// Every field is optional on the wire; absent values take the documented defaults during
/// [`Backend::configure`](crate::Backend::configure).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
	/// Backend name, unique within a registry.
	pub name: String,
	/// Authentication method label (e.g. `oauth2`).
	pub method: String,
	/// Realm served by the backend.
	pub realm: String,
	/// Provider tag; see [`Provider`](crate::Provider).
	pub provider: String,

	/// Provider domain (okta, gitlab).
	pub domain_name: String,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret.
	pub client_secret: String,
	/// Application secret used by providers that sign API calls (facebook).
	pub app_secret: String,
	/// Okta authorization server identifier.
	pub server_id: String,
	/// Azure tenant identifier.
	pub tenant_id: String,
	/// Token carrying the identity claims: `id_token` or `access_token`.
	pub identity_token_name: String,

	/// Requested scopes.
	pub scopes: Vec<String>,

	/// Seconds to wait before acquiring metadata and keys in the background.
	pub delay_start: u64,
	/// Number of acquisition attempts.
	pub retry_attempts: u32,
	/// Seconds to wait between failed acquisition attempts.
	pub retry_interval: u64,

	/// Base URL of the authorization server.
	pub base_auth_url: String,
	/// OIDC discovery document URL.
	pub metadata_url: String,
	/// Explicit authorization endpoint; skips discovery when set.
	pub authorization_url: String,
	/// Explicit token endpoint.
	pub token_url: String,

	/// Regular expressions selecting user groups returned by the provider.
	pub user_group_filters: Vec<String>,
	/// Regular expressions selecting user organizations returned by the provider.
	pub user_org_filters: Vec<String>,

	/// Skip JWKS acquisition and signature verification.
	pub key_verification_disabled: bool,
	/// Omit the `grant_type` parameter from token requests.
	pub pass_grant_type_disabled: bool,
	/// Omit the `response_type` parameter from authorization requests.
	pub response_type_disabled: bool,
	/// Omit the `nonce` parameter from authorization requests.
	pub nonce_disabled: bool,
	/// Omit the `scope` parameter from authorization requests.
	pub scope_disabled: bool,
	/// Send `Accept: application/json` on token requests.
	pub accept_header_enabled: bool,

	/// Authorization response types.
	pub response_type: Vec<String>,
	/// Fields that must be present in a token response.
	pub required_token_fields: Vec<String>,

	/// Carried for the login flow; endpoint resolution does not read it.
	pub metadata_discovery_disabled: bool,
	/// Let the login page complete the callback in JavaScript.
	pub js_callback_enabled: bool,
	/// Role mapping rules applied to authenticated users.
	#[serde(rename = "user_roles")]
	pub user_role_maps: Vec<Map<String, Value>>,
}
impl BackendConfig {
	/// Parse a configuration record from JSON.
	pub fn from_json(raw: &str) -> Result<Self> {
		Ok(serde_json::from_str(raw)?)
	}

	/// Ensure the mandatory identity fields are present.
	pub fn validate_identity(&self) -> Result<()> {
		let required = [
			("name", &self.name),
			("method", &self.method),
			("realm", &self.realm),
			("client_id", &self.client_id),
			("client_secret", &self.client_secret),
		];

		for (field, value) in required {
			if value.is_empty() {
				return Err(Error::Validation { field, reason: "Must not be empty.".into() });
			}
		}

		Ok(())
	}

	/// Apply the resilience defaults in place and return the resulting retry policy.
	pub fn normalize_resilience(&mut self) -> RetryPolicy {
		if self.delay_start > 0 {
			if self.retry_attempts < 1 {
				self.retry_attempts = DEFAULT_DELAYED_RETRY_ATTEMPTS;
			}
			if self.retry_interval == 0 {
				self.retry_interval = self.delay_start;
			}

			tracing::debug!(
				backend = %self.name,
				delayed_by = self.delay_start,
				retry_attempts = self.retry_attempts,
				retry_interval = self.retry_interval,
				"configured delayed start"
			);
		} else if self.retry_attempts > 0 {
			if self.retry_interval == 0 {
				self.retry_interval = DEFAULT_RETRY_INTERVAL_SECS;
			}

			tracing::debug!(
				backend = %self.name,
				retry_attempts = self.retry_attempts,
				retry_interval = self.retry_interval,
				"configured connection retries"
			);
		}

		RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_interval))
	}

	/// Delay before background acquisition starts, if any.
	pub fn delay(&self) -> Option<Duration> {
		(self.delay_start > 0).then(|| Duration::from_secs(self.delay_start))
	}

	/// Short human-readable description of the backend identity.
	pub fn summary(&self) -> String {
		format!(
			"name {}\nmethod {}\nrealm {}\nprovider {}",
			self.name, self.method, self.realm, self.provider
		)
	}
}
