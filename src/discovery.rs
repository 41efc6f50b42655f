//! OIDC discovery: metadata document retrieval and endpoint extraction.

// crates.io
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
// self
use crate::{_prelude::*, http::client, provider::ProviderProfile};

/// Metadata fields that must be present in a discovery document.
pub const REQUIRED_METADATA_FIELDS: [&str; 3] =
	["authorization_endpoint", "token_endpoint", "jwks_uri"];

/// Opaque OIDC discovery document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataDocument(Map<String, Value>);
impl MetadataDocument {
	/// Look up a raw field.
	pub fn get(&self, field: &str) -> Option<&Value> {
		self.0.get(field)
	}

	/// Look up a string field.
	pub fn get_str(&self, field: &str) -> Option<&str> {
		self.0.get(field).and_then(Value::as_str)
	}

	fn require_str(&self, field: &'static str) -> Result<String> {
		self.get_str(field).map(str::to_string).ok_or(Error::MetadataFieldNotFound(field))
	}
}
impl From<Map<String, Value>> for MetadataDocument {
	fn from(value: Map<String, Value>) -> Self {
		Self(value)
	}
}

/// Endpoints resolved for a backend, either from provider defaults or discovery.
///
/// Populated once; never re-fetched after success.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedEndpoints {
	/// Authorization endpoint the login flow redirects to.
	pub authorization_url: String,
	/// Token endpoint.
	pub token_url: Option<String>,
	/// JSON Web Key Set endpoint.
	pub keys_url: Option<String>,
	/// User info endpoint.
	pub userinfo_url: Option<String>,
	/// Discovery document, when discovery ran.
	pub metadata: Option<MetadataDocument>,
	/// Host of the authorization server.
	pub server_hostname: String,
}
impl ResolvedEndpoints {
	/// Endpoints known without discovery, if the profile carries an authorization URL.
	pub fn from_profile(profile: &ProviderProfile) -> Option<Self> {
		let authorization_url = profile.authorization_url.clone()?;

		Some(Self {
			authorization_url,
			token_url: profile.token_url.clone(),
			keys_url: None,
			userinfo_url: None,
			metadata: None,
			server_hostname: profile.server_hostname.clone(),
		})
	}

	/// Extract endpoints from a discovery document.
	pub fn from_metadata(metadata: MetadataDocument, server_hostname: impl Into<String>) -> Result<Self> {
		for field in REQUIRED_METADATA_FIELDS {
			metadata.require_str(field)?;
		}

		Ok(Self {
			authorization_url: metadata.require_str("authorization_endpoint")?,
			token_url: Some(metadata.require_str("token_endpoint")?),
			keys_url: Some(metadata.require_str("jwks_uri")?),
			userinfo_url: metadata.get_str("userinfo_endpoint").map(str::to_string),
			metadata: Some(metadata),
			server_hostname: server_hostname.into(),
		})
	}
}

/// Fetch and validate the discovery document at `url`.
///
/// Transport and parse failures surface as [`Error::MetadataFetchFailed`]; a missing
/// required field as [`Error::MetadataFieldNotFound`].
pub async fn fetch_metadata(client: &Client, url: &Url) -> Result<MetadataDocument> {
	let value = client::get_json(client, url).await.map_err(Error::metadata_fetch_failed)?;
	let Value::Object(map) = value else {
		return Err(Error::MetadataFetchFailed(Box::new(Error::Validation {
			field: "metadata",
			reason: "Discovery document must be a JSON object.".into(),
		})));
	};
	let metadata = MetadataDocument::from(map);

	for field in REQUIRED_METADATA_FIELDS {
		metadata.require_str(field)?;
	}

	Ok(metadata)
}
