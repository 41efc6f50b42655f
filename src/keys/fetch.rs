//! Key set retrieval and structural validation of individual keys.

// std
use std::str::FromStr;
// crates.io
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
// self
use crate::{
	_prelude::*,
	http::client,
	keys::{limiter::KeyFetchLimiter, store::KeyStore},
};

/// A public signing key published by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
	/// Key identifier.
	#[serde(rename = "kid", default)]
	pub key_id: String,
	/// Key type: `RSA`, `EC`, or `OKP`.
	#[serde(rename = "kty", default)]
	pub key_type: String,
	/// Intended algorithm.
	#[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
	pub algorithm: Option<String>,
	/// Intended use: `sig` or `enc`.
	#[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
	pub public_key_use: Option<String>,
	/// RSA modulus, base64url.
	#[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
	pub modulus: Option<String>,
	/// RSA public exponent, base64url.
	#[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
	pub exponent: Option<String>,
	/// Curve name for `EC` and `OKP` keys.
	#[serde(rename = "crv", default, skip_serializing_if = "Option::is_none")]
	pub curve: Option<String>,
	/// Curve point x coordinate, base64url.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub x: Option<String>,
	/// Curve point y coordinate, base64url.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub y: Option<String>,
}
impl SigningKey {
	/// Check that the key is structurally usable for signature verification.
	pub fn validate(&self) -> Result<()> {
		if self.key_id.is_empty() {
			return Err(Error::InvalidKey("key has no 'kid'".into()));
		}
		if let Some(key_use) = self.public_key_use.as_deref()
			&& !matches!(key_use, "sig" | "enc")
		{
			return Err(self.invalid(format!("unsupported key use '{key_use}'")));
		}
		if let Some(alg) = self.algorithm()? {
			let compatible = match self.key_type.as_str() {
				"RSA" => matches!(
					alg,
					Algorithm::RS256
						| Algorithm::RS384 | Algorithm::RS512
						| Algorithm::PS256 | Algorithm::PS384
						| Algorithm::PS512
				),
				"EC" => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
				"OKP" => matches!(alg, Algorithm::EdDSA),
				_ => false,
			};

			if !compatible {
				return Err(self.invalid(format!(
					"algorithm {alg:?} does not match key type '{}'",
					self.key_type
				)));
			}
		}

		self.decoding_key().map(|_| ())
	}

	/// Parsed `alg`, if present.
	pub fn algorithm(&self) -> Result<Option<Algorithm>> {
		self.algorithm
			.as_deref()
			.map(|alg| {
				Algorithm::from_str(alg)
					.map_err(|_| self.invalid(format!("unsupported algorithm '{alg}'")))
			})
			.transpose()
	}

	/// Build a verification key for the token-verification collaborator.
	pub fn decoding_key(&self) -> Result<DecodingKey> {
		match self.key_type.as_str() {
			"RSA" => {
				let n = self.component("n", &self.modulus)?;
				let e = self.component("e", &self.exponent)?;

				DecodingKey::from_rsa_components(n, e)
					.map_err(|err| self.invalid(format!("malformed RSA components: {err}")))
			},
			"EC" => {
				let curve = self.component("crv", &self.curve)?;

				if !matches!(curve, "P-256" | "P-384") {
					return Err(self.invalid(format!("unsupported curve '{curve}'")));
				}

				let x = self.component("x", &self.x)?;
				let y = self.component("y", &self.y)?;

				DecodingKey::from_ec_components(x, y)
					.map_err(|err| self.invalid(format!("malformed EC components: {err}")))
			},
			"OKP" => {
				let curve = self.component("crv", &self.curve)?;

				if curve != "Ed25519" {
					return Err(self.invalid(format!("unsupported curve '{curve}'")));
				}

				let x = self.component("x", &self.x)?;

				DecodingKey::from_ed_components(x)
					.map_err(|err| self.invalid(format!("malformed OKP components: {err}")))
			},
			"" => Err(self.invalid("key has no 'kty'".into())),
			other => Err(self.invalid(format!("unsupported key type '{other}'"))),
		}
	}

	fn component<'a>(&self, name: &str, value: &'a Option<String>) -> Result<&'a str> {
		match value.as_deref() {
			Some(value) if !value.is_empty() => Ok(value),
			_ => Err(self.invalid(format!("key has no '{name}'"))),
		}
	}

	fn invalid(&self, reason: String) -> Error {
		Error::InvalidKey(format!("kid '{}': {reason}", self.key_id))
	}
}

/// Decode and validate every entry of a key set response.
///
/// All-or-nothing: a single invalid key fails the whole set.
pub fn parse_key_set(body: Value) -> Result<Vec<SigningKey>> {
	let Value::Object(mut document) = body else {
		return Err(Error::KeysNotFoundInResponse);
	};
	let raw_keys = document.remove("keys").ok_or(Error::KeysNotFoundInResponse)?;
	let keys: Vec<SigningKey> =
		serde_json::from_value(raw_keys).map_err(|err| Error::KeysParseFailed(err.to_string()))?;

	if keys.is_empty() {
		return Err(Error::NoKeysFound);
	}

	for key in &keys {
		key.validate()?;
	}

	Ok(keys)
}

/// Fetch the key set at `url` and merge it into `store`, gated by `limiter`.
///
/// Returns the number of keys held by the store after the merge. The store is left untouched
/// on any failure.
pub async fn fetch_keys(
	client: &Client,
	url: &Url,
	limiter: &KeyFetchLimiter,
	store: &KeyStore,
) -> Result<usize> {
	let attempt = match limiter.try_acquire(Instant::now()).await {
		Ok(attempt) => attempt,
		Err(err) => {
			tracing::warn!(url = %url, "key fetch refused by rate limiter");

			return Err(err);
		},
	};

	tracing::debug!(url = %url, attempt, "fetching key set");

	let body = client::get_json(client, url).await.map_err(|err| match err {
		Error::Serde(err) => Error::KeysParseFailed(err.to_string()),
		err => err,
	})?;
	let keys = parse_key_set(body)?;
	let fetched = keys.len();
	let held = store.merge(keys).await;

	tracing::debug!(url = %url, fetched, held, "key set merged");

	Ok(held)
}
