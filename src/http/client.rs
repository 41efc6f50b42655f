//! HTTP client integration for metadata and key set retrieval.

// crates.io
use http::header::ACCEPT;
use reqwest::{Client, redirect::Policy};
use url::Url;
// self
use crate::_prelude::*;

/// Maximum response size accepted from the identity provider (1 MiB).
pub const MAX_RESPONSE_BYTES: usize = 1_048_576;
/// Maximum redirect depth followed for provider requests.
pub const MAX_REDIRECTS: usize = 10;

/// Build the default HTTP client used for provider requests.
pub fn build_client() -> Result<Client> {
	let client = Client::builder()
		.redirect(Policy::limited(MAX_REDIRECTS))
		.user_agent(format!("oauth2-backend/{}", env!("CARGO_PKG_VERSION")))
		.connect_timeout(Duration::from_secs(5))
		.build()?;

	Ok(client)
}

/// Parse a provider-supplied URL string.
pub fn parse_url(field: &'static str, raw: &str) -> Result<Url> {
	Url::parse(raw).map_err(|err| Error::Validation {
		field,
		reason: format!("Invalid URL '{raw}': {err}."),
	})
}

/// Issue a GET request and decode the response body as JSON.
///
/// Any non-2xx status, transport failure, oversized body, or malformed JSON is an error.
pub async fn get_json(client: &Client, url: &Url) -> Result<serde_json::Value> {
	let start = Instant::now();
	let response = client.get(url.clone()).header(ACCEPT, "application/json").send().await?;
	let status = response.status();

	if !status.is_success() {
		let body = response.text().await.ok();

		return Err(Error::HttpStatus { status, url: url.clone(), body });
	}

	let bytes = response.bytes().await?;

	if bytes.len() > MAX_RESPONSE_BYTES {
		return Err(Error::Validation {
			field: "response",
			reason: format!(
				"Response size {size} bytes exceeds the guard of {MAX_RESPONSE_BYTES} bytes.",
				size = bytes.len(),
			),
		});
	}

	let value = serde_json::from_slice(&bytes)?;

	tracing::debug!(
		url = %url,
		status = %status,
		elapsed = ?start.elapsed(),
		"provider fetch complete"
	);

	Ok(value)
}
