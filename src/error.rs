//! Crate-wide error types and `Result` alias.

// self
use crate::provider::Provider;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the OAuth 2.0 backend crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Http(#[from] http::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
	#[error("Metrics exporter error: {0}")]
	Metrics(String),

	#[error("OAuth 2.0 provider name is empty.")]
	ProviderNotFound,
	#[error("OAuth 2.0 provider '{0}' is not supported.")]
	UnsupportedProvider(String),
	#[error("OAuth 2.0 provider '{provider}' requires the '{field}' field.")]
	MissingProviderField { provider: Provider, field: &'static str },
	#[error("Identity token name '{0}' is invalid; expected 'id_token' or 'access_token'.")]
	InvalidIdentityTokenName(String),
	#[error("Filter pattern '{pattern}' is invalid: {source}")]
	InvalidFilterPattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},
	#[error("Authorization URL for OAuth 2.0 provider '{0}' is not configured.")]
	AuthorizationUrlNotFound(Provider),
	#[error("Base authorization URL '{url}' is invalid: {source}")]
	InvalidBaseUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},

	#[error("Metadata fetch failed: {0}")]
	MetadataFetchFailed(#[source] Box<Error>),
	#[error("Metadata document has no '{0}' field.")]
	MetadataFieldNotFound(&'static str),
	#[error("Key fetch failed: {0}")]
	KeyFetchFailed(#[source] Box<Error>),
	#[error("Key set response has no 'keys' field.")]
	KeysNotFoundInResponse,
	#[error("Key set could not be parsed: {0}")]
	KeysParseFailed(String),
	#[error("Key set response contains no keys.")]
	NoKeysFound,
	#[error("Key set contains an invalid key: {0}")]
	InvalidKey(String),
	#[error("Too many key fetch attempts; retry after the cool-down window.")]
	TooManyAttempts,

	#[error("Backend has not finished acquiring endpoints and keys.")]
	NotReady,
	#[error("Backend acquisition failed: {0}")]
	AcquisitionFailed(String),
	#[error("Key not found for kid '{0}'.")]
	KeyNotFound(String),
	#[error("Key verification is disabled for this backend.")]
	KeyVerificationDisabled,
	#[error("Backend '{0}' is not registered.")]
	NotRegistered(String),
}
impl Error {
	/// Wrap a failure as a metadata acquisition error unless it already is one.
	pub fn metadata_fetch_failed(err: Error) -> Self {
		match err {
			err @ Error::MetadataFetchFailed(_) => err,
			err => Error::MetadataFetchFailed(Box::new(err)),
		}
	}

	/// Wrap a failure as a key acquisition error unless it already is one.
	pub fn key_fetch_failed(err: Error) -> Self {
		match err {
			err @ Error::KeyFetchFailed(_) => err,
			err => Error::KeyFetchFailed(Box::new(err)),
		}
	}

	/// Whether the error stems from static configuration rather than acquisition.
	pub fn is_configuration(&self) -> bool {
		matches!(
			self,
			Error::Validation { .. }
				| Error::ProviderNotFound
				| Error::UnsupportedProvider(_)
				| Error::MissingProviderField { .. }
				| Error::InvalidIdentityTokenName(_)
				| Error::InvalidFilterPattern { .. }
				| Error::AuthorizationUrlNotFound(_)
				| Error::InvalidBaseUrl { .. }
		)
	}
}
