//! Provider profiles: endpoint defaults and protocol quirks per identity provider.
//!
//! Resolution never performs I/O. Explicit configuration values always take precedence over
//! the defaults filled in here.

// std
use std::{
	collections::{BTreeSet, HashSet},
	fmt::{Display, Formatter, Result as FmtResult},
	str::FromStr,
};
// crates.io
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, config::BackendConfig, http::client};

/// Suffix appended to Google client identifiers that carry no domain.
pub const GOOGLE_CLIENT_ID_SUFFIX: &str = ".apps.googleusercontent.com";

/// Supported identity providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
	/// Okta custom authorization server.
	Okta,
	/// Google accounts.
	Google,
	/// GitHub OAuth apps.
	Github,
	/// GitLab, hosted or self-managed.
	Gitlab,
	/// Microsoft identity platform.
	Azure,
	/// Facebook login.
	Facebook,
	/// Nextcloud OAuth 2.0 app.
	Nextcloud,
	/// Any OIDC-compliant provider with explicit URLs.
	Generic,
}
impl Provider {
	/// Every supported provider.
	pub const ALL: [Provider; 8] = [
		Provider::Okta,
		Provider::Google,
		Provider::Github,
		Provider::Gitlab,
		Provider::Azure,
		Provider::Facebook,
		Provider::Nextcloud,
		Provider::Generic,
	];

	/// Configuration tag for the provider.
	pub fn as_str(&self) -> &'static str {
		match self {
			Provider::Okta => "okta",
			Provider::Google => "google",
			Provider::Github => "github",
			Provider::Gitlab => "gitlab",
			Provider::Azure => "azure",
			Provider::Facebook => "facebook",
			Provider::Nextcloud => "nextcloud",
			Provider::Generic => "generic",
		}
	}

	/// Scopes requested when the configuration lists none.
	pub fn default_scopes(&self) -> &'static [&'static str] {
		match self {
			Provider::Facebook => &["public_profile", "email"],
			Provider::Nextcloud => &["email"],
			_ => &["openid", "email", "profile"],
		}
	}

	fn apply(&self, config: &mut BackendConfig) -> Result<ProviderDefaults> {
		match self {
			Provider::Okta => okta(config),
			Provider::Google => google(config),
			Provider::Github => github(config),
			Provider::Gitlab => gitlab(config),
			Provider::Azure => azure(config),
			Provider::Facebook => facebook(config),
			Provider::Nextcloud => nextcloud(config),
			Provider::Generic => Ok(ProviderDefaults::default()),
		}
	}
}
impl FromStr for Provider {
	type Err = Error;

	fn from_str(value: &str) -> Result<Self> {
		if value.is_empty() {
			return Err(Error::ProviderNotFound);
		}

		Provider::ALL
			.into_iter()
			.find(|provider| provider.as_str() == value)
			.ok_or_else(|| Error::UnsupportedProvider(value.to_string()))
	}
}
impl Display for Provider {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Token whose claims identify the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityToken {
	/// OIDC ID token.
	#[default]
	IdToken,
	/// OAuth 2.0 access token.
	AccessToken,
}
impl IdentityToken {
	/// Token field name.
	pub fn as_str(&self) -> &'static str {
		match self {
			IdentityToken::IdToken => "id_token",
			IdentityToken::AccessToken => "access_token",
		}
	}
}
impl FromStr for IdentityToken {
	type Err = Error;

	fn from_str(value: &str) -> Result<Self> {
		match value {
			"" | "id_token" => Ok(IdentityToken::IdToken),
			"access_token" => Ok(IdentityToken::AccessToken),
			other => Err(Error::InvalidIdentityTokenName(other.to_string())),
		}
	}
}

/// Protocol deviations applied when talking to a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quirks {
	/// JWKS acquisition and signature verification are skipped.
	pub key_verification_disabled: bool,
	/// Token requests omit `grant_type`.
	pub pass_grant_type_disabled: bool,
	/// Authorization requests omit `response_type`.
	pub response_type_disabled: bool,
	/// Authorization requests omit `nonce`.
	pub nonce_disabled: bool,
	/// Authorization requests omit `scope`.
	pub scope_disabled: bool,
	/// Token requests send `Accept: application/json`.
	pub accept_header_enabled: bool,
}
impl Quirks {
	fn from_config(config: &BackendConfig) -> Self {
		Self {
			key_verification_disabled: config.key_verification_disabled,
			pass_grant_type_disabled: config.pass_grant_type_disabled,
			response_type_disabled: config.response_type_disabled,
			nonce_disabled: config.nonce_disabled,
			scope_disabled: config.scope_disabled,
			accept_header_enabled: config.accept_header_enabled,
		}
	}

	fn merge(&mut self, forced: Quirks) {
		self.key_verification_disabled |= forced.key_verification_disabled;
		self.pass_grant_type_disabled |= forced.pass_grant_type_disabled;
		self.response_type_disabled |= forced.response_type_disabled;
		self.nonce_disabled |= forced.nonce_disabled;
		self.scope_disabled |= forced.scope_disabled;
		self.accept_header_enabled |= forced.accept_header_enabled;
	}

	/// Quirks of providers speaking plain OAuth 2.0 without OIDC (github, facebook).
	fn plain_oauth2() -> Self {
		Self {
			key_verification_disabled: true,
			pass_grant_type_disabled: true,
			response_type_disabled: true,
			nonce_disabled: true,
			scope_disabled: false,
			accept_header_enabled: true,
		}
	}
}

/// Ordered, de-duplicated set of scopes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeSet {
	ordered: Vec<String>,
	lookup: HashSet<String>,
}
impl ScopeSet {
	/// Build a set preserving first-seen order.
	pub fn new<I, S>(scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = Self::default();

		for scope in scopes {
			let scope = scope.into();

			if set.lookup.insert(scope.clone()) {
				set.ordered.push(scope);
			}
		}

		set
	}

	/// Whether any of the given scopes is present.
	pub fn contains_any(&self, scopes: &[&str]) -> bool {
		scopes.iter().any(|scope| self.lookup.contains(*scope))
	}

	/// Space-separated `scope` parameter value.
	pub fn to_param(&self) -> String {
		self.ordered.join(" ")
	}

	/// Iterate scopes in configured order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.ordered.iter().map(String::as_str)
	}

	/// Number of scopes.
	pub fn len(&self) -> usize {
		self.ordered.len()
	}

	/// Whether the set is empty.
	pub fn is_empty(&self) -> bool {
		self.ordered.is_empty()
	}
}

/// Result of provider profile resolution.
#[derive(Clone, Debug)]
pub struct ProviderProfile {
	/// Resolved provider.
	pub provider: Provider,
	/// Effective protocol quirks.
	pub quirks: Quirks,
	/// Parsed base authorization URL.
	pub base_auth_url: Url,
	/// Host (and port, when present) of the base authorization URL.
	pub server_hostname: String,
	/// Discovery document URL; present whenever the authorization URL is not yet known.
	pub metadata_url: Option<Url>,
	/// Authorization endpoint known without discovery.
	pub authorization_url: Option<String>,
	/// Token endpoint known without discovery.
	pub token_url: Option<String>,
	/// Effective scopes.
	pub scopes: ScopeSet,
	/// Token carrying identity claims.
	pub identity_token: IdentityToken,
	/// Authorization response types.
	pub response_type: Vec<String>,
	/// Fields that must be present in a token response.
	pub required_token_fields: BTreeSet<String>,
	/// Compiled user group filters.
	pub user_group_filters: Vec<Regex>,
	/// Compiled user organization filters.
	pub user_org_filters: Vec<Regex>,
}
impl ProviderProfile {
	/// Resolve the provider profile, filling defaulted fields of `config` in place.
	pub fn resolve(config: &mut BackendConfig) -> Result<Self> {
		if config.scopes.is_empty() {
			let scopes = config
				.provider
				.parse::<Provider>()
				.map(|provider| provider.default_scopes())
				.unwrap_or(Provider::Generic.default_scopes());

			config.scopes = scopes.iter().map(|scope| scope.to_string()).collect();
		}

		let identity_token = config.identity_token_name.parse::<IdentityToken>()?;

		config.identity_token_name = identity_token.as_str().to_string();

		let provider = config.provider.parse::<Provider>()?;
		let mut quirks = Quirks::from_config(config);
		let defaults = provider.apply(config)?;

		quirks.merge(defaults.quirks);

		let authorization_url = non_empty(&config.authorization_url).or(defaults.authorization_url);
		let token_url = non_empty(&config.token_url).or(defaults.token_url);

		if config.base_auth_url.is_empty() {
			return Err(Error::AuthorizationUrlNotFound(provider));
		}

		let base_auth_url = Url::parse(&config.base_auth_url).map_err(|source| {
			Error::InvalidBaseUrl { url: config.base_auth_url.clone(), source }
		})?;
		let server_hostname = match (base_auth_url.host_str(), base_auth_url.port()) {
			(Some(host), Some(port)) => format!("{host}:{port}"),
			(Some(host), None) => host.to_string(),
			(None, _) =>
				return Err(Error::InvalidBaseUrl {
					url: config.base_auth_url.clone(),
					source: url::ParseError::EmptyHost,
				}),
		};

		if config.required_token_fields.is_empty() {
			config.required_token_fields = if defaults.access_token_only {
				vec!["access_token".into()]
			} else {
				vec!["access_token".into(), "id_token".into()]
			};
		}
		if config.response_type.is_empty() {
			config.response_type = vec!["code".into()];
		}

		let user_group_filters = compile_filters(&config.user_group_filters)?;
		let user_org_filters = compile_filters(&config.user_org_filters)?;
		let metadata_url = match (&authorization_url, config.metadata_url.as_str()) {
			(Some(_), "") => None,
			(Some(_), raw) => Some(client::parse_url("metadata_url", raw)?),
			(None, "") =>
				return Err(Error::Validation {
					field: "metadata_url",
					reason: format!(
						"Provider '{provider}' needs a metadata URL when no authorization URL is configured."
					),
				}),
			(None, raw) => Some(client::parse_url("metadata_url", raw)?),
		};

		Ok(Self {
			provider,
			quirks,
			base_auth_url,
			server_hostname,
			metadata_url,
			authorization_url,
			token_url,
			scopes: ScopeSet::new(config.scopes.iter().cloned()),
			identity_token,
			response_type: config.response_type.clone(),
			required_token_fields: config.required_token_fields.iter().cloned().collect(),
			user_group_filters,
			user_org_filters,
		})
	}

	/// Whether any of the given scopes is configured.
	pub fn scope_exists(&self, scopes: &[&str]) -> bool {
		self.scopes.contains_any(scopes)
	}

	/// Whether discovery must run before the backend is usable.
	pub fn needs_discovery(&self) -> bool {
		self.authorization_url.is_none()
	}

	/// Whether a user group passes the configured filters; no filters admit everything.
	pub fn matches_group(&self, group: &str) -> bool {
		matches_filters(&self.user_group_filters, group)
	}

	/// Whether a user organization passes the configured filters; no filters admit everything.
	pub fn matches_org(&self, org: &str) -> bool {
		matches_filters(&self.user_org_filters, org)
	}
}

#[derive(Debug, Default)]
struct ProviderDefaults {
	authorization_url: Option<String>,
	token_url: Option<String>,
	quirks: Quirks,
	access_token_only: bool,
}

fn okta(config: &mut BackendConfig) -> Result<ProviderDefaults> {
	if config.server_id.is_empty() {
		return Err(Error::MissingProviderField { provider: Provider::Okta, field: "server_id" });
	}
	if config.domain_name.is_empty() {
		return Err(Error::MissingProviderField { provider: Provider::Okta, field: "domain_name" });
	}
	if config.base_auth_url.is_empty() {
		config.base_auth_url = format!("https://{}/oauth2/{}/", config.domain_name, config.server_id);

		if config.metadata_url.is_empty() {
			config.metadata_url = format!(
				"{}.well-known/openid-configuration?client_id={}",
				config.base_auth_url, config.client_id
			);
		}
	}

	Ok(ProviderDefaults::default())
}

fn google(config: &mut BackendConfig) -> Result<ProviderDefaults> {
	if config.base_auth_url.is_empty() {
		config.base_auth_url = "https://accounts.google.com/o/oauth2/v2/".into();

		if config.metadata_url.is_empty() {
			config.metadata_url =
				"https://accounts.google.com/.well-known/openid-configuration".into();
		}
	}
	if !config.client_id.contains('.') {
		config.client_id.push_str(GOOGLE_CLIENT_ID_SUFFIX);
	}

	Ok(ProviderDefaults::default())
}

fn github(config: &mut BackendConfig) -> Result<ProviderDefaults> {
	if config.base_auth_url.is_empty() {
		config.base_auth_url = "https://github.com/login/oauth/".into();
	}

	Ok(ProviderDefaults {
		authorization_url: Some("https://github.com/login/oauth/authorize".into()),
		token_url: Some("https://github.com/login/oauth/access_token".into()),
		quirks: Quirks::plain_oauth2(),
		access_token_only: true,
	})
}

fn gitlab(config: &mut BackendConfig) -> Result<ProviderDefaults> {
	if config.domain_name.is_empty() {
		config.domain_name = "gitlab.com".into();
	}
	if config.base_auth_url.is_empty() {
		config.base_auth_url = format!("https://{}/", config.domain_name);

		if config.metadata_url.is_empty() {
			config.metadata_url = format!("{}.well-known/openid-configuration", config.base_auth_url);
		}
	}

	Ok(ProviderDefaults::default())
}

fn azure(config: &mut BackendConfig) -> Result<ProviderDefaults> {
	if config.tenant_id.is_empty() {
		config.tenant_id = "common".into();
	}
	if config.base_auth_url.is_empty() {
		config.base_auth_url =
			format!("https://login.microsoftonline.com/{}/oauth2/v2.0/", config.tenant_id);

		if config.metadata_url.is_empty() {
			config.metadata_url = format!(
				"https://login.microsoftonline.com/{}/v2.0/.well-known/openid-configuration",
				config.tenant_id
			);
		}
	}

	Ok(ProviderDefaults::default())
}

fn facebook(config: &mut BackendConfig) -> Result<ProviderDefaults> {
	if config.base_auth_url.is_empty() {
		config.base_auth_url = "https://www.facebook.com/v12.0/dialog/".into();
	}

	Ok(ProviderDefaults {
		authorization_url: Some("https://www.facebook.com/v12.0/dialog/oauth".into()),
		token_url: Some("https://graph.facebook.com/v12.0/oauth/access_token".into()),
		quirks: Quirks::plain_oauth2(),
		access_token_only: true,
	})
}

fn nextcloud(config: &mut BackendConfig) -> Result<ProviderDefaults> {
	let mut defaults = ProviderDefaults {
		quirks: Quirks { key_verification_disabled: true, ..Default::default() },
		..Default::default()
	};

	// Without a base URL resolution fails later with `AuthorizationUrlNotFound`.
	if !config.base_auth_url.is_empty() {
		let base = config.base_auth_url.trim_end_matches('/');

		defaults.authorization_url = Some(format!("{base}/apps/oauth2/authorize"));
		defaults.token_url = Some(format!("{base}/apps/oauth2/api/v1/token"));
	}

	Ok(defaults)
}

fn non_empty(value: &str) -> Option<String> {
	(!value.is_empty()).then(|| value.to_string())
}

fn compile_filters(patterns: &[String]) -> Result<Vec<Regex>> {
	patterns
		.iter()
		.map(|pattern| {
			Regex::new(pattern).map_err(|source| Error::InvalidFilterPattern {
				pattern: pattern.clone(),
				source,
			})
		})
		.collect()
}

fn matches_filters(filters: &[Regex], value: &str) -> bool {
	filters.is_empty() || filters.iter().any(|filter| filter.is_match(value))
}
