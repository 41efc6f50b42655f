//! Login redirects for unauthenticated requests.
//!
//! [`build`] decides whether and where to redirect; [`RedirectDirective::location_response`]
//! and [`RedirectDirective::script_response`] render the two wire shapes.

// std
use std::fmt::{Display, Formatter, Result as FmtResult, Write};
// crates.io
use http::{
	HeaderMap, Request, Response, StatusCode,
	header::{CONTENT_TYPE, HOST, LOCATION},
};
use url::form_urlencoded;
// self
use crate::_prelude::*;

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_PORT: &str = "x-forwarded-port";

/// Separator placed before the next query parameter of the authorization URL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Separator {
	/// `?`: the URL has no query yet.
	#[default]
	Question,
	/// `&`: the URL already has a query.
	Ampersand,
}
impl Separator {
	/// Separator character.
	pub fn as_str(&self) -> &'static str {
		match self {
			Separator::Question => "?",
			Separator::Ampersand => "&",
		}
	}
}
impl Display for Separator {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Per-request redirect decision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedirectDirective {
	/// Whether a redirect should be emitted at all.
	pub enabled: bool,
	/// Authorization URL the caller is sent to.
	pub auth_url: String,
	/// Absolute URL to return to after login.
	pub url: String,
	/// Separator before the return-to parameter.
	pub separator: Separator,
	/// Name of the return-to query parameter.
	pub query_parameter: String,
	/// Username or email pre-filled at the provider.
	pub login_hint: Option<String>,
	/// Response status; each response shape has its own default.
	pub status_code: Option<StatusCode>,
	/// Redirect straight to `auth_url` without a return-to parameter.
	pub query_disabled: bool,
}
impl RedirectDirective {
	/// Directive redirecting to `auth_url` with the return-to URL in `query_parameter`.
	pub fn new(auth_url: impl Into<String>, query_parameter: impl Into<String>) -> Self {
		Self { auth_url: auth_url.into(), query_parameter: query_parameter.into(), ..Default::default() }
	}

	/// Pre-fill the provider login form.
	pub fn with_login_hint(mut self, login_hint: impl Into<String>) -> Self {
		self.login_hint = Some(login_hint.into());

		self
	}

	/// Override the response status.
	pub fn with_status_code(mut self, status_code: StatusCode) -> Self {
		self.status_code = Some(status_code);

		self
	}

	/// Disable the return-to query parameter.
	pub fn with_query_disabled(mut self, query_disabled: bool) -> Self {
		self.query_disabled = query_disabled;

		self
	}

	/// Target of the `Location` header.
	pub fn location(&self) -> String {
		if self.query_disabled {
			return self.auth_url.clone();
		}

		format!(
			"{}{}{}={}",
			self.auth_url,
			self.separator,
			self.query_parameter,
			query_escape(&self.url)
		)
	}

	/// Header-based redirect, or `None` when redirection is disabled.
	///
	/// Defaults to `302 Found`; the body is the status reason phrase.
	pub fn location_response(&self) -> Result<Option<Response<String>>> {
		if !self.enabled {
			return Ok(None);
		}

		let status = self.status_code.unwrap_or(StatusCode::FOUND);
		let response = Response::builder()
			.status(status)
			.header(LOCATION, self.location())
			.body(status.canonical_reason().unwrap_or_default().to_string())?;

		Ok(Some(response))
	}

	/// Script-based redirect, or `None` when redirection is disabled.
	///
	/// Defaults to `401 Unauthorized`. The script appends the browser's URL fragment, which
	/// never reaches the server, to the return-to URL.
	pub fn script_response(&self) -> Result<Option<Response<String>>> {
		if !self.enabled {
			return Ok(None);
		}

		let status = self.status_code.unwrap_or(StatusCode::UNAUTHORIZED);
		let response = Response::builder()
			.status(status)
			.header(CONTENT_TYPE, "text/html; charset=utf-8")
			.body(self.render_script())?;

		Ok(Some(response))
	}

	fn render_script(&self) -> String {
		let (separator, parameter) = if self.query_disabled {
			("", "")
		} else {
			(self.separator.as_str(), self.query_parameter.as_str())
		};

		format!(
			r##"
<html>
    <body>
        <p>User Unauthorized. Redirecting to login.</p>
        <script>
        var auth_url_path = "{auth_url}";
        var sep = "{separator}";
        var redir_param = "{parameter}";
        var redir_url = "{url}";
        if (window.location.hash) {{
            redir_url = redir_url + "#" + window.location.hash.substr(1);
        }}
        var final_url = auth_url_path;
        if (redir_param) {{
            final_url = auth_url_path + sep + redir_param + "=" + encodeURIComponent(redir_url);
        }}
        window.location = final_url;
        </script>
    </body>
</html>
"##,
			auth_url = js_escape(&self.auth_url),
			separator = js_escape(separator),
			parameter = js_escape(parameter),
			url = js_escape(&self.url),
		)
	}
}

/// Decide how `request` should be redirected to the provider login.
///
/// A request whose URI already carries the return-to parameter is mid-redirect and yields a
/// disabled directive. `secure` tells whether the request arrived over TLS and only matters
/// without an `X-Forwarded-Proto` header.
pub fn build<B>(
	request: &Request<B>,
	secure: bool,
	mut directive: RedirectDirective,
) -> RedirectDirective {
	let request_uri = request.uri().to_string();

	if request_uri.contains(directive.query_parameter.as_str()) {
		tracing::debug!(uri = %request_uri, "request is already redirecting; skipping");

		directive.enabled = false;

		return directive;
	}

	directive.enabled = true;

	if directive.query_disabled {
		return directive;
	}

	directive.separator = Separator::Question;
	directive.url = if request_uri.starts_with('/') {
		format!("{}{request_uri}", return_base_url(request, secure))
	} else {
		request_uri
	};

	if directive.auth_url.contains('?') {
		directive.separator = Separator::Ampersand;
	}
	if let Some(hint) = directive.login_hint.as_deref().filter(|hint| !hint.is_empty()) {
		let auth_url =
			format!("{}{}login_hint={}", directive.auth_url, directive.separator, query_escape(hint));

		directive.auth_url = auth_url;
		directive.separator = Separator::Ampersand;
	}

	directive
}

/// Build the directive and render the header-based response.
pub fn location_redirect<B>(
	request: &Request<B>,
	secure: bool,
	directive: RedirectDirective,
) -> Result<Option<Response<String>>> {
	build(request, secure, directive).location_response()
}

/// Build the directive and render the script-based response.
pub fn script_redirect<B>(
	request: &Request<B>,
	secure: bool,
	directive: RedirectDirective,
) -> Result<Option<Response<String>>> {
	build(request, secure, directive).script_response()
}

fn return_base_url<B>(request: &Request<B>, secure: bool) -> String {
	let headers = request.headers();
	let host = header(headers, X_FORWARDED_HOST)
		.or_else(|| header(headers, HOST.as_str()))
		.map(str::to_string)
		.or_else(|| request.uri().authority().map(|authority| authority.to_string()))
		.unwrap_or_default();
	let proto = header(headers, X_FORWARDED_PROTO).unwrap_or(if secure { "https" } else { "http" });
	let mut base = format!("{proto}://{host}");

	match (header(headers, X_FORWARDED_PORT), proto) {
		(None, _) | (Some("443"), "https") | (Some("80"), "http") => {},
		(Some(port), _) => {
			let _ = write!(base, ":{port}");
		},
	}

	base
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|value| value.to_str().ok()).filter(|value| !value.is_empty())
}

/// Query component escaping: unreserved bytes (`A-Z a-z 0-9 - _ . ~`) pass through, space
/// becomes `+`, everything else is `%XX`.
fn query_escape(value: &str) -> String {
	form_urlencoded::byte_serialize(value.as_bytes()).fold(
		String::with_capacity(value.len()),
		|mut escaped, chunk| {
			match chunk {
				"%7E" => escaped.push('~'),
				chunk => escaped.push_str(&chunk.replace('*', "%2A")),
			}

			escaped
		},
	)
}

/// Escape a value for a double-quoted JavaScript string inside an HTML document.
fn js_escape(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());

	for c in value.chars() {
		match c {
			'\\' => escaped.push_str(r"\\"),
			'/' => escaped.push_str(r"\/"),
			'\n' => escaped.push_str(r"\n"),
			'\r' => escaped.push_str(r"\r"),
			'\t' => escaped.push_str(r"\t"),
			'"' | '\'' | '<' | '>' | '&' | '+' | '`' | '\u{2028}' | '\u{2029}' => {
				let _ = write!(escaped, "\\u{:04x}", c as u32);
			},
			c if c.is_control() => {
				let _ = write!(escaped, "\\u{:04x}", c as u32);
			},
			c => escaped.push(c),
		}
	}

	escaped
}
