//! Login redirects built from a configured backend.

// crates.io
use http::{Request, StatusCode, header::LOCATION};
use oauth2_backend::{BackendRegistry, BackendState, Result, redirect};
use wiremock::{
	Mock, MockServer,
	matchers::{method, path},
};
// self
use crate::common::{self, JWKS_PATH, MODULUS};

#[tokio::test]
async fn registered_backend_redirects_to_discovered_authorization_url() -> Result<()> {
	common::init_tracing();

	let server = MockServer::start().await;

	common::mount_discovery(&server, 1).await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("primary", MODULUS)]))
		.expect(1)
		.mount(&server)
		.await;

	let registry = BackendRegistry::new();

	registry.register(common::generic_config(&server)).await?;

	let backend = registry.get("corp").await?;
	let request = Request::builder()
		.uri("/dashboard?tab=keys")
		.header("x-forwarded-host", "portal.example.com")
		.header("x-forwarded-proto", "https")
		.header("x-forwarded-port", "8443")
		.body(())?;
	let directive = backend.redirect_directive("redirect_url")?.with_login_hint("a@b.com");
	let response = redirect::location_redirect(&request, false, directive)?.expect("redirect");

	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(
		response.headers()[LOCATION],
		format!(
			"{}/authorize?login_hint=a%40b.com&redirect_url=https%3A%2F%2Fportal.example.com%3A8443%2Fdashboard%3Ftab%3Dkeys",
			server.uri()
		)
		.as_str()
	);

	let looping = Request::builder().uri("/dashboard?redirect_url=x").body(())?;

	assert!(redirect::location_redirect(&looping, false, backend.redirect_directive("redirect_url")?)?.is_none());

	let status = registry.status("corp").await?;

	assert_eq!(status.state, BackendState::Ready);
	assert_eq!(status.key_count, 1);
	assert!(status.last_key_fetch.is_some());

	Ok(())
}
