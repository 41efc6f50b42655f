//! Key set retrieval: rate limiting, additive merges, and on-demand refresh.

// crates.io
use oauth2_backend::{
	Backend, Error, Result,
	http::client,
	keys::{fetch, limiter::KeyFetchLimiter, store::KeyStore},
};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::common::{self, JWKS_PATH, MODULUS, ROTATED_MODULUS};

fn jwks_url(server: &MockServer) -> Url {
	Url::parse(&format!("{}{JWKS_PATH}", server.uri())).expect("url")
}

#[tokio::test]
async fn fifth_fetch_in_the_window_makes_no_request() -> Result<()> {
	common::init_tracing();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("primary", MODULUS)]))
		.expect(4)
		.mount(&server)
		.await;

	let client = client::build_client()?;
	let limiter = KeyFetchLimiter::new();
	let store = KeyStore::new();
	let url = jwks_url(&server);

	for _ in 0..4 {
		fetch::fetch_keys(&client, &url, &limiter, &store).await?;
	}

	assert!(matches!(
		fetch::fetch_keys(&client, &url, &limiter, &store).await,
		Err(Error::TooManyAttempts)
	));
	assert_eq!(limiter.attempts().await, 4);

	Ok(())
}

#[tokio::test]
async fn merges_are_additive_by_key_id() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![
			common::rsa_key("a", MODULUS),
			common::rsa_key("b", MODULUS),
		]))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![
			common::rsa_key("b", ROTATED_MODULUS),
			common::rsa_key("c", MODULUS),
		]))
		.expect(1)
		.mount(&server)
		.await;

	let client = client::build_client()?;
	let limiter = KeyFetchLimiter::new();
	let store = KeyStore::new();
	let url = jwks_url(&server);

	assert_eq!(fetch::fetch_keys(&client, &url, &limiter, &store).await?, 2);
	assert_eq!(fetch::fetch_keys(&client, &url, &limiter, &store).await?, 3);

	let snapshot = store.snapshot().await;
	let modulus = |kid: &str| snapshot.get(kid).and_then(|key| key.modulus.clone());

	assert_eq!(modulus("a").as_deref(), Some(MODULUS));
	assert_eq!(modulus("b").as_deref(), Some(ROTATED_MODULUS));
	assert_eq!(modulus("c").as_deref(), Some(MODULUS));

	Ok(())
}

#[tokio::test]
async fn invalid_key_leaves_the_store_untouched() -> Result<()> {
	let server = MockServer::start().await;
	let mut broken = common::rsa_key("broken", MODULUS);

	broken.as_object_mut().expect("object").remove("e");

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("a", MODULUS)]))
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("a", ROTATED_MODULUS), broken]))
		.mount(&server)
		.await;

	let client = client::build_client()?;
	let limiter = KeyFetchLimiter::new();
	let store = KeyStore::new();
	let url = jwks_url(&server);

	fetch::fetch_keys(&client, &url, &limiter, &store).await?;

	let before = store.snapshot().await;

	assert!(matches!(
		fetch::fetch_keys(&client, &url, &limiter, &store).await,
		Err(Error::InvalidKey(_))
	));

	let after = store.snapshot().await;

	assert_eq!(after.len(), 1);
	assert_eq!(after.get("a").and_then(|key| key.modulus.clone()).as_deref(), Some(MODULUS));
	assert_eq!(after.updated_at, before.updated_at);

	Ok(())
}

#[tokio::test]
async fn malformed_responses_are_classified() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/not-json"))
		.respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/no-keys"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/empty"))
		.respond_with(common::key_set(Vec::new()))
		.mount(&server)
		.await;

	let client = client::build_client()?;
	let store = KeyStore::new();
	let fetch_route = |route: &'static str| {
		let client = client.clone();
		let url = Url::parse(&format!("{}{route}", server.uri())).expect("url");
		let store = &store;

		async move { fetch::fetch_keys(&client, &url, &KeyFetchLimiter::new(), store).await }
	};

	assert!(matches!(fetch_route("/not-json").await, Err(Error::KeysParseFailed(_))));
	assert!(matches!(fetch_route("/no-keys").await, Err(Error::KeysNotFoundInResponse)));
	assert!(matches!(fetch_route("/empty").await, Err(Error::NoKeysFound)));
	assert!(store.snapshot().await.is_empty());

	Ok(())
}

#[tokio::test]
async fn unknown_key_id_triggers_one_gated_refresh() -> Result<()> {
	common::init_tracing();

	let server = MockServer::start().await;

	common::mount_discovery(&server, 1).await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("primary", MODULUS)]))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![
			common::rsa_key("primary", MODULUS),
			common::rsa_key("rotated", ROTATED_MODULUS),
		]))
		.expect(3)
		.mount(&server)
		.await;

	let backend = Backend::configure(common::generic_config(&server)).await?;

	assert_eq!(backend.signing_key("primary").await?.key_id, "primary");
	assert!(matches!(backend.signing_key("rotated").await, Err(Error::KeyNotFound(_))));
	assert_eq!(backend.resolve_signing_key("rotated").await?.key_id, "rotated");

	assert!(matches!(
		backend.resolve_signing_key("ghost").await,
		Err(Error::KeyNotFound(kid)) if kid == "ghost"
	));
	assert!(matches!(backend.refresh_keys().await, Ok(2)));

	// Four attempts inside the window: the next refresh is refused without a request.
	assert!(matches!(backend.resolve_signing_key("ghost").await, Err(Error::TooManyAttempts)));

	let metrics = backend.metrics().snapshot();

	assert_eq!(metrics.key_fetch_attempts, 4);
	assert_eq!(metrics.key_fetch_rejections, 1);

	Ok(())
}
