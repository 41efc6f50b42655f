//! End-to-end configuration against a mock identity provider.

// crates.io
use oauth2_backend::{Backend, BackendConfig, BackendState, Error, Provider, Result};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::common::{self, DISCOVERY_PATH, JWKS_PATH, MODULUS};

#[tokio::test]
async fn generic_provider_discovers_endpoints_and_keys() -> Result<()> {
	common::init_tracing();

	let server = MockServer::start().await;

	common::mount_discovery(&server, 1).await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("primary", MODULUS)]))
		.expect(1)
		.mount(&server)
		.await;

	let backend = Backend::configure(common::generic_config(&server)).await?;
	let endpoints = backend.endpoints()?;
	let address = server.address();

	assert_eq!(backend.state(), BackendState::Ready);
	assert_eq!(endpoints.authorization_url, format!("{}/authorize", server.uri()));
	assert_eq!(endpoints.token_url.as_deref(), Some(format!("{}/token", server.uri()).as_str()));
	assert_eq!(endpoints.userinfo_url.as_deref(), Some(format!("{}/userinfo", server.uri()).as_str()));
	assert_eq!(endpoints.server_hostname, format!("{}:{}", address.ip(), address.port()));
	assert!(endpoints.metadata.as_ref().and_then(|doc| doc.get_str("issuer")).is_some());
	assert_eq!(backend.config().scopes, vec!["openid", "email", "profile"]);
	assert_eq!(backend.config().required_token_fields, vec!["access_token", "id_token"]);

	let key = backend.signing_key("primary").await?;

	assert_eq!(key.key_type, "RSA");
	assert!(key.decoding_key().is_ok());

	let metrics = backend.metrics().snapshot();

	assert_eq!(metrics.metadata_attempts, 1);
	assert_eq!(metrics.key_fetch_attempts, 1);
	assert_eq!(metrics.keys_held, 1);

	Ok(())
}

#[tokio::test]
async fn github_configures_without_any_network_call() -> Result<()> {
	let config = BackendConfig {
		name: "github".into(),
		method: "oauth2".into(),
		realm: "github".into(),
		provider: "github".into(),
		client_id: "client".into(),
		client_secret: "secret".into(),
		..Default::default()
	};
	let backend = Backend::configure(config).await?;
	let metrics = backend.metrics().snapshot();

	assert!(backend.is_ready());
	assert!(backend.profile().quirks.key_verification_disabled);
	assert!(backend.profile().quirks.accept_header_enabled);
	assert_eq!(backend.config().required_token_fields, vec!["access_token"]);
	assert_eq!(metrics.metadata_attempts, 0);
	assert_eq!(metrics.key_fetch_attempts, 0);
	assert!(backend.key_snapshot().await.is_empty());

	Ok(())
}

#[tokio::test]
async fn okta_without_server_id_fails_before_any_request() {
	let server = MockServer::start().await;

	Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

	let address = server.address();
	let config = BackendConfig {
		name: "okta".into(),
		method: "oauth2".into(),
		realm: "okta".into(),
		provider: "okta".into(),
		domain_name: format!("{}:{}", address.ip(), address.port()),
		client_id: "client".into(),
		client_secret: "secret".into(),
		..Default::default()
	};

	assert!(matches!(
		Backend::configure(config).await,
		Err(Error::MissingProviderField { provider: Provider::Okta, field: "server_id" })
	));
}

#[tokio::test]
async fn generic_without_base_url_has_no_authorization_url() {
	let config = BackendConfig {
		name: "corp".into(),
		method: "oauth2".into(),
		realm: "corp".into(),
		provider: "generic".into(),
		client_id: "client".into(),
		client_secret: "secret".into(),
		..Default::default()
	};

	assert!(matches!(
		Backend::configure(config).await,
		Err(Error::AuthorizationUrlNotFound(Provider::Generic))
	));
}

#[tokio::test]
async fn metadata_retries_are_exhausted_then_reported() {
	common::init_tracing();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(503))
		.expect(2)
		.mount(&server)
		.await;

	let config =
		BackendConfig { retry_attempts: 2, retry_interval: 1, ..common::generic_config(&server) };

	match Backend::configure(config).await {
		Err(Error::MetadataFetchFailed(cause)) =>
			assert!(matches!(*cause, Error::HttpStatus { status, .. } if status.as_u16() == 503)),
		other => panic!("expected MetadataFetchFailed, got {other:?}"),
	}
}

#[tokio::test]
async fn missing_metadata_field_fails_metadata_acquisition() {
	let server = MockServer::start().await;
	let mut document = common::discovery_document(&server);

	document.as_object_mut().expect("object").remove("jwks_uri");

	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(document))
		.expect(1)
		.mount(&server)
		.await;

	match Backend::configure(common::generic_config(&server)).await {
		Err(Error::MetadataFetchFailed(inner)) =>
			assert!(matches!(*inner, Error::MetadataFieldNotFound("jwks_uri"))),
		other => panic!("expected MetadataFetchFailed, got {other:?}"),
	}
}

#[tokio::test]
async fn invalid_key_fails_configuration() {
	let server = MockServer::start().await;
	let mut broken = common::rsa_key("broken", MODULUS);

	broken["kty"] = "oct".into();

	common::mount_discovery(&server, 1).await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("primary", MODULUS), broken]))
		.expect(1)
		.mount(&server)
		.await;

	match Backend::configure(common::generic_config(&server)).await {
		Err(Error::KeyFetchFailed(cause)) => assert!(matches!(*cause, Error::InvalidKey(_))),
		other => panic!("expected KeyFetchFailed, got {other:?}"),
	}
}

#[tokio::test]
async fn explicit_authorization_url_without_key_url_fails_key_acquisition() {
	let server = MockServer::start().await;

	Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

	let config = BackendConfig {
		authorization_url: format!("{}/authorize", server.uri()),
		metadata_url: String::new(),
		retry_attempts: 3,
		..common::generic_config(&server)
	};

	match Backend::configure(config).await {
		Err(Error::KeyFetchFailed(cause)) =>
			assert!(matches!(*cause, Error::Validation { field: "jwks_uri", .. })),
		other => panic!("expected KeyFetchFailed, got {other:?}"),
	}
}

#[tokio::test]
async fn delayed_start_acquires_in_the_background() -> Result<()> {
	common::init_tracing();

	let server = MockServer::start().await;

	common::mount_discovery(&server, 1).await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("primary", MODULUS)]))
		.expect(1)
		.mount(&server)
		.await;

	let config = BackendConfig { delay_start: 1, ..common::generic_config(&server) };
	let backend = Backend::configure(config).await?;

	assert_eq!(backend.state(), BackendState::AcquiringMetadata);
	assert!(matches!(backend.signing_key("primary").await, Err(Error::NotReady)));

	backend.wait_ready().await?;

	assert!(backend.is_ready());
	assert_eq!(backend.signing_key("primary").await?.key_id, "primary");

	Ok(())
}

#[tokio::test]
async fn delayed_start_failure_leaves_backend_unusable() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(404))
		.expect(2)
		.mount(&server)
		.await;

	let config = BackendConfig { delay_start: 1, ..common::generic_config(&server) };
	let backend = Backend::configure(config).await.expect("configured");

	assert!(matches!(backend.wait_ready().await, Err(Error::AcquisitionFailed(_))));
	assert!(matches!(backend.state(), BackendState::Failed(_)));
	assert!(matches!(backend.endpoints(), Err(Error::NotReady)));
	assert!(matches!(backend.signing_key("primary").await, Err(Error::NotReady)));
	assert_eq!(backend.metrics().snapshot().metadata_errors, 2);
}

#[tokio::test]
async fn failed_key_acquisition_withholds_endpoints_until_recovered() -> Result<()> {
	let server = MockServer::start().await;

	common::mount_discovery(&server, 1).await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ResponseTemplate::new(500))
		.up_to_n_times(2)
		.expect(2)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(common::key_set(vec![common::rsa_key("primary", MODULUS)]))
		.expect(1)
		.mount(&server)
		.await;

	let config = BackendConfig { delay_start: 1, ..common::generic_config(&server) };
	let backend = Backend::configure(config).await?;

	assert!(matches!(backend.wait_ready().await, Err(Error::AcquisitionFailed(_))));
	assert!(matches!(backend.state(), BackendState::Failed(_)));
	assert!(matches!(backend.endpoints(), Err(Error::NotReady)));
	assert!(matches!(backend.redirect_directive("redirect_url"), Err(Error::NotReady)));

	assert_eq!(backend.refresh_keys().await?, 1);
	assert!(backend.is_ready());
	assert_eq!(backend.endpoints()?.authorization_url, format!("{}/authorize", server.uri()));
	assert!(backend.redirect_directive("redirect_url").is_ok());

	Ok(())
}
