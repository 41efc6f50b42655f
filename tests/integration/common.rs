//! Shared fixtures for the mock identity provider.

// crates.io
use oauth2_backend::BackendConfig;
use serde_json::{Value, json};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/keys";
pub const MODULUS: &str = "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSYnKCkqKywtLi8wMTIzNDU2Nzg5Ojs8PT4_QEFCQ0RFRkdISUpLTE1OT1BRUlNUVVZXWFlaW1xdXl9gYWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXp7fH1-f4A";
pub const ROTATED_MODULUS: &str = "gH9-fXx7enl4d3Z1dHNycXBvbm1sa2ppaGdmZWRjYmFgX15dXFtaWVhXVlVUU1JRUE9OTUxLSklIR0ZFRENCQUA_Pj08Ozo5ODc2NTQzMjEwLy4tLCsqKSgnJiUkIyIhIB8eHRwbGhkYFxYVFBMSERAPDg0MCwoJCAcGBQQDAgE";

pub fn rsa_key(kid: &str, modulus: &str) -> Value {
	json!({ "kty": "RSA", "alg": "RS256", "use": "sig", "kid": kid, "n": modulus, "e": "AQAB" })
}

pub fn key_set(keys: Vec<Value>) -> ResponseTemplate {
	ResponseTemplate::new(200).set_body_json(json!({ "keys": keys }))
}

pub fn discovery_document(server: &MockServer) -> Value {
	let base = server.uri();

	json!({
		"issuer": base,
		"authorization_endpoint": format!("{base}/authorize"),
		"token_endpoint": format!("{base}/token"),
		"userinfo_endpoint": format!("{base}/userinfo"),
		"jwks_uri": format!("{base}{JWKS_PATH}")
	})
}

pub async fn mount_discovery(server: &MockServer, expected: u64) {
	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(discovery_document(server)))
		.expect(expected)
		.mount(server)
		.await;
}

pub fn generic_config(server: &MockServer) -> BackendConfig {
	BackendConfig {
		name: "corp".into(),
		method: "oauth2".into(),
		realm: "corp".into(),
		provider: "generic".into(),
		client_id: "client".into(),
		client_secret: "secret".into(),
		base_auth_url: format!("{}/", server.uri()),
		metadata_url: format!("{}{DISCOVERY_PATH}", server.uri()),
		..Default::default()
	}
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}
