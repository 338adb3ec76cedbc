use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::LevelFilter;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

use crate::config::Settings;
use crate::create_app;
use crate::state::tests::create_test_state;
use crate::state::AppState;
use crate::users::memory::MemoryUserStore;
use crate::users::UserStore as _;

pub const TEST_REALM: &str = "test";
pub const TEST_CLIENT_ID: &str = "relay";

/// Test fixture wiring the real router against a wiremock identity
/// provider.
///
/// The fixture exposes the injected in-memory user store so tests can seed
/// records and assert on provisioning behavior, and a [`TokenSigner`] whose
/// public key the mock provider publishes via `mock_jwks`.
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Application state backing the router
    pub state: AppState,
    /// The user repository behind the router
    pub users: Arc<MemoryUserStore>,
    /// Mock server standing in for the identity provider
    pub idp_mock: MockServer,
    /// Signs test tokens the mock provider's key set verifies
    pub signer: TokenSigner,
}

impl TestFixture {
    /// Creates a new test fixture with a mock identity provider
    pub async fn new() -> Self {
        Self::with_settings_tweak(|_| {}).await
    }

    /// Creates a fixture, letting the caller adjust settings before the
    /// application is built
    pub async fn with_settings_tweak(tweak: impl FnOnce(&mut Settings)) -> Self {
        // Initialize test logger
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let idp_mock = MockServer::start().await;
        let mut settings = Settings::for_test_with_idp(&idp_mock);
        tweak(&mut settings);

        let users = Arc::new(MemoryUserStore::new());
        let state = create_test_state(settings, users.clone());
        let app = create_app(state.clone());

        Self {
            app,
            state,
            users,
            idp_mock,
            signer: TokenSigner::new(),
        }
    }

    /// Path of a realm endpoint on the mock provider
    pub fn realm_path(leaf: &str) -> String {
        format!("/realms/{TEST_REALM}/protocol/openid-connect/{leaf}")
    }

    /// Publish the signer's key set on the mock provider
    pub async fn mock_jwks(&self) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path(Self::realm_path("certs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.signer.jwks()))
            .mount(&self.idp_mock)
            .await;
    }

    /// Provision a user record directly in the repository
    pub async fn seed_user(&self, username: &str, email: &str) {
        self.users
            .create_if_absent(username, email)
            .await
            .expect("Failed to seed user");
    }

    /// Creates a request builder with a JSON content type
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
    }

    /// Sends a GET request to the specified URI
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a GET request with custom headers
    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(Method::GET, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body and custom headers
    pub async fn post_with_headers<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let mut builder = self.request_builder(Method::POST, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to an empty object on empty or
        // non-JSON bodies
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }
}

/// Response from a test request with convenient access to status, headers
/// and JSON body
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// Asserts that the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }
}

/// RSA key material for RS256 test tokens
struct TestKeyMaterial {
    pem: String,
    n: String,
    e: String,
}

fn generate_key_material() -> TestKeyMaterial {
    let private_key =
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("Failed to generate RSA test key");
    let pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .expect("Failed to encode RSA test key")
        .to_string();
    let public_key = private_key.to_public_key();
    TestKeyMaterial {
        pem,
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    }
}

/// Key generation is expensive; the default signer shares one key across
/// the whole test binary
fn shared_key_material() -> &'static TestKeyMaterial {
    static MATERIAL: OnceLock<TestKeyMaterial> = OnceLock::new();
    MATERIAL.get_or_init(generate_key_material)
}

/// Signs RS256 access tokens for tests and exposes the matching JWKS
/// document.
pub struct TokenSigner {
    pem: String,
    n: String,
    e: String,
    kid: String,
}

impl TokenSigner {
    /// Signer backed by the shared test key
    pub fn new() -> Self {
        let material = shared_key_material();
        Self {
            pem: material.pem.clone(),
            n: material.n.clone(),
            e: material.e.clone(),
            kid: "test-key".to_string(),
        }
    }

    /// Signer with a key of its own; its tokens fail verification against
    /// the shared key's JWKS
    pub fn with_fresh_key() -> Self {
        let material = generate_key_material();
        Self {
            pem: material.pem,
            n: material.n,
            e: material.e,
            kid: "test-key".to_string(),
        }
    }

    /// JWKS document for this signer's public key
    pub fn jwks(&self) -> Value {
        json!({
            "keys": [{
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "kid": self.kid,
                "n": self.n,
                "e": self.e,
            }]
        })
    }

    /// Mint an access token expiring `expires_in` seconds from now
    /// (negative for an already-expired token)
    pub fn mint(&self, username: &str, email: &str, expires_in: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "sub": format!("{username}-subject"),
            "preferred_username": username,
            "email": email,
            "iat": now,
            "exp": now + expires_in,
        });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        let key = EncodingKey::from_rsa_pem(self.pem.as_bytes())
            .expect("Failed to load RSA test key");
        jsonwebtoken::encode(&header, &claims, &key).expect("Failed to sign test token")
    }
}
