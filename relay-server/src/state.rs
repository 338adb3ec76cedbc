use std::sync::Arc;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use reqwest::Client;
use url::Url;

use crate::config::Settings;
use crate::flow_state::FlowStateStore;
use crate::oidc::realm::RealmClient;
use crate::oidc::IdpClient;
use crate::users::memory::MemoryUserStore;
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub idp: Arc<dyn IdpClient>,
    pub users: Arc<dyn UserStore>,
    pub flow_states: FlowStateStore,
    /// Parsed once at startup; used for both legs of the code flow
    pub callback_url: Url,
}

impl AppState {
    fn create_idp_http_client(timeout: u64) -> reqwest::Client {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Create a specialized client for the identity provider
        Client::builder()
            // Set reasonable timeouts
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(2))
            .default_headers(headers)
            // Configure connection pool
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            // Build the client
            .build()
            .expect("Failed to create IdP HTTP client")
    }

    pub fn new(settings: Settings) -> Result<Self, std::io::Error> {
        let server_url = Url::parse(&settings.oidc.server_url).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid OIDC server URL: {e}"),
            )
        })?;
        let callback_url = Url::parse(&settings.auth.callback_url).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid callback URL: {e}"),
            )
        })?;

        let http_client = Self::create_idp_http_client(settings.oidc.request_timeout);
        let idp = RealmClient::new(
            http_client,
            &server_url,
            &settings.oidc.realm,
            &settings.oidc.client_id,
        )
        .map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid OIDC endpoint configuration: {e}"),
            )
        })?;

        Ok(Self {
            flow_states: FlowStateStore::new(Duration::from_secs(settings.auth.state_ttl)),
            callback_url,
            idp: Arc::new(idp),
            users: Arc::new(MemoryUserStore::new()),
            settings: Arc::new(settings),
        })
    }
}
