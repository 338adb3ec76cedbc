use confique::Config;

/// Main configuration structure for the relay server.
///
/// Every value is read from the environment once at startup; the loaded
/// settings are immutable for the lifetime of the process.
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The port the relay server will listen to (default: 7600)
    #[config(env = "RELAY_PORT", default = 7600)]
    pub port: u16,

    /// Identity provider connection settings
    #[config(nested)]
    pub oidc: OidcSettings,

    /// Authorization-code flow settings
    #[config(nested)]
    pub auth: AuthFlowSettings,
}

/// Connection settings for the external OIDC identity provider
#[derive(Debug, Config, Clone)]
pub struct OidcSettings {
    /// Base URL of the identity provider (e.g. "https://idp.example.com")
    #[config(env = "RELAY_OIDC_SERVER_URL")]
    pub server_url: String,

    /// Realm name the deployment is bound to
    #[config(env = "RELAY_OIDC_REALM")]
    pub realm: String,

    /// Client id registered with the identity provider
    #[config(env = "RELAY_OIDC_CLIENT_ID")]
    pub client_id: String,

    /// Timeout in seconds for requests to the identity provider (default: 10)
    #[config(env = "RELAY_OIDC_REQUEST_TIMEOUT", default = 10)]
    pub request_timeout: u64,
}

/// Settings for the browser-based sign-in flow
#[derive(Debug, Config, Clone)]
pub struct AuthFlowSettings {
    /// Redirect URI sent to the provider for the authorization-code flow.
    /// Must match the URI registered with the provider exactly.
    #[config(env = "RELAY_AUTH_CALLBACK_URL")]
    pub callback_url: String,

    /// Where the browser is sent after the sign-in flow completes
    #[config(env = "RELAY_AUTH_POST_AUTH_REDIRECT_URL")]
    pub post_auth_redirect_url: String,

    /// Verify the `state` parameter on callback against the values issued
    /// at initiation (default: false)
    #[config(env = "RELAY_AUTH_VERIFY_STATE", default = false)]
    pub verify_state: bool,

    /// How long an issued `state` value stays valid, in seconds (default: 300)
    #[config(env = "RELAY_AUTH_STATE_TTL", default = 300)]
    pub state_ttl: u64,
}

impl Settings {
    /// Loads the configuration from environment variables
    pub fn load() -> Result<Self, confique::Error> {
        Settings::builder().env().load()
    }

    #[cfg(test)]
    pub(crate) fn for_test_with_idp(idp_mock: &wiremock::MockServer) -> Self {
        Self {
            port: 0, // Let the OS choose a port
            oidc: OidcSettings {
                // Use the mock server address for testing
                server_url: idp_mock.uri(),
                realm: "test".to_string(),
                client_id: "relay".to_string(),
                request_timeout: 5,
            },
            auth: AuthFlowSettings {
                callback_url: "http://relay.local/auth/callback".to_string(),
                post_auth_redirect_url: "http://relay.local/welcome".to_string(),
                verify_state: false,
                state_ttl: 300,
            },
        }
    }
}
