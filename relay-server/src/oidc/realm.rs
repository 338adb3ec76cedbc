//! Concrete identity provider adapter speaking realm-scoped OIDC endpoints.

use async_trait::async_trait;
use chrono::DateTime;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::{debug, error, warn};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{IdentityClaims, IdpClient, OidcError, TokenBundle};

/// Identity provider client bound to a single realm and client id.
///
/// Endpoint URLs are computed once at construction so malformed
/// configuration fails at startup instead of on the first request.
pub struct RealmClient {
    client: Client,
    client_id: String,
    auth_url: Url,
    token_url: Url,
    logout_url: Url,
    certs_url: Url,
}

impl RealmClient {
    /// Create a new realm client on top of a shared HTTP client
    pub fn new(
        client: Client,
        server_url: &Url,
        realm: &str,
        client_id: &str,
    ) -> Result<Self, OidcError> {
        Ok(Self {
            auth_url: realm_endpoint(server_url, realm, "auth")?,
            token_url: realm_endpoint(server_url, realm, "token")?,
            logout_url: realm_endpoint(server_url, realm, "logout")?,
            certs_url: realm_endpoint(server_url, realm, "certs")?,
            client,
            client_id: client_id.to_string(),
        })
    }

    /// Form-POST to the realm token endpoint
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Response, OidcError> {
        Ok(self
            .client
            .post(self.token_url.clone())
            .form(form)
            .send()
            .await?)
    }

    /// Fetch the realm's published signing keys.
    ///
    /// Fetched per validation: token verification always reflects the
    /// provider's current key set.
    async fn fetch_signing_keys(&self) -> Result<JwkSet, OidcError> {
        debug!("fetching realm signing keys from {}", self.certs_url);
        let response = self.client.get(self.certs_url.clone()).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            error!("signing key fetch failed with HTTP {status}");
            return Err(OidcError::Provider(format!(
                "signing key fetch returned HTTP {status}"
            )));
        }
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| OidcError::Provider(format!("unparsable key set: {e}")))
    }
}

#[async_trait]
impl IdpClient for RealmClient {
    fn authorization_url(&self, callback_url: &Url, scope: &str, state: &str) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", callback_url.as_str())
            .append_pair("scope", scope)
            .append_pair("state", state);
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        callback_url: &Url,
    ) -> Result<TokenBundle, OidcError> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", callback_url.as_str()),
                ("client_id", &self.client_id),
            ])
            .await?;
        match response.status() {
            status if status.is_success() => parse_token_bundle(response).await,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                warn!("provider rejected the authorization code");
                Err(OidcError::ExchangeRejected)
            }
            status => Err(provider_error("code exchange", status, response).await),
        }
    }

    async fn decode_token(&self, access_token: &str) -> Result<IdentityClaims, OidcError> {
        // Classify expiry before any other check so an expired token is
        // always reported as expired, even when it would also fail
        // signature or claim validation.
        let mut unverified = Validation::new(Algorithm::RS256);
        unverified.insecure_disable_signature_validation();
        unverified.validate_aud = false;
        if let Err(e) = decode::<RawClaims>(
            access_token,
            &DecodingKey::from_secret(&[]),
            &unverified,
        ) {
            if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                return Err(OidcError::TokenExpired);
            }
        }

        let header = decode_header(access_token)
            .map_err(|e| OidcError::TokenInvalid(format!("malformed token header: {e}")))?;
        let keys = self.fetch_signing_keys().await?;
        let jwk = keys.signing_key(header.kid.as_deref()).ok_or_else(|| {
            OidcError::TokenInvalid("no matching signing key in the realm key set".to_string())
        })?;
        let decoding_key = jwk.decoding_key()?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        let data = decode::<RawClaims>(access_token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => OidcError::TokenExpired,
                _ => OidcError::TokenInvalid(e.to_string()),
            }
        })?;

        let expires_at = DateTime::from_timestamp(data.claims.exp, 0)
            .ok_or_else(|| OidcError::TokenInvalid("exp claim out of range".to_string()))?;
        Ok(IdentityClaims {
            subject: data.claims.sub,
            preferred_username: data.claims.preferred_username,
            email: data.claims.email,
            expires_at,
        })
    }

    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenBundle, OidcError> {
        let response = self
            .token_request(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
                ("client_id", &self.client_id),
            ])
            .await?;
        match response.status() {
            status if status.is_success() => parse_token_bundle(response).await,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                warn!("provider rejected credentials for user '{username}'");
                Err(OidcError::InvalidCredentials)
            }
            status => Err(provider_error("password grant", status, response).await),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, OidcError> {
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
            ])
            .await?;
        match response.status() {
            status if status.is_success() => parse_token_bundle(response).await,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                warn!("provider rejected a refresh token");
                Err(OidcError::InvalidRefreshToken)
            }
            status => Err(provider_error("token refresh", status, response).await),
        }
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), OidcError> {
        let response = self
            .client
            .post(self.logout_url.clone())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                warn!("provider rejected a refresh token on logout");
                Err(OidcError::InvalidRefreshToken)
            }
            status => Err(provider_error("logout", status, response).await),
        }
    }
}

/// Build a `realms/{realm}/protocol/openid-connect/{leaf}` endpoint URL
fn realm_endpoint(server_url: &Url, realm: &str, leaf: &str) -> Result<Url, OidcError> {
    let base = server_url.as_str().trim_end_matches('/');
    Url::parse(&format!(
        "{base}/realms/{realm}/protocol/openid-connect/{leaf}"
    ))
    .map_err(|e| OidcError::Config(format!("invalid endpoint for realm '{realm}': {e}")))
}

async fn parse_token_bundle(response: Response) -> Result<TokenBundle, OidcError> {
    response
        .json::<TokenBundle>()
        .await
        .map_err(|e| OidcError::Provider(format!("unparsable token response: {e}")))
}

/// Log the provider failure in full, return an error that carries none of it
async fn provider_error(operation: &str, status: StatusCode, response: Response) -> OidcError {
    let body = response.text().await.unwrap_or_default();
    error!("{operation} failed with HTTP {status}: {body}");
    OidcError::Provider(format!("{operation} returned HTTP {status}"))
}

/// Access token payload as issued by the provider
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    preferred_username: String,
    #[serde(default)]
    email: String,
    exp: i64,
}

/// Published key set of the realm
#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

impl JwkSet {
    /// Prefer the key the token names via `kid`; otherwise fall back to the
    /// first RSA key the realm publishes.
    fn signing_key(&self, kid: Option<&str>) -> Option<&Jwk> {
        match kid {
            Some(kid) => self.keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
            None => None,
        }
        .or_else(|| self.keys.iter().find(|k| k.kty == "RSA"))
    }
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl Jwk {
    fn decoding_key(&self) -> Result<DecodingKey, OidcError> {
        match (self.n.as_deref(), self.e.as_deref()) {
            (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e)
                .map_err(|err| OidcError::TokenInvalid(format!("unusable signing key: {err}"))),
            _ => Err(OidcError::TokenInvalid(
                "signing key is missing RSA components".to_string(),
            )),
        }
    }
}
