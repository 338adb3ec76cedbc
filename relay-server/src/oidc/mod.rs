//! Contract and wire models for the external OIDC identity provider.
//!
//! The relay never issues or signs tokens itself; every token operation is
//! brokered to the provider through the [`IdpClient`] contract. The single
//! concrete implementation lives in [`realm`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

pub mod realm;

/// Scope requested for every authorization-code flow
pub const OPENID_SCOPE: &str = "openid";

/// Errors that can occur during identity provider operations
#[derive(Debug, Error)]
pub enum OidcError {
    #[error("HTTP request to the provider failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected the authorization code")]
    ExchangeRejected,
    #[error("token expired")]
    TokenExpired,
    #[error("token validation failed: {0}")]
    TokenInvalid(String),
    #[error("provider rejected the user credentials")]
    InvalidCredentials,
    #[error("provider rejected the refresh token")]
    InvalidRefreshToken,
    #[error("unexpected provider response: {0}")]
    Provider(String),
    #[error("provider configuration error: {0}")]
    Config(String),
}

/// Token material returned by the provider.
///
/// The bundle is passed through to callers verbatim; only `access_token` is
/// ever inspected locally. Provider fields beyond the ones named here are
/// forwarded untouched via `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenBundle {
    /// Bearer token for authenticated requests
    pub access_token: String,
    /// Token used to obtain fresh bundles (absent for some grants)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type, "Bearer" for this provider
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Remaining provider fields, forwarded as-is
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verified claims decoded from a provider access token.
///
/// Only ever produced by [`IdpClient::decode_token`]; never constructed from
/// unvalidated input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Stable provider-assigned identifier (`sub`)
    pub subject: String,
    /// Username, unique per realm (`preferred_username`)
    pub preferred_username: String,
    /// Email address; empty when the provider supplies none
    pub email: String,
    /// Token expiry (`exp`)
    pub expires_at: DateTime<Utc>,
}

/// Client contract for the external identity provider.
///
/// All operations except [`authorization_url`](IdpClient::authorization_url)
/// perform network I/O and may suspend for arbitrary time; callers must not
/// hold locks across them. No retries are performed: provider failures
/// surface immediately.
#[async_trait]
pub trait IdpClient: Send + Sync {
    /// Build the redirect target for the authorization-code flow.
    ///
    /// The callback URL is forwarded as-is; a mismatch with the URI
    /// registered at the provider only surfaces as a provider-side error
    /// after the redirect.
    fn authorization_url(&self, callback_url: &Url, scope: &str, state: &str) -> Url;

    /// Exchange an authorization code for a token bundle.
    ///
    /// Fails with [`OidcError::ExchangeRejected`] when the provider refuses
    /// the code (expired, reused, or redirect mismatch).
    async fn exchange_code(&self, code: &str, callback_url: &Url)
        -> Result<TokenBundle, OidcError>;

    /// Validate an access token against the realm's published keys and
    /// return its claims.
    ///
    /// An expired token fails with [`OidcError::TokenExpired`] even when it
    /// would also fail other validation; every other failure is
    /// [`OidcError::TokenInvalid`].
    async fn decode_token(&self, access_token: &str) -> Result<IdentityClaims, OidcError>;

    /// Obtain a token bundle directly from user credentials.
    ///
    /// Fails with [`OidcError::InvalidCredentials`] when the provider
    /// rejects them.
    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenBundle, OidcError>;

    /// Trade a refresh token for a fresh bundle.
    ///
    /// Fails with [`OidcError::InvalidRefreshToken`] when the provider
    /// rejects the token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, OidcError>;

    /// Revoke the session behind a refresh token (provider-side logout).
    async fn revoke(&self, refresh_token: &str) -> Result<(), OidcError>;
}
