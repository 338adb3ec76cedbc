//! Direct token operations for API-style clients: password grant, refresh
//! and logout. Every operation is brokered to the provider; nothing is
//! cached or stored locally.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use http::StatusCode;
use log::{error, warn};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::ApiError;
use crate::oidc::{OidcError, TokenBundle};
use crate::openapi::TOKEN_TAG;
use crate::state::AppState;

/// Creates a router for the token endpoints
pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(issue_token))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
}

/// Decode `base64(username:password)` Basic credentials.
///
/// Returns None unless the payload decodes to exactly two colon-separated
/// parts.
fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ").unwrap_or(header);
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let mut parts = decoded.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(username), Some(password), None) => {
            Some((username.to_string(), password.to_string()))
        }
        _ => None,
    }
}

/// Issue a token bundle from Basic credentials carried in the Authorization
/// header. Credentials are relayed to the provider once and never stored.
#[utoipa::path(
    post,
    path = "/auth/token",
    tag = TOKEN_TAG,
    responses(
        (status = 200, description = "Token bundle issued by the provider", body = TokenBundle),
        (status = 400, description = "Missing or malformed Authorization header"),
        (status = 401, description = "Provider rejected the credentials"),
        (status = 500, description = "Provider failure")
    )
)]
async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let header = match headers
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        Some(header) => header,
        None => {
            return Err(ApiError::bad_request(
                "Request did not contain the Authorization header",
            ));
        }
    };

    let (username, password) = match parse_basic_credentials(header) {
        Some(credentials) => credentials,
        None => {
            warn!("token request with undecodable Basic credentials");
            return Err(ApiError::bad_request(
                "The Authorization header is incorrect. This endpoint requires Basic Authorization",
            ));
        }
    };

    match state.idp.password_grant(&username, &password).await {
        Ok(tokens) => Ok(Json(tokens).into_response()),
        Err(OidcError::InvalidCredentials) => {
            Err(ApiError::unauthorized("User credentials are invalid"))
        }
        Err(e) => {
            error!("password grant failed: {e}");
            Err(ApiError::internal(
                "Unable to request auth token from OIDC provider",
            ))
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub(crate) struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

impl RefreshRequest {
    /// The refresh token, if the body carried a non-empty one
    fn token(self) -> Option<String> {
        self.refresh_token.filter(|token| !token.is_empty())
    }
}

/// Trade a refresh token for a fresh bundle
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = TOKEN_TAG,
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh token bundle", body = TokenBundle),
        (status = 400, description = "Missing or invalid refresh token"),
        (status = 500, description = "Provider failure")
    )
)]
async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    let refresh = match body.token() {
        Some(refresh) => refresh,
        None => return Err(ApiError::bad_request("No refresh token in body")),
    };

    match state.idp.refresh(&refresh).await {
        Ok(tokens) => Ok(Json(tokens).into_response()),
        Err(OidcError::InvalidRefreshToken) => {
            Err(ApiError::bad_request("Invalid refresh token"))
        }
        Err(e) => {
            error!("token refresh failed: {e}");
            Err(ApiError::internal("Unable to refresh the user token"))
        }
    }
}

/// Revoke the session behind a refresh token. The local user record is
/// untouched; only the provider-side session ends.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = TOKEN_TAG,
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Session revoked"),
        (status = 400, description = "Missing or invalid refresh token"),
        (status = 500, description = "Provider failure")
    )
)]
async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    let refresh = match body.token() {
        Some(refresh) => refresh,
        None => return Err(ApiError::bad_request("No refresh token in body")),
    };

    match state.idp.revoke(&refresh).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(OidcError::InvalidRefreshToken) => {
            Err(ApiError::bad_request("Invalid refresh token"))
        }
        Err(e) => {
            error!("logout failed: {e}");
            Err(ApiError::internal("Unable to logout"))
        }
    }
}
