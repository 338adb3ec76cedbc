//! Browser-based authorization-code flow endpoints.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use log::{debug, error, warn};
use rand::Rng;
use serde::Deserialize;

use crate::errors::ApiError;
use crate::identity::IdentityReconciler;
use crate::oidc::{OidcError, OPENID_SCOPE};
use crate::openapi::AUTH_FLOW_TAG;
use crate::state::AppState;

/// Creates a router for the sign-in flow endpoints
pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(sign_in))
        .route("/auth/callback", get(callback))
}

/// Generate a fresh random `state` value for one flow initiation
fn new_state_value() -> String {
    // 32 random bytes (256 bits), base64url-encoded
    let mut rng = rand::thread_rng();
    let state_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Initiate the sign-in (or sign-up) flow by redirecting the browser to the
/// identity provider's authorization endpoint.
#[utoipa::path(
    get,
    path = "/auth",
    tag = AUTH_FLOW_TAG,
    responses(
        (status = 303, description = "Redirect to the identity provider sign-in page")
    )
)]
async fn sign_in(State(state): State<AppState>) -> Response {
    let flow_state = new_state_value();
    state.flow_states.insert(flow_state.clone()).await;

    let url = state
        .idp
        .authorization_url(&state.callback_url, OPENID_SCOPE, &flow_state);
    debug!(
        "redirecting sign-in to provider host {}",
        url.host_str().unwrap_or("<unknown>")
    );
    Redirect::to(url.as_str()).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

/// Callback leg of the flow: exchange the authorization code, validate the
/// resulting token and reconcile the identity with the local user records.
///
/// A callback without a `code` parameter is a no-op redirect, not an error.
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = AUTH_FLOW_TAG,
    params(
        ("code" = Option<String>, Query, description = "Authorization code returned by the provider"),
        ("state" = Option<String>, Query, description = "State value issued at initiation")
    ),
    responses(
        (status = 303, description = "Redirect to the post-auth page"),
        (status = 400, description = "Provider rejected the code, or the state value is unknown"),
        (status = 401, description = "Exchanged token already expired")
    )
)]
async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let code = match params.code {
        Some(code) => code,
        None => {
            // Provider round-tripped without a code (e.g. user cancelled)
            return Ok(
                Redirect::to(&state.settings.auth.post_auth_redirect_url).into_response(),
            );
        }
    };

    if state.settings.auth.verify_state {
        let presented = params.state.as_deref().unwrap_or_default();
        if presented.is_empty() || !state.flow_states.take(presented).await {
            warn!("callback presented an unknown, reused or expired state value");
            return Err(ApiError::bad_request("Invalid state parameter"));
        }
    }

    let tokens = match state.idp.exchange_code(&code, &state.callback_url).await {
        Ok(tokens) => tokens,
        Err(OidcError::ExchangeRejected) => {
            return Err(ApiError::bad_request("Invalid token call"));
        }
        Err(e) => {
            error!("code exchange failed: {e}");
            return Err(ApiError::internal("Unable to complete the sign-in flow"));
        }
    };

    let claims = match state.idp.decode_token(&tokens.access_token).await {
        Ok(claims) => claims,
        Err(OidcError::TokenExpired) => {
            return Err(ApiError::unauthorized("Token expired"));
        }
        Err(e) => {
            error!("token validation failed after exchange: {e}");
            return Err(ApiError::internal("Unable to complete the sign-in flow"));
        }
    };
    debug!(
        "exchanged code for '{}', token valid until {}",
        claims.preferred_username, claims.expires_at
    );

    let reconciler = IdentityReconciler::new(state.users.clone());
    if let Err(e) = reconciler.resolve_or_create(&claims).await {
        error!("user provisioning failed for '{}': {e}", claims.preferred_username);
        return Err(ApiError::internal("Unable to complete the sign-in flow"));
    }

    Ok(Redirect::to(&state.settings.auth.post_auth_redirect_url).into_response())
}
