//! Bearer token guard for protected routes.
//!
//! Validates the presented access token against the identity provider and
//! resolves it to an existing local user. The guard never provisions users:
//! an identity only exists locally after it has completed the sign-in flow
//! at least once.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use log::{debug, error, warn};

use crate::errors::ApiError;
use crate::identity::{IdentityError, IdentityReconciler};
use crate::oidc::OidcError;
use crate::state::AppState;
use crate::users::LocalUser;

/// The authenticated user, attached to request extensions for downstream
/// handlers.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub LocalUser);

pub(crate) async fn bearer_authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // Extract the token from the authorization header
    let token = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| {
            if value.to_lowercase().starts_with("bearer ") {
                // Remove the "Bearer " prefix
                Some(value[7..].to_string())
            } else {
                None
            }
        });

    let token = match token {
        Some(token) => token,
        None => {
            warn!("Attempt to access protected resource without a bearer token");
            return Err(ApiError::unauthorized("No Bearer token in request"));
        }
    };

    let claims = match state.idp.decode_token(&token).await {
        Ok(claims) => claims,
        Err(OidcError::TokenExpired) => {
            return Err(ApiError::unauthorized("Token expired"));
        }
        Err(e) => {
            debug!("bearer token rejected: {e}");
            return Err(ApiError::unauthorized("Invalid token"));
        }
    };

    let reconciler = IdentityReconciler::new(state.users.clone());
    let user = match reconciler.resolve_existing(&claims).await {
        Ok(user) => user,
        Err(IdentityError::UserNotFound(_)) => {
            return Err(ApiError::unauthorized("User does not exist"));
        }
        Err(e) => {
            error!("user lookup failed during bearer authentication: {e}");
            return Err(ApiError::internal("Unable to authenticate the request"));
        }
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
