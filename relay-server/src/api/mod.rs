pub(crate) mod auth_flow;
pub(crate) mod bearer;
pub(crate) mod health;
pub(crate) mod token;

use axum::{extract::Extension, middleware, response::IntoResponse, routing::get, Json, Router};

use crate::api::bearer::{bearer_authentication_middleware, CurrentUser};
use crate::openapi::IDENTITY_TAG;
use crate::state::AppState;
use crate::users::LocalUser;

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth_flow::router())
        .merge(token::router())
        .merge(protected_routes(state))
}

/// Creates a router for protected routes that require bearer authentication
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_authentication_middleware,
        ))
}

/// Return the authenticated local identity
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = IDENTITY_TAG,
    responses(
        (status = 200, description = "The authenticated user", body = LocalUser),
        (status = 401, description = "Missing, expired or unresolvable bearer token")
    )
)]
async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(user)
}
