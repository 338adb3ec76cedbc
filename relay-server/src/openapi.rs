use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const AUTH_FLOW_TAG: &str = "Sign-in Flow API";
pub(crate) const TOKEN_TAG: &str = "Token API";
pub(crate) const IDENTITY_TAG: &str = "Identity API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = AUTH_FLOW_TAG, description = "Browser-based authorization-code flow endpoints"),
        (name = TOKEN_TAG, description = "Direct token grant, refresh and logout endpoints"),
        (name = IDENTITY_TAG, description = "Endpoints for the authenticated identity"),
    ),
    info(
        title = "OIDC Relay API",
        description = "OpenID Connect relying-party adapter",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
