use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use axum_extra::typed_header::TypedHeaderRejection;
use jsonwebtoken::{DecodingKey, Validation, decode};

use courier_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer JWT, stashing the claims in request
/// extensions for the handlers behind this middleware. A missing header
/// and a malformed one (wrong scheme, unparsable value) are the same 401
/// in the standard envelope.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(auth) = bearer.map_err(|_| ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, auth.token())?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Shared between the REST middleware and the gateway upgrade handler.
pub(crate) fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    Ok(token_data.claims)
}
