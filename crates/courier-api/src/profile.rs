use axum::{Extension, Json, extract::State, response::IntoResponse};

use courier_types::api::{Claims, UpdateProfileRequest};
use courier_types::models::{now_micros, rfc3339_micros};

use crate::auth::AppState;
use crate::error::{ApiError, join_error};
use crate::extract::ApiJson;

/// Patch the caller's profile. Absent fields keep their stored value; the
/// updated record comes back so clients can refresh in place.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let display_name = match req.display_name.as_deref().map(str::trim) {
        Some("") => {
            return Err(ApiError::Validation("display name cannot be empty".into()));
        }
        Some(name) if name.len() > 64 => {
            return Err(ApiError::Validation(
                "display name must be 1-64 characters".into(),
            ));
        }
        other => other.map(String::from),
    };

    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || {
        db.db.update_profile(
            &claims.sub.to_string(),
            display_name.as_deref(),
            req.bio.as_deref(),
            req.avatar_url.as_deref(),
            &rfc3339_micros(now_micros()),
        )
    })
    .await
    .map_err(join_error)??
    .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(row.into_public()?))
}
