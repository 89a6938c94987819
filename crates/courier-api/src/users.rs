use std::collections::HashMap;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::warn;
use uuid::Uuid;

use courier_types::api::{Claims, UserListResponse};

use crate::auth::AppState;
use crate::error::{ApiError, join_error};

/// Directory of every other user, with the caller's unseen-message counts
/// keyed by sender id so the sidebar can badge conversations.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let me = claims.sub.to_string();

    let (rows, counts) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_users_except(&me)?;
        let counts = db.db.unseen_counts(&me)?;
        Ok::<_, anyhow::Error>((rows, counts))
    })
    .await
    .map_err(join_error)??;

    let users = rows
        .into_iter()
        .map(|row| row.into_public())
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut unseen_counts = HashMap::new();
    for (sender_id, count) in counts {
        match sender_id.parse::<Uuid>() {
            Ok(id) => {
                unseen_counts.insert(id, count);
            }
            Err(e) => warn!("corrupt sender id '{}' in unseen counts: {}", sender_id, e),
        }
    }

    Ok(Json(UserListResponse {
        users,
        unseen_counts,
    }))
}
