use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use courier_gateway::delivery;
use courier_types::api::{Claims, MarkReadResponse, SendMessageRequest};
use courier_types::models::{Message, now_micros, rfc3339_micros};

use crate::auth::AppState;
use crate::error::{ApiError, join_error};
use crate::extract::{ApiJson, ApiQuery};

/// Hard cap on a single page, matching what a client can sensibly render.
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    /// Newest messages to return; omitted means the full history.
    pub limit: Option<u32>,
    /// Cursor-based pagination: pass the `created_at` of the oldest message
    /// from the previous page to fetch older messages.
    pub before: Option<String>,
}

/// Full (or windowed) history with the other user, oldest first. Opening a
/// conversation is what clears its unseen badge: every message from the
/// other side flips to seen as part of the same fetch.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
    ApiQuery(query): ApiQuery<ConversationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if other_id == claims.sub {
        return Err(ApiError::Validation(
            "cannot open a conversation with yourself".into(),
        ));
    }

    // Stored timestamps compare as raw strings, so the cursor must be
    // re-encoded to the same fixed-width form before it is bound. A
    // shorter fractional part would sort below every value in its own
    // second and leak newer messages into the page.
    let before = query
        .before
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| rfc3339_micros(t.with_timezone(&Utc)))
                .map_err(|_| ApiError::Validation("malformed `before` cursor".into()))
        })
        .transpose()?;

    let db = state.clone();
    let me = claims.sub.to_string();
    let other = other_id.to_string();
    let limit = query.limit.map(|l| l.min(MAX_LIMIT));

    let rows = tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_id(&other)?.is_none() {
            return Ok(None);
        }
        let rows = db
            .db
            .fetch_conversation_marking_seen(&me, &other, limit, before.as_deref())?;
        Ok::<_, anyhow::Error>(Some(rows))
    })
    .await
    .map_err(join_error)??
    .ok_or_else(|| ApiError::NotFound("no such user".into()))?;

    let messages = rows
        .into_iter()
        .map(|row| row.into_message())
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(messages))
}

/// Explicit bulk seen transition, for a client that has the conversation
/// open when a push arrives and wants to flip the flag without refetching.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if other_id == claims.sub {
        return Err(ApiError::Validation(
            "cannot mark a conversation with yourself".into(),
        ));
    }

    let db = state.clone();
    let me = claims.sub.to_string();
    let other = other_id.to_string();

    let marked = tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_id(&other)?.is_none() {
            return Ok(None);
        }
        let marked = db.db.mark_conversation_seen(&other, &me)?;
        Ok::<_, anyhow::Error>(Some(marked))
    })
    .await
    .map_err(join_error)??
    .ok_or_else(|| ApiError::NotFound("no such user".into()))?;

    Ok(Json(MarkReadResponse { marked }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if other_id == claims.sub {
        return Err(ApiError::Validation(
            "cannot send a message to yourself".into(),
        ));
    }

    // Empty strings count as absent; a message needs some content.
    let body = req
        .body
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let image_url = req
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    if body.is_none() && image_url.is_none() {
        return Err(ApiError::Validation(
            "message body or image required".into(),
        ));
    }

    let message = Message {
        id: Uuid::new_v4(),
        sender_id: claims.sub,
        receiver_id: other_id,
        body,
        image_url,
        seen: false,
        created_at: now_micros(),
    };

    // Persist first. Only a stored message is ever pushed.
    let db = state.clone();
    let stored = message.clone();
    let receiver_known = tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_id(&stored.receiver_id.to_string())?.is_none() {
            return Ok(false);
        }
        db.db.insert_message(
            &stored.id.to_string(),
            &stored.sender_id.to_string(),
            &stored.receiver_id.to_string(),
            stored.body.as_deref(),
            stored.image_url.as_deref(),
            &rfc3339_micros(stored.created_at),
        )?;
        Ok::<_, anyhow::Error>(true)
    })
    .await
    .map_err(join_error)??;

    if !receiver_known {
        return Err(ApiError::NotFound("no such recipient".into()));
    }

    // Push to the receiver's live connection, if any. Best-effort: the
    // message is already durable either way.
    delivery::push_new_message(&state.dispatcher, &message).await;

    Ok((StatusCode::CREATED, Json(message)))
}
