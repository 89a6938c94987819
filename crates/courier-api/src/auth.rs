use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use courier_db::Database;
use courier_gateway::dispatcher::Dispatcher;
use courier_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest};
use courier_types::models::{PublicUser, now_micros, rfc3339_micros};

use crate::error::{ApiError, join_error};
use crate::extract::ApiJson;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("a valid email is required".into()));
    }
    let display_name = req.display_name.trim().to_string();
    if display_name.is_empty() || display_name.len() > 64 {
        return Err(ApiError::Validation(
            "display name must be 1-64 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let user_id = Uuid::new_v4();
    let now = now_micros();
    let bio = req
        .bio
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    // Argon2 hashing is CPU-heavy; run it and the insert off the runtime.
    let created = {
        let db = state.clone();
        let email = email.clone();
        let display_name = display_name.clone();
        let bio = bio.clone();
        let password = req.password;
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
                .to_string();

            db.db.create_user(
                &user_id.to_string(),
                &email,
                &display_name,
                &password_hash,
                bio.as_deref(),
                &rfc3339_micros(now),
            )
        })
        .await
        .map_err(join_error)??
    };

    if !created {
        return Err(ApiError::Conflict(
            "an account with this email already exists".into(),
        ));
    }

    let token = create_token(&state.jwt_secret, user_id, &email)?;

    let user = PublicUser {
        id: user_id,
        email,
        display_name,
        avatar_url: None,
        bio,
        created_at: now,
        updated_at: now,
    };

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let password = req.password;

    // A missing account and a wrong password are indistinguishable to the
    // caller. Verification runs off the runtime like hashing does.
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || {
        let Some(row) = db.db.get_user_by_email(&email)? else {
            return Ok(None);
        };

        let parsed_hash = PasswordHash::new(&row.password)
            .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {e}"))?;

        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Ok(None);
        }

        Ok::<_, anyhow::Error>(Some(row))
    })
    .await
    .map_err(join_error)??
    .ok_or(ApiError::Unauthorized)?;

    let user = row.into_public()?;
    let token = create_token(&state.jwt_secret, user.id, &user.email)?;

    Ok(Json(AuthResponse { token, user }))
}

/// Resolve the bearer token back to the current directory entry.
pub async fn check(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || db.db.get_user_by_id(&claims.sub.to_string()))
        .await
        .map_err(join_error)??
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(row.into_public()?))
}

fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
