use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use courier_gateway::connection;

use crate::auth::{self, AppState};
use crate::conversations;
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::middleware::{decode_token, require_auth};
use crate::profile;
use crate::users;

/// Assembles the full application router: public auth routes, protected
/// REST routes behind the JWT middleware, and the gateway upgrade.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/check", get(auth::check))
        .route("/profile", put(profile::update_profile))
        .route("/users", get(users::list_users))
        .route(
            "/conversations/{other_id}",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/{other_id}/mark-read",
            put(conversations::mark_read),
        )
        .route(
            "/conversations/{other_id}/messages",
            post(conversations::send_message),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(gateway_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    token: Option<String>,
}

/// The WebSocket handshake carries the JWT as a query parameter, since
/// browser WebSocket clients cannot set request headers. A bad token is
/// rejected with 401 here, before any presence registration happens.
async fn gateway_upgrade(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = params.token.ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, &token)?;

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), claims.sub)
    }))
}
