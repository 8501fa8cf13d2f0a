//! Router assembly for the REST surface and the realtime socket.

mod auth;
mod extractors;
mod messages;
mod rooms;
mod users;

use axum::{
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub fn create_router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx);

    let api = Router::new()
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::profile))
        // Users
        .route("/users/me", get(users::get_me).patch(users::patch_me))
        .route(
            "/users/:user_id",
            get(users::get_user)
                .patch(users::patch_user)
                .delete(users::delete_user),
        )
        .route("/users/:user_id/role", patch(users::set_role))
        .route("/users/:user_id/activate", patch(users::activate))
        .route("/users/:user_id/deactivate", patch(users::deactivate))
        // Rooms and memberships
        .route("/rooms", post(rooms::create).get(rooms::list))
        .route("/rooms/:room_id", get(rooms::get).patch(rooms::update))
        .route(
            "/rooms/:room_id/members",
            post(rooms::add_member).get(rooms::members),
        )
        .route(
            "/rooms/:room_id/members/:user_id",
            delete(rooms::remove_member),
        )
        .route(
            "/rooms/:room_id/members/:user_id/role",
            patch(rooms::set_member_role),
        )
        // Messages
        .route(
            "/rooms/:room_id/messages",
            post(rooms::post_message).get(rooms::list_messages),
        )
        .route(
            "/messages/:message_id",
            get(messages::get)
                .patch(messages::update)
                .delete(messages::remove),
        );

    Router::new()
        .route("/health", get(health))
        .route("/chat", get(chat_ws))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .into_inner(),
        )
        .with_state(ctx)
}

fn cors_layer(ctx: &AppContext) -> CorsLayer {
    if ctx.config.cors_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = ctx
        .config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// GET /health: connectivity of the store and the database.
async fn health(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let store_ok = ctx.store.clone().ping().await.is_ok();
    let db_ok = sqlx::query("SELECT 1").execute(&ctx.pool).await.is_ok();

    let healthy = store_ok && db_ok;
    let body = Json(json!({
        "status": if healthy { "ok" } else { "degraded" },
        "store": store_ok,
        "database": db_ok,
    }));

    if healthy {
        body.into_response()
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

/// GET /chat: authenticated WebSocket upgrade.
async fn chat_ws(
    State(ctx): State<Arc<AppContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let gateway = Arc::clone(&ctx.gateway);
    let ip = addr.ip().to_string();

    match gateway.authorize_connection(&headers, &query, &ip).await {
        Ok(user) => ws
            .on_upgrade(move |socket| gateway.handle_socket(socket, user, ip))
            .into_response(),
        Err(e) => e.into_response(),
    }
}
