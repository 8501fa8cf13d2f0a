//! Room, membership, and room-scoped message endpoints.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::db::RoomRole;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;
use crate::services::room::{CreateRoomInput, UpdateRoomInput};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Millisecond timestamp; returns messages strictly older than it
    pub cursor: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub body: String,
}

/// POST /api/rooms
pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateRoomInput>,
) -> Result<impl IntoResponse, AppError> {
    let room = ctx.rooms.create(input, &user.id).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/rooms
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let rooms = ctx
        .rooms
        .list_for_user(&user.id, query.page, query.limit)
        .await?;
    Ok(Json(rooms))
}

/// GET /api/rooms/:room_id
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let room = ctx.rooms.get_for_member(&room_id, &user.id).await?;
    Ok(Json(room))
}

/// PATCH /api/rooms/:room_id
pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<Uuid>,
    Json(input): Json<UpdateRoomInput>,
) -> Result<impl IntoResponse, AppError> {
    let room = ctx.rooms.update(&room_id, input, &user.id).await?;
    Ok(Json(room))
}

/// POST /api/rooms/:room_id/members
pub async fn add_member(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<Uuid>,
    Json(input): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    ctx.rooms.add_member(&room_id, &input.user_id, &user.id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok" }))))
}

/// DELETE /api/rooms/:room_id/members/:user_id
pub async fn remove_member(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((room_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    ctx.rooms.remove_member(&room_id, &member_id, &user.id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// PATCH /api/rooms/:room_id/members/:user_id/role
pub async fn set_member_role(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((room_id, member_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<MemberRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = RoomRole::from_db(&input.role)
        .ok_or_else(|| AppError::validation("role must be owner, moderator, or member"))?;
    ctx.rooms
        .update_member_role(&room_id, &member_id, role, &user.id)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /api/rooms/:room_id/members
pub async fn members(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let members = ctx.rooms.members(&room_id, &user.id).await?;
    Ok(Json(members))
}

/// POST /api/rooms/:room_id/messages
pub async fn post_message(
    State(ctx): State<Arc<AppContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<Uuid>,
    Json(input): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip = addr.ip().to_string();
    let message = ctx
        .messages
        .send(&room_id, &input.body, &user.id, Some(&ip))
        .await?;
    ctx.gateway.emit_message_created(room_id, message.clone()).await;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/rooms/:room_id/messages
pub async fn list_messages(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let history = ctx
        .messages
        .list(&room_id, query.page, query.limit, query.cursor, &user.id)
        .await?;
    Ok(Json(history))
}
