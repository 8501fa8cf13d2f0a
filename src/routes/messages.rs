//! Direct message endpoints: read, edit, soft-delete.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageRequest {
    pub body: String,
}

/// GET /api/messages/:message_id
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let message = ctx.messages.get(&message_id, &user.id).await?;
    Ok(Json(message))
}

/// PATCH /api/messages/:message_id (sender only)
pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(message_id): Path<Uuid>,
    Json(input): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = ctx.messages.update(&message_id, &input.body, &user.id).await?;
    ctx.gateway
        .emit_message_updated(message.room_id, message.clone())
        .await;
    Ok(Json(message))
}

/// DELETE /api/messages/:message_id (sender only)
pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let room_id = ctx.messages.delete(&message_id, &user.id).await?;
    ctx.gateway.emit_message_deleted(room_id, message_id).await;
    Ok(Json(json!({ "status": "ok" })))
}
