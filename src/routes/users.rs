//! Self-profile and admin user management endpoints.

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
use crate::db::UserView;
use crate::error::AppError;
use crate::routes::extractors::{AdminUser, AuthenticatedUser};
use crate::services::user::UpdateProfileInput;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRoleRequest {
    pub role: String,
}

/// GET /api/users/me
pub async fn get_me(
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(UserView::from(user)))
}

/// PATCH /api/users/me
pub async fn patch_me(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<UpdateProfileInput>,
) -> Result<impl IntoResponse, AppError> {
    let updated = ctx.users.update_profile(&user.id, input).await?;
    Ok(Json(UserView::from(updated)))
}

/// GET /api/users/:user_id (admin)
pub async fn get_user(
    State(ctx): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = ctx.users.get(&user_id).await?;
    Ok(Json(UserView::from(user)))
}

/// PATCH /api/users/:user_id (admin)
pub async fn patch_user(
    State(ctx): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateProfileInput>,
) -> Result<impl IntoResponse, AppError> {
    let updated = ctx.users.update_profile(&user_id, input).await?;
    Ok(Json(UserView::from(updated)))
}

/// DELETE /api/users/:user_id (admin)
pub async fn delete_user(
    State(ctx): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ctx.users.delete(&user_id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// PATCH /api/users/:user_id/role (admin)
pub async fn set_role(
    State(ctx): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = ctx.users.set_role(&user_id, &input.role).await?;
    Ok(Json(UserView::from(updated)))
}

/// PATCH /api/users/:user_id/activate (admin)
pub async fn activate(
    State(ctx): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let updated = ctx.users.set_active(&user_id, true).await?;
    Ok(Json(UserView::from(updated)))
}

/// PATCH /api/users/:user_id/deactivate (admin)
///
/// Also cuts off every token the user currently holds.
pub async fn deactivate(
    State(ctx): State<Arc<AppContext>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let updated = ctx.users.set_active(&user_id, false).await?;
    ctx.denylist.blacklist_user(&user_id.to_string()).await?;
    Ok(Json(UserView::from(updated)))
}
