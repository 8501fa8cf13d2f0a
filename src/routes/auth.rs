//! Authentication endpoints: register, login, refresh, logout, profile.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::db::{self, User, UserView};
use crate::error::{AppError, AppResult};
use crate::routes::extractors::AuthenticatedUser;
use crate::services::user::RegisterInput;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserView,
}

fn token_pair(ctx: &AppContext, user: &User) -> AppResult<AuthResponse> {
    let (access_token, _) = ctx.auth.issue_access(&user.id, &user.email, &user.role)?;
    let (refresh_token, _) = ctx.auth.issue_refresh(&user.id, &user.email, &user.role)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: UserView::from(user.clone()),
    })
}

/// POST /api/auth/register
pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(input): Json<RegisterInput>,
) -> Result<impl IntoResponse, AppError> {
    let user = ctx.users.register(input).await?;
    let response = token_pair(&ctx, &user)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login
pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(input): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = ctx.users.authenticate(&input.email, &input.password).await?;
    let response = token_pair(&ctx, &user)?;
    Ok(Json(response))
}

/// POST /api/auth/refresh
///
/// Rotates the refresh token: the presented token is denylisted once the
/// new pair is issued, so each refresh token works exactly once.
pub async fn refresh(
    State(ctx): State<Arc<AppContext>>,
    Json(input): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    if ctx.denylist.is_blacklisted(&input.refresh_token).await? {
        return Err(AppError::auth("refresh token was revoked"));
    }

    let claims = ctx.auth.verify_refresh(&input.refresh_token)?;
    if ctx
        .denylist
        .is_user_blacklisted_at(&claims.sub, claims.iat * 1000)
        .await?
    {
        return Err(AppError::auth("refresh token was revoked"));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::auth("invalid subject claim"))?;
    let user = db::get_user_by_id(&ctx.pool, &user_id)
        .await?
        .ok_or_else(|| AppError::auth("unknown user"))?;
    if !user.is_active {
        return Err(AppError::forbidden("account is deactivated"));
    }

    let response = token_pair(&ctx, &user)?;

    if let Err(e) = ctx.denylist.blacklist_token(&input.refresh_token).await {
        tracing::warn!(jti = %claims.jti, error = %e, "failed to denylist rotated refresh token");
    }

    tracing::info!(user_id = %user.id, jti = %claims.jti, "refresh token rotated");
    Ok(Json(response))
}

/// POST /api/auth/logout
pub async fn logout(
    State(ctx): State<Arc<AppContext>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    ctx.denylist.blacklist_token(&input.refresh_token).await?;

    tracing::info!(user_id = %user.id, "logged out");
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /api/auth/profile
pub async fn profile(
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(UserView::from(user)))
}
