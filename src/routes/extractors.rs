//! Custom extractors populating the authenticated principal.
//!
//! The principal is an explicit handler argument: the extractor validates
//! the bearer token against signature, denylist, and per-user cutoff,
//! applies the per-user API rate limit, and loads the live user row.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::db::{self, User};
use crate::error::AppError;
use crate::rate_limit::RateLimitKind;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The authenticated caller, admins only.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::auth("missing bearer token"))?
            .to_string();

        if state.denylist.is_blacklisted(&token).await? {
            return Err(AppError::auth("token was revoked"));
        }

        let claims = state.auth.verify_access(&token)?;
        if state
            .denylist
            .is_user_blacklisted_at(&claims.sub, claims.iat * 1000)
            .await?
        {
            return Err(AppError::auth("token was revoked"));
        }

        let decision = state
            .limiter
            .check(RateLimitKind::ApiUser, &claims.sub)
            .await;
        if !decision.allowed {
            return Err(AppError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::auth("invalid subject claim"))?;
        let user = db::get_user_by_id(&state.pool, &user_id)
            .await?
            .ok_or_else(|| AppError::auth("unknown user"))?;
        if !user.is_active {
            return Err(AppError::forbidden("account is deactivated"));
        }

        Ok(AuthenticatedUser(user))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) =
            AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::forbidden("admin role required"));
        }
        Ok(AdminUser(user))
    }
}
