//! User registration, authentication, profile, and admin operations.

use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, DbPool, User};
use crate::error::{AppError, AppResult};
use crate::sanitize::sanitize_text;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    pool: DbPool,
}

impl UserService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, input: RegisterInput) -> AppResult<User> {
        let email = normalize_email(&input.email)?;
        validate_password(&input.password)?;

        let name = sanitize_text(&input.name);
        if name.is_empty() || name.chars().count() > 100 {
            return Err(AppError::validation("name must be 1-100 characters"));
        }

        let user = db::create_user(&self.pool, &email, &input.password, &name).await?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Credential check for login. Failures are indistinguishable on
    /// purpose, except for deactivated accounts.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let email = normalize_email(email)?;
        let user = db::get_user_by_email(&self.pool, &email)
            .await?
            .ok_or_else(|| AppError::auth("invalid credentials"))?;

        if !db::verify_password(&user, password).await? {
            return Err(AppError::auth("invalid credentials"));
        }
        if !user.is_active {
            return Err(AppError::forbidden("account is deactivated"));
        }

        db::touch_last_login(&self.pool, &user.id).await?;
        Ok(user)
    }

    pub async fn get(&self, user_id: &Uuid) -> AppResult<User> {
        db::get_user_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    pub async fn update_profile(
        &self,
        user_id: &Uuid,
        input: UpdateProfileInput,
    ) -> AppResult<User> {
        let display_name = match input.display_name.as_deref() {
            Some(raw) => {
                let name = sanitize_text(raw);
                if name.is_empty() || name.chars().count() > 100 {
                    return Err(AppError::validation("name must be 1-100 characters"));
                }
                Some(name)
            }
            None => None,
        };
        let avatar_url = input.avatar_url.as_deref().map(sanitize_text);

        db::update_user_profile(
            &self.pool,
            user_id,
            display_name.as_deref(),
            avatar_url.as_deref(),
        )
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
    }

    // ===== Admin operations =====

    pub async fn set_role(&self, user_id: &Uuid, role: &str) -> AppResult<User> {
        if !matches!(role, "user" | "admin") {
            return Err(AppError::validation("role must be 'user' or 'admin'"));
        }
        db::set_user_role(&self.pool, user_id, role)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    pub async fn set_active(&self, user_id: &Uuid, active: bool) -> AppResult<User> {
        db::set_user_active(&self.pool, user_id, active)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))
    }

    pub async fn delete(&self, user_id: &Uuid) -> AppResult<()> {
        if !db::delete_user(&self.pool, user_id).await? {
            return Err(AppError::not_found("user not found"));
        }
        tracing::info!(user_id = %user_id, "user deleted");
        Ok(())
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email.len() >= 3
        && email.chars().filter(|&c| c == '@').count() == 1
        && !email.starts_with('@')
        && !email.ends_with('@')
        && !email.contains(char::is_whitespace);
    if !valid {
        return Err(AppError::validation("invalid email address"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        return Err(AppError::validation("password must be at least 8 characters"));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(AppError::validation(
            "password must contain at least one letter and one digit",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email(" A@X.io ").unwrap(), "a@x.io");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("two@@ats").is_err());
        assert!(normalize_email("@leading").is_err());
        assert!(normalize_email("trailing@").is_err());
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("Passw0rd!").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("12345678").is_err());
    }
}
