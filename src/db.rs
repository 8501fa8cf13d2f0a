use bcrypt::{hash, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub type DbPool = Pool<Postgres>;

pub async fn create_pool(config: &Config) -> AppResult<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .acquire_timeout(Duration::from_secs(config.db.acquire_timeout_secs))
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub avatar_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Default read projection of a user; the password digest never leaves
/// this module.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub avatar_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            is_active: user.is_active,
            avatar_url: user.avatar_url,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub room_type: String,
    pub name: String,
    pub is_private: bool,
    pub created_by: Uuid,
    pub members_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership roles ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomRole {
    Owner,
    Moderator,
    Member,
}

impl RoomRole {
    pub fn as_db(&self) -> &'static str {
        match self {
            RoomRole::Owner => "owner",
            RoomRole::Moderator => "moderator",
            RoomRole::Member => "member",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(RoomRole::Owner),
            "moderator" => Some(RoomRole::Moderator),
            "member" => Some(RoomRole::Member),
            _ => None,
        }
    }

    /// May this role manage ordinary membership (invite/remove members)?
    pub fn can_manage_members(&self) -> bool {
        matches!(self, RoomRole::Owner | RoomRole::Moderator)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomMember {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub last_read_message_id: Option<Uuid>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl RoomMember {
    pub fn room_role(&self) -> RoomRole {
        RoomRole::from_db(&self.role).unwrap_or(RoomRole::Member)
    }
}

/// Member listing projection joined with the user record.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub sentiment: String,
    pub flagged: bool,
    pub flag_reasons: Vec<String>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationMeta {
    pub sentiment: String,
    pub flagged: bool,
    pub reasons: Vec<String>,
}

/// Message projection used by history reads, the hot cache, and fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub moderation: ModerationMeta,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_view(self) -> MessageView {
        MessageView {
            id: self.id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            body: self.body,
            moderation: ModerationMeta {
                sentiment: self.sentiment,
                flagged: self.flagged,
                reasons: self.flag_reasons,
            },
            edited_at: self.edited_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ============================================================================
// Users
// ============================================================================

const USER_COLUMNS: &str = "id, email, password_hash, display_name, role, is_active, \
                            avatar_url, last_login_at, created_at, updated_at";

pub async fn create_user(
    pool: &DbPool,
    email: &str,
    password: &str,
    display_name: &str,
) -> AppResult<User> {
    let password_hash = hash(password, DEFAULT_COST)
        .map_err(|e| AppError::internal(format!("password hashing failed: {}", e)))?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (email, password_hash, display_name)
        VALUES ($1, $2, $3)
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(email)
    .bind(password_hash)
    .bind(display_name)
    .fetch_one(pool)
    .await
    .map_err(|e| match unique_violation(&e) {
        true => AppError::conflict("email already registered"),
        false => AppError::Database(e),
    })?;

    Ok(user)
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1",
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn get_user_by_id(pool: &DbPool, user_id: &Uuid) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1",
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn verify_password(user: &User, password: &str) -> AppResult<bool> {
    bcrypt::verify(password, &user.password_hash)
        .map_err(|e| AppError::internal(format!("password verification failed: {}", e)))
}

pub async fn touch_last_login(pool: &DbPool, user_id: &Uuid) -> AppResult<()> {
    sqlx::query("UPDATE users SET last_login_at = now(), updated_at = now() WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Partial profile update; absent fields stay unchanged.
pub async fn update_user_profile(
    pool: &DbPool,
    user_id: &Uuid,
    display_name: Option<&str>,
    avatar_url: Option<&str>,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET display_name = COALESCE($2, display_name),
            avatar_url = COALESCE($3, avatar_url),
            updated_at = now()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(user_id)
    .bind(display_name)
    .bind(avatar_url)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn set_user_role(pool: &DbPool, user_id: &Uuid, role: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}",
    ))
    .bind(user_id)
    .bind(role)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn set_user_active(
    pool: &DbPool,
    user_id: &Uuid,
    active: bool,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}",
    ))
    .bind(user_id)
    .bind(active)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Administrative physical delete. Fails with Conflict while messages still
/// reference the user.
pub async fn delete_user(pool: &DbPool, user_id: &Uuid) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| match fk_violation(&e) {
            true => AppError::conflict("user is still referenced by messages"),
            false => AppError::Database(e),
        })?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Rooms
// ============================================================================

pub async fn get_room(pool: &DbPool, room_id: &Uuid) -> AppResult<Option<Room>> {
    let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = $1")
        .bind(room_id)
        .fetch_optional(pool)
        .await?;
    Ok(room)
}

pub async fn update_room(
    pool: &DbPool,
    room_id: &Uuid,
    name: Option<&str>,
    is_private: Option<bool>,
) -> AppResult<Option<Room>> {
    let room = sqlx::query_as::<_, Room>(
        r#"
        UPDATE rooms
        SET name = COALESCE($2, name),
            is_private = COALESCE($3, is_private),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(room_id)
    .bind(name)
    .bind(is_private)
    .fetch_optional(pool)
    .await?;
    Ok(room)
}

pub async fn list_rooms_for_user(
    pool: &DbPool,
    user_id: &Uuid,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Room>> {
    let rooms = sqlx::query_as::<_, Room>(
        r#"
        SELECT r.* FROM rooms r
        JOIN room_members m ON m.room_id = r.id
        WHERE m.user_id = $1
        ORDER BY r.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rooms)
}

pub async fn count_rooms_for_user(pool: &DbPool, user_id: &Uuid) -> AppResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM room_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ============================================================================
// Memberships
// ============================================================================

pub async fn get_member(
    pool: &DbPool,
    room_id: &Uuid,
    user_id: &Uuid,
) -> AppResult<Option<RoomMember>> {
    let member = sqlx::query_as::<_, RoomMember>(
        "SELECT * FROM room_members WHERE room_id = $1 AND user_id = $2",
    )
    .bind(room_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(member)
}

pub async fn list_members(pool: &DbPool, room_id: &Uuid) -> AppResult<Vec<MemberView>> {
    let members = sqlx::query_as::<_, MemberView>(
        r#"
        SELECT m.user_id, u.display_name, m.role, m.joined_at, m.last_seen_at
        FROM room_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.room_id = $1
        ORDER BY m.joined_at ASC
        "#,
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

pub async fn count_owners(pool: &DbPool, room_id: &Uuid) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM room_members WHERE room_id = $1 AND role = 'owner'",
    )
    .bind(room_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn update_member_role(
    pool: &DbPool,
    room_id: &Uuid,
    user_id: &Uuid,
    role: RoomRole,
) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE room_members SET role = $3 WHERE room_id = $1 AND user_id = $2",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(role.as_db())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_last_read(
    pool: &DbPool,
    room_id: &Uuid,
    user_id: &Uuid,
    message_id: &Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE room_members
        SET last_read_message_id = $3, last_seen_at = now()
        WHERE room_id = $1 AND user_id = $2
        "#,
    )
    .bind(room_id)
    .bind(user_id)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_room_ids_for_user(pool: &DbPool, user_id: &Uuid) -> AppResult<Vec<Uuid>> {
    let ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT room_id FROM room_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    Ok(ids)
}

// ============================================================================
// Messages
// ============================================================================

pub async fn insert_message(
    pool: &DbPool,
    room_id: &Uuid,
    sender_id: &Uuid,
    body: &str,
) -> AppResult<MessageRow> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO messages (room_id, sender_id, body)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(room_id)
    .bind(sender_id)
    .bind(body)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Fetch by id including soft-deleted rows; callers decide visibility.
pub async fn get_message(pool: &DbPool, message_id: &Uuid) -> AppResult<Option<MessageRow>> {
    let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
        .bind(message_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// History page, newest first. `before` narrows to rows strictly older than
/// the cursor's created-at.
pub async fn list_messages(
    pool: &DbPool,
    room_id: &Uuid,
    limit: i64,
    offset: i64,
    before: Option<DateTime<Utc>>,
) -> AppResult<Vec<MessageRow>> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT * FROM messages
        WHERE room_id = $1
          AND deleted_at IS NULL
          AND ($4::timestamptz IS NULL OR created_at < $4)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(room_id)
    .bind(limit)
    .bind(offset)
    .bind(before)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_messages(pool: &DbPool, room_id: &Uuid) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE room_id = $1 AND deleted_at IS NULL",
    )
    .bind(room_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn update_message_body(
    pool: &DbPool,
    message_id: &Uuid,
    body: &str,
) -> AppResult<Option<MessageRow>> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        UPDATE messages
        SET body = $2, edited_at = now(), updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(message_id)
    .bind(body)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn soft_delete_message(pool: &DbPool, message_id: &Uuid) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE messages SET deleted_at = now(), updated_at = now() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Rewrite a message's moderation meta by id. Returns the updated row, or
/// None when the id is absent; redelivered pipeline events land here
/// harmlessly.
pub async fn update_message_moderation(
    pool: &DbPool,
    message_id: &Uuid,
    sentiment: &str,
    flagged: bool,
    reasons: &[String],
) -> AppResult<Option<MessageRow>> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        UPDATE messages
        SET sentiment = $2, flagged = $3, flag_reasons = $4, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(message_id)
    .bind(sentiment)
    .bind(flagged)
    .bind(reasons)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ============================================================================
// Error classification helpers
// ============================================================================

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn fk_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23503"))
}
