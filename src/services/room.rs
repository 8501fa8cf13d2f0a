//! Room lifecycle, membership table, and the role-based authorization
//! matrix every other component consults.

use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, DbPool, MemberView, Room, RoomRole};
use crate::error::{AppError, AppResult};
use crate::sanitize::sanitize_room_name;
use crate::services::{clamp_page, Paginated};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomInput {
    pub name: String,
    #[serde(default = "default_room_type")]
    pub room_type: String,
    #[serde(default)]
    pub is_private: bool,
}

fn default_room_type() -> String {
    "channel".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomInput {
    pub name: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Clone)]
pub struct RoomService {
    pool: DbPool,
}

impl RoomService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a room with the creator as sole owner. The room row and the
    /// owner membership commit together so `members_count` starts correct.
    pub async fn create(&self, input: CreateRoomInput, creator: &Uuid) -> AppResult<Room> {
        let name = sanitize_room_name(&input.name);
        if name.is_empty() {
            return Err(AppError::validation("room name must not be empty"));
        }
        if !matches!(input.room_type.as_str(), "dm" | "channel") {
            return Err(AppError::validation("room type must be 'dm' or 'channel'"));
        }

        let mut tx = self.pool.begin().await?;

        let room = sqlx::query_as::<_, Room>(
            r#"
            INSERT INTO rooms (room_type, name, is_private, created_by, members_count)
            VALUES ($1, $2, $3, $4, 1)
            RETURNING *
            "#,
        )
        .bind(&input.room_type)
        .bind(&name)
        .bind(input.is_private)
        .bind(creator)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, 'owner')")
            .bind(room.id)
            .bind(creator)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(room_id = %room.id, creator = %creator, "room created");
        Ok(room)
    }

    /// Fetch a room the caller belongs to.
    pub async fn get_for_member(&self, room_id: &Uuid, caller: &Uuid) -> AppResult<Room> {
        let room = db::get_room(&self.pool, room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room not found"))?;
        self.require_member(room_id, caller).await?;
        Ok(room)
    }

    pub async fn list_for_user(
        &self,
        caller: &Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<Paginated<Room>> {
        let (page, limit) = clamp_page(page, limit);
        let rooms =
            db::list_rooms_for_user(&self.pool, caller, limit, (page - 1) * limit).await?;
        let total = db::count_rooms_for_user(&self.pool, caller).await?;
        Ok(Paginated::new(rooms, total, page, limit))
    }

    /// Update room metadata; owners and moderators only.
    pub async fn update(
        &self,
        room_id: &Uuid,
        input: UpdateRoomInput,
        caller: &Uuid,
    ) -> AppResult<Room> {
        let role = self.require_member(room_id, caller).await?;
        if !role.can_manage_members() {
            return Err(AppError::forbidden("only owners and moderators may update the room"));
        }

        let name = match input.name.as_deref() {
            Some(raw) => {
                let name = sanitize_room_name(raw);
                if name.is_empty() {
                    return Err(AppError::validation("room name must not be empty"));
                }
                Some(name)
            }
            None => None,
        };

        db::update_room(&self.pool, room_id, name.as_deref(), input.is_private)
            .await?
            .ok_or_else(|| AppError::not_found("room not found"))
    }

    /// Add a member; owners and moderators only.
    pub async fn add_member(
        &self,
        room_id: &Uuid,
        target: &Uuid,
        caller: &Uuid,
    ) -> AppResult<()> {
        db::get_room(&self.pool, room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room not found"))?;

        let caller_role = self.require_member(room_id, caller).await?;
        if !caller_role.can_manage_members() {
            return Err(AppError::forbidden("only owners and moderators may add members"));
        }

        let target_user = db::get_user_by_id(&self.pool, target)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        if !target_user.is_active {
            return Err(AppError::validation("user account is deactivated"));
        }

        if db::get_member(&self.pool, room_id, target).await?.is_some() {
            return Err(AppError::conflict("user is already a member"));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, 'member')")
            .bind(room_id)
            .bind(target)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE rooms SET members_count = members_count + 1, updated_at = now() WHERE id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(room_id = %room_id, user_id = %target, "member added");
        Ok(())
    }

    /// Remove a member.
    ///
    /// Allowed for: the member themselves, an owner removing someone else,
    /// or a moderator removing a plain member. An owner leaves only when
    /// another owner remains.
    pub async fn remove_member(
        &self,
        room_id: &Uuid,
        target: &Uuid,
        caller: &Uuid,
    ) -> AppResult<()> {
        db::get_room(&self.pool, room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room not found"))?;

        let target_member = db::get_member(&self.pool, room_id, target)
            .await?
            .ok_or_else(|| AppError::not_found("membership not found"))?;
        let target_role = target_member.room_role();

        let caller_role = self.require_member(room_id, caller).await?;

        let is_self = caller == target;
        let authorized = is_self
            || (caller_role == RoomRole::Owner && target_role != RoomRole::Owner)
            || (caller_role == RoomRole::Moderator && target_role == RoomRole::Member);
        if !authorized {
            return Err(AppError::forbidden("not allowed to remove this member"));
        }

        if target_role == RoomRole::Owner {
            // reachable only via self-removal
            let owners = db::count_owners(&self.pool, room_id).await?;
            if owners <= 1 {
                return Err(AppError::forbidden(
                    "the sole owner cannot leave; transfer ownership first",
                ));
            }
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(target)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE rooms SET members_count = members_count - 1, updated_at = now() WHERE id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(room_id = %room_id, user_id = %target, "member removed");
        Ok(())
    }

    /// Change a member's role; owners only, never on themselves.
    pub async fn update_member_role(
        &self,
        room_id: &Uuid,
        target: &Uuid,
        new_role: RoomRole,
        caller: &Uuid,
    ) -> AppResult<()> {
        let caller_role = self.require_member(room_id, caller).await?;
        if caller_role != RoomRole::Owner {
            return Err(AppError::forbidden("only owners may change member roles"));
        }
        if caller == target {
            return Err(AppError::forbidden("owners cannot change their own role"));
        }

        let updated = db::update_member_role(&self.pool, room_id, target, new_role).await?;
        if !updated {
            return Err(AppError::not_found("membership not found"));
        }

        tracing::info!(
            room_id = %room_id,
            user_id = %target,
            role = new_role.as_db(),
            "member role updated"
        );
        Ok(())
    }

    /// Member listing; members only.
    pub async fn members(&self, room_id: &Uuid, caller: &Uuid) -> AppResult<Vec<MemberView>> {
        db::get_room(&self.pool, room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room not found"))?;
        self.require_member(room_id, caller).await?;
        db::list_members(&self.pool, room_id).await
    }

    pub async fn is_member(&self, room_id: &Uuid, user_id: &Uuid) -> AppResult<bool> {
        Ok(db::get_member(&self.pool, room_id, user_id).await?.is_some())
    }

    pub async fn role_of(&self, room_id: &Uuid, user_id: &Uuid) -> AppResult<Option<RoomRole>> {
        Ok(db::get_member(&self.pool, room_id, user_id)
            .await?
            .map(|m| m.room_role()))
    }

    async fn require_member(&self, room_id: &Uuid, user_id: &Uuid) -> AppResult<RoomRole> {
        self.role_of(room_id, user_id)
            .await?
            .ok_or_else(|| AppError::forbidden("not a member of this room"))
    }
}
