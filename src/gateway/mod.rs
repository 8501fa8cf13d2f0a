//! Realtime gateway: socket lifecycle, channel subscription, event
//! dispatch, presence fan-out, typing timers, heartbeat.

pub mod channels;
pub mod events;

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::http::HeaderMap;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::AuthManager;
use crate::config::{HEARTBEAT_INTERVAL_SECS, TYPING_CLEAR_SECS};
use crate::db::{self, DbPool, MessageView, User};
use crate::error::{AppError, AppResult};
use crate::presence::{PresenceRegistry, PresenceStatus};
use crate::rate_limit::{RateLimitKind, RateLimiter};
use crate::services::{MessageService, RoomService};
use crate::tokens::TokenDenylist;

use channels::RoomChannels;
use events::{ClientEvent, ServerEvent};

pub struct ChatGateway {
    auth: Arc<AuthManager>,
    denylist: TokenDenylist,
    presence: PresenceRegistry,
    limiter: RateLimiter,
    pool: DbPool,
    messages: MessageService,
    rooms: RoomService,
    channels: RoomChannels,
    /// Pending auto-clear timers keyed by (room, user); superseded timers
    /// are cancelled before a replacement is scheduled
    typing_tasks: Mutex<HashMap<(Uuid, Uuid), JoinHandle<()>>>,
}

impl ChatGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: Arc<AuthManager>,
        denylist: TokenDenylist,
        presence: PresenceRegistry,
        limiter: RateLimiter,
        pool: DbPool,
        messages: MessageService,
        rooms: RoomService,
    ) -> Self {
        Self {
            auth,
            denylist,
            presence,
            limiter,
            pool,
            messages,
            rooms,
            channels: RoomChannels::new(),
            typing_tasks: Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Connection admission
    // ========================================================================

    /// Validate a handshake before the upgrade: rate-limit the IP, extract
    /// the bearer token, check the denylist and the per-user cutoff, verify
    /// the signature, and load the user.
    pub async fn authorize_connection(
        &self,
        headers: &HeaderMap,
        query: &HashMap<String, String>,
        ip: &str,
    ) -> AppResult<User> {
        let decision = self.limiter.check(RateLimitKind::WebsocketIp, ip).await;
        if !decision.allowed {
            return Err(AppError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        let token = extract_token(headers, query)
            .ok_or_else(|| AppError::auth("missing bearer token"))?;

        if self.denylist.is_blacklisted(&token).await? {
            return Err(AppError::auth("token was revoked"));
        }

        let claims = self.auth.verify_access(&token)?;
        if self
            .denylist
            .is_user_blacklisted_at(&claims.sub, claims.iat * 1000)
            .await?
        {
            return Err(AppError::auth("token was revoked"));
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::auth("invalid subject claim"))?;
        let user = db::get_user_by_id(&self.pool, &user_id)
            .await?
            .ok_or_else(|| AppError::auth("unknown user"))?;
        if !user.is_active {
            return Err(AppError::forbidden("account is deactivated"));
        }

        Ok(user)
    }

    // ========================================================================
    // Socket lifecycle
    // ========================================================================

    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket, user: User, ip: String) {
        let user_id = user.id;
        let user_key = user_id.to_string();
        let socket_id = Uuid::new_v4().to_string();

        if let Err(e) = self.presence.set_online(&user_key, &socket_id).await {
            tracing::warn!(user_id = %user_key, error = %e, "presence set_online failed");
        }

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

        // Writer task: serialize outbound events onto the socket
        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(_) => continue,
                };
                if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        let mut session = SocketSession {
            gateway: Arc::clone(&self),
            user_id,
            ip,
            tx: tx.clone(),
            joined: HashMap::new(),
        };

        // Auto-join every room the user is a member of
        match db::list_room_ids_for_user(&self.pool, &user_id).await {
            Ok(room_ids) => {
                for room_id in room_ids {
                    session.join_room(room_id).await;
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %user_key, error = %e, "membership auto-join failed");
            }
        }

        // Heartbeat loop: ping the client and refresh presence every 20 s
        let heartbeat = {
            let gateway = Arc::clone(&self);
            let tx = tx.clone();
            let user_key = user_key.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
                interval.tick().await; // immediate first tick
                loop {
                    interval.tick().await;
                    if tx.send(ServerEvent::Ping).is_err() {
                        break;
                    }
                    if let Err(e) = gateway.presence.heartbeat(&user_key).await {
                        tracing::warn!(user_id = %user_key, error = %e, "heartbeat refresh failed");
                    }
                }
            })
        };

        tracing::info!(user_id = %user_key, socket_id = %socket_id, "socket connected");

        while let Some(Ok(frame)) = ws_rx.next().await {
            match frame {
                WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        if session.dispatch(event).await.is_break() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(user_id = %user_key, error = %e, "malformed client event");
                        session.send_error("VALIDATION_ERROR", "malformed event");
                    }
                },
                WsMessage::Close(_) => break,
                _ => {}
            }
        }

        // Teardown: stop timers, leave channels, mark offline, tell rooms
        heartbeat.abort();
        self.cancel_typing_for_user(&user_id).await;

        let joined_rooms: Vec<Uuid> = session.joined.keys().copied().collect();
        for (_, handle) in session.joined.drain() {
            handle.abort();
        }

        if let Err(e) = self.presence.cleanup_user(&user_key).await {
            tracing::warn!(user_id = %user_key, error = %e, "presence cleanup failed");
        }

        for room_id in joined_rooms {
            self.channels
                .publish(
                    room_id,
                    ServerEvent::Presence {
                        room_id,
                        user_id,
                        status: PresenceStatus::Offline,
                    },
                )
                .await;
            self.channels.prune(&room_id).await;
        }

        writer.abort();
        tracing::info!(user_id = %user_key, socket_id = %socket_id, "socket disconnected");
    }

    // ========================================================================
    // Fan-out entry points (also used by the REST boundary)
    // ========================================================================

    pub async fn emit_message_created(&self, room_id: Uuid, message: MessageView) {
        self.channels
            .publish(room_id, ServerEvent::MessageCreated { room_id, message })
            .await;
    }

    pub async fn emit_message_updated(&self, room_id: Uuid, message: MessageView) {
        self.channels
            .publish(room_id, ServerEvent::MessageUpdated { room_id, message })
            .await;
    }

    pub async fn emit_message_deleted(&self, room_id: Uuid, message_id: Uuid) {
        self.channels
            .publish(
                room_id,
                ServerEvent::MessageDeleted {
                    room_id,
                    message_id,
                },
            )
            .await;
    }

    async fn cancel_typing_for_user(&self, user_id: &Uuid) {
        let mut typing = self.typing_tasks.lock().await;
        typing.retain(|(_, uid), handle| {
            if uid == user_id {
                handle.abort();
                false
            } else {
                true
            }
        });
    }
}

#[async_trait::async_trait]
impl crate::pipeline::FanoutSink for ChatGateway {
    async fn emit_message_updated(&self, room_id: Uuid, message: MessageView) {
        ChatGateway::emit_message_updated(self, room_id, message).await;
    }
}

fn extract_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }
    query.get("token").cloned()
}

// ============================================================================
// Per-socket session
// ============================================================================

struct SocketSession {
    gateway: Arc<ChatGateway>,
    user_id: Uuid,
    ip: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
    /// Forwarder task per subscribed room channel
    joined: HashMap<Uuid, JoinHandle<()>>,
}

impl SocketSession {
    /// Handle one client event. `Break` closes the socket.
    async fn dispatch(&mut self, event: ClientEvent) -> ControlFlow<()> {
        match event {
            ClientEvent::JoinRoom { room_id } => self.on_join(room_id).await,
            ClientEvent::LeaveRoom { room_id } => {
                self.on_leave(room_id).await;
                ControlFlow::Continue(())
            }
            ClientEvent::Typing { room_id, is_typing } => {
                self.on_typing(room_id, is_typing).await;
                ControlFlow::Continue(())
            }
            ClientEvent::SendMessage { room_id, body } => self.on_send(room_id, body).await,
            ClientEvent::ReadReceipt {
                room_id,
                message_id,
            } => {
                self.on_read_receipt(room_id, message_id).await;
                ControlFlow::Continue(())
            }
            ClientEvent::Pong => {
                let user_key = self.user_id.to_string();
                if let Err(e) = self.gateway.presence.heartbeat(&user_key).await {
                    tracing::warn!(user_id = %user_key, error = %e, "pong heartbeat failed");
                }
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_join(&mut self, room_id: Uuid) -> ControlFlow<()> {
        let decision = self
            .gateway
            .limiter
            .check(RateLimitKind::RoomJoinUser, &self.user_id.to_string())
            .await;
        if !decision.allowed {
            self.send_error("RATE_LIMITED", "too many room joins");
            return ControlFlow::Break(());
        }

        match self.gateway.rooms.is_member(&room_id, &self.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.send_error("FORBIDDEN", "not a member of this room");
                return ControlFlow::Continue(());
            }
            Err(e) => {
                self.send_app_error(&e);
                return ControlFlow::Continue(());
            }
        }

        self.join_room(room_id).await;
        ControlFlow::Continue(())
    }

    /// Subscribe the socket to a room channel and announce presence.
    async fn join_room(&mut self, room_id: Uuid) {
        if self.joined.contains_key(&room_id) {
            return;
        }

        let mut rx = self.gateway.channels.subscribe(room_id).await;
        let tx = self.tx.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "socket lagged behind room channel");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.joined.insert(room_id, forwarder);

        let user_key = self.user_id.to_string();
        let room_key = room_id.to_string();
        if let Err(e) = self.gateway.presence.add_to_room(&user_key, &room_key).await {
            tracing::warn!(room_id = %room_key, error = %e, "presence add_to_room failed");
        }

        self.gateway
            .channels
            .publish(
                room_id,
                ServerEvent::Presence {
                    room_id,
                    user_id: self.user_id,
                    status: PresenceStatus::Online,
                },
            )
            .await;
    }

    async fn on_leave(&mut self, room_id: Uuid) {
        if let Some(handle) = self.joined.remove(&room_id) {
            handle.abort();
        }

        let user_key = self.user_id.to_string();
        let room_key = room_id.to_string();
        if let Err(e) = self
            .gateway
            .presence
            .remove_from_room(&user_key, &room_key)
            .await
        {
            tracing::warn!(room_id = %room_key, error = %e, "presence remove_from_room failed");
        }

        self.gateway
            .channels
            .publish(
                room_id,
                ServerEvent::Presence {
                    room_id,
                    user_id: self.user_id,
                    status: PresenceStatus::Offline,
                },
            )
            .await;
        self.gateway.channels.prune(&room_id).await;
    }

    async fn on_typing(&mut self, room_id: Uuid, is_typing: bool) {
        match self.gateway.rooms.is_member(&room_id, &self.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.send_error("FORBIDDEN", "not a member of this room");
                return;
            }
            Err(e) => {
                self.send_app_error(&e);
                return;
            }
        }

        self.gateway
            .channels
            .publish(
                room_id,
                ServerEvent::Typing {
                    room_id,
                    user_id: self.user_id,
                    is_typing,
                },
            )
            .await;

        let key = (room_id, self.user_id);
        let mut typing = self.gateway.typing_tasks.lock().await;
        if let Some(previous) = typing.remove(&key) {
            previous.abort();
        }

        if is_typing {
            let gateway = Arc::clone(&self.gateway);
            let user_id = self.user_id;
            typing.insert(
                key,
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(TYPING_CLEAR_SECS)).await;
                    gateway
                        .channels
                        .publish(
                            room_id,
                            ServerEvent::Typing {
                                room_id,
                                user_id,
                                is_typing: false,
                            },
                        )
                        .await;
                    gateway.typing_tasks.lock().await.remove(&(room_id, user_id));
                }),
            );
        }
    }

    async fn on_send(&mut self, room_id: Uuid, body: String) -> ControlFlow<()> {
        match self
            .gateway
            .messages
            .send(&room_id, &body, &self.user_id, Some(&self.ip))
            .await
        {
            Ok(message) => {
                self.gateway.emit_message_created(room_id, message).await;
                ControlFlow::Continue(())
            }
            Err(e @ AppError::RateLimited { .. }) => {
                // rate-limit denials terminate the socket
                self.send_app_error(&e);
                ControlFlow::Break(())
            }
            Err(e) => {
                self.send_app_error(&e);
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_read_receipt(&mut self, room_id: Uuid, message_id: Option<Uuid>) {
        match self.gateway.rooms.is_member(&room_id, &self.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.send_error("FORBIDDEN", "not a member of this room");
                return;
            }
            Err(e) => {
                self.send_app_error(&e);
                return;
            }
        }

        if let Some(id) = &message_id {
            if let Err(e) =
                db::set_last_read(&self.gateway.pool, &room_id, &self.user_id, id).await
            {
                tracing::warn!(room_id = %room_id, error = %e, "last-read update failed");
            }
        }

        self.gateway
            .channels
            .publish(
                room_id,
                ServerEvent::ReadReceipt {
                    room_id,
                    user_id: self.user_id,
                    message_id: message_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "latest".to_string()),
                    read_at: Utc::now(),
                },
            )
            .await;
    }

    fn send_error(&self, code: &str, message: &str) {
        let _ = self.tx.send(ServerEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    fn send_app_error(&self, error: &AppError) {
        self.send_error(error.error_code(), &error.user_message());
    }
}
