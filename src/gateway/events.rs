//! Wire-level event types for the `/chat` socket. JSON text frames, tagged
//! by a `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::MessageView;
use crate::presence::PresenceStatus;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Typing { room_id: Uuid, is_typing: bool },
    #[serde(rename_all = "camelCase")]
    SendMessage { room_id: Uuid, body: String },
    #[serde(rename_all = "camelCase")]
    ReadReceipt {
        room_id: Uuid,
        #[serde(default)]
        message_id: Option<Uuid>,
    },
    Pong,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    MessageCreated { room_id: Uuid, message: MessageView },
    #[serde(rename_all = "camelCase")]
    MessageUpdated { room_id: Uuid, message: MessageView },
    #[serde(rename_all = "camelCase")]
    MessageDeleted { room_id: Uuid, message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Typing {
        room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    Presence {
        room_id: Uuid,
        user_id: Uuid,
        status: PresenceStatus,
    },
    #[serde(rename_all = "camelCase")]
    ReadReceipt {
        room_id: Uuid,
        user_id: Uuid,
        /// Message id, or "latest" when the client acknowledged everything
        message_id: String,
        read_at: DateTime<Utc>,
    },
    Ping,
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_from_tagged_json() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"join_room","roomId":"9b9773f2-4aeb-4c45-9d94-000000000001"}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { .. }));

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"typing","roomId":"9b9773f2-4aeb-4c45-9d94-000000000001","isTyping":true}"#)
                .unwrap();
        assert!(matches!(event, ClientEvent::Typing { is_typing: true, .. }));

        let event: ClientEvent = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Pong));
    }

    #[test]
    fn read_receipt_message_id_is_optional() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"read_receipt","roomId":"9b9773f2-4aeb-4c45-9d94-000000000001"}"#,
        )
        .unwrap();
        match event {
            ClientEvent::ReadReceipt { message_id, .. } => assert!(message_id.is_none()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_events_tag_with_snake_case_type() {
        let event = ServerEvent::Typing {
            room_id: Uuid::nil(),
            user_id: Uuid::nil(),
            is_typing: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["isTyping"], false);

        let value = serde_json::to_value(&ServerEvent::Ping).unwrap();
        assert_eq!(value["type"], "ping");
    }
}
