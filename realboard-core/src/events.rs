//! Realtime push protocol: the closed set of events the server emits.
//!
//! Every frame is JSON of the form `{ "event": <name>, "data": <payload> }`
//! and is validated into this tagged union at the transport boundary.
//! Unknown event names or malformed payloads are a parse error there,
//! never an ad-hoc field access later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CardRecord, CommentRecord, Lane};

/// Messages sent from client to server over the realtime connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Join {
        #[serde(flatten)]
        context: RoomContext,
    },
    Leave {
        #[serde(flatten)]
        context: RoomContext,
    },
}

/// A logical broadcast scope on the realtime transport. A client is
/// typically joined to its board room plus a workspace and session room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl RoomContext {
    pub fn board(board_id: impl Into<String>) -> Self {
        Self {
            board_id: Some(board_id.into()),
            ..Self::default()
        }
    }
}

/// Events pushed by the server. Each variant carries its own validated
/// payload; delivery is at-least-once and unordered across event kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "card:created")]
    CardCreated(CardPayload),
    #[serde(rename = "card:updated")]
    CardUpdated(CardPayload),
    #[serde(rename = "card:moved")]
    CardMoved(CardMovedPayload),
    #[serde(rename = "card:archived")]
    CardArchived(CardRefPayload),
    #[serde(rename = "card:unarchived")]
    CardUnarchived(CardRefPayload),
    #[serde(rename = "comment:created")]
    CommentCreated(CommentPayload),
    #[serde(rename = "vote:changed")]
    VoteChanged(VotePayload),
    #[serde(rename = "assignee:added")]
    AssigneeAdded(AssigneePayload),
    #[serde(rename = "assignee:removed")]
    AssigneeRemoved(AssigneePayload),
    #[serde(rename = "presence:update")]
    PresenceUpdate(PresencePayload),
    #[serde(rename = "lane:created")]
    LaneCreated(LanePayload),
    #[serde(rename = "lane:updated")]
    LaneUpdated(LanePayload),
    #[serde(rename = "lane:deleted")]
    LaneDeleted(LaneRefPayload),
    #[serde(rename = "chat:message:sent")]
    ChatMessageSent(ChatMessagePayload),
    #[serde(rename = "chat:message:deleted")]
    ChatMessageDeleted(ChatRefPayload),
    #[serde(rename = "notification:created")]
    NotificationCreated(NotificationPayload),
}

impl ServerEvent {
    /// Parse one text frame from the realtime connection.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Id of the user whose action produced this event, when the server
    /// attributes one. Used to drop self-originated echoes.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::CardCreated(p) | Self::CardUpdated(p) => p.user_id.as_deref(),
            Self::CardMoved(p) => p.user_id.as_deref(),
            Self::CardArchived(p) | Self::CardUnarchived(p) => p.user_id.as_deref(),
            Self::CommentCreated(p) => p.user_id.as_deref(),
            Self::VoteChanged(p) => Some(&p.user_id),
            Self::AssigneeAdded(p) | Self::AssigneeRemoved(p) => p.user_id.as_deref(),
            Self::LaneCreated(p) | Self::LaneUpdated(p) => p.user_id.as_deref(),
            Self::LaneDeleted(p) => p.user_id.as_deref(),
            Self::PresenceUpdate(_)
            | Self::ChatMessageSent(_)
            | Self::ChatMessageDeleted(_)
            | Self::NotificationCreated(_) => None,
        }
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CardCreated(_) => "card:created",
            Self::CardUpdated(_) => "card:updated",
            Self::CardMoved(_) => "card:moved",
            Self::CardArchived(_) => "card:archived",
            Self::CardUnarchived(_) => "card:unarchived",
            Self::CommentCreated(_) => "comment:created",
            Self::VoteChanged(_) => "vote:changed",
            Self::AssigneeAdded(_) => "assignee:added",
            Self::AssigneeRemoved(_) => "assignee:removed",
            Self::PresenceUpdate(_) => "presence:update",
            Self::LaneCreated(_) => "lane:created",
            Self::LaneUpdated(_) => "lane:updated",
            Self::LaneDeleted(_) => "lane:deleted",
            Self::ChatMessageSent(_) => "chat:message:sent",
            Self::ChatMessageDeleted(_) => "chat:message:deleted",
            Self::NotificationCreated(_) => "notification:created",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    pub card: CardRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMovedPayload {
    pub card_id: String,
    pub target_lane_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRefPayload {
    pub card_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub comment: CommentRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Vote change for one voter on one card. `weight` > 0 is a like,
/// < 0 a dislike, 0 clears the vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub card_id: String,
    pub user_id: String,
    pub weight: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneePayload {
    pub card_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Full replacement of the set of users active in the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanePayload {
    pub lane: Lane,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneRefPayload {
    pub lane_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRefPayload {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_card_moved() {
        let ev = ServerEvent::parse(
            r#"{"event":"card:moved",
                "data":{"cardId":"c-42","targetLaneId":"l-2","userId":"u-1"}}"#,
        )
        .unwrap();
        assert_eq!(ev.actor(), Some("u-1"));
        match ev {
            ServerEvent::CardMoved(p) => {
                assert_eq!(p.card_id, "c-42");
                assert_eq!(p.target_lane_id, "l-2");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_presence_update_has_no_actor() {
        let ev = ServerEvent::parse(
            r#"{"event":"presence:update","data":{"userIds":["u-1","u-2"]}}"#,
        )
        .unwrap();
        assert_eq!(ev.actor(), None);
        assert_eq!(ev.name(), "presence:update");
    }

    #[test]
    fn test_unknown_event_name_rejected() {
        assert!(ServerEvent::parse(r#"{"event":"card:exploded","data":{}}"#).is_err());
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(ServerEvent::parse(r#"{"event":"vote:changed","data":{"cardId":"c-1"}}"#).is_err());
    }

    #[test]
    fn test_join_message_wire_shape() {
        let msg = ClientMessage::Join {
            context: RoomContext::board("b-1"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"action":"join","boardId":"b-1"}"#);
    }
}
