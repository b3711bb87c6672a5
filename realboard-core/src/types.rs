//! Board model types shared between the store, the action executor and the
//! event reconciler, plus the raw server record shapes returned by the
//! board API. Wire names are camelCase to match the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of locally fabricated card/comment ids. A temporary id is
/// replaced 1:1 by the server-assigned canonical id on write success.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Check whether an id is a locally fabricated temporary id.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Card priority, one of four levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Display identity of a user: resolved lazily from the user directory
/// and cached for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: None,
            color: None,
        }
    }

    /// Degraded identity used when a directory lookup fails: the first
    /// 8 characters of the id stand in for the display name.
    pub fn placeholder(id: &str) -> Self {
        let short: String = id.chars().take(8).collect();
        let name = if id.chars().count() > 8 {
            format!("{}…", short)
        } else {
            short
        };
        Self::new(id, name)
    }
}

/// A lane (column) of the board. The lane set is fully replaced on each
/// load, never merged incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: i32,
}

/// A tag attached to a card. Many-to-many with cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A comment on a card, with its author identity already resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author: UserIdentity,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Which way a vote points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Up,
    Down,
}

/// A fully enriched card as held by the store and shown to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub content: String,
    pub author: UserIdentity,
    pub lane_id: String,
    /// Human-facing column name, derived from `lane_id` via the mapper.
    pub column: String,
    #[serde(default)]
    pub priority: Priority,
    /// Display names of users who voted up.
    #[serde(default)]
    pub likes: Vec<String>,
    /// Display names of users who voted down.
    #[serde(default)]
    pub dislikes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserIdentity>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Toggle a vote by display name and return the resulting weight to
    /// persist: +1 (liked), -1 (disliked) or 0 (vote removed).
    ///
    /// Voting the polarity already held removes the vote; voting the
    /// opposite polarity clears the old one first. A name is never in
    /// both lists at once.
    pub fn toggle_vote(&mut self, name: &str, kind: VoteKind) -> i32 {
        let had_like = self.likes.iter().any(|n| n == name);
        let had_dislike = self.dislikes.iter().any(|n| n == name);
        self.likes.retain(|n| n != name);
        self.dislikes.retain(|n| n != name);
        match kind {
            VoteKind::Up if !had_like => {
                self.likes.push(name.to_string());
                1
            }
            VoteKind::Down if !had_dislike => {
                self.dislikes.push(name.to_string());
                -1
            }
            _ => 0,
        }
    }

    /// Overwrite this voter's entry from a server-side weight: positive
    /// means like, negative means dislike, zero clears.
    pub fn set_vote(&mut self, name: &str, weight: i32) {
        self.likes.retain(|n| n != name);
        self.dislikes.retain(|n| n != name);
        if weight > 0 {
            self.likes.push(name.to_string());
        } else if weight < 0 {
            self.dislikes.push(name.to_string());
        }
    }
}

// Raw server records
// Shapes returned by the board API before enrichment. The loader turns a
// CardRecord into a Card by resolving identities, column name, comments
// and vote roll-ups.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: String,
    pub content: String,
    pub author_id: String,
    /// May be null or reference an unknown lane; the mapper falls back
    /// to the default lane in that case.
    #[serde(default)]
    pub lane_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: String,
    pub card_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One voter's ballot on a card. The sign of `weight` selects the like
/// (positive) or dislike (negative) list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub user_id: String,
    pub weight: i32,
}

/// Combined read surface handed to the UI layer.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub lanes: Vec<Lane>,
    pub cards: Vec<Card>,
    pub presence: Vec<UserIdentity>,
    pub loading: bool,
}
