//! The board API collaborator seam.
//!
//! Everything the engine needs from the request/response side is behind
//! the `BoardApi` trait: snapshot reads, identity lookups and the write
//! calls that confirm optimistic mutations. The production implementation
//! is `http::HttpBoardApi`; tests substitute an in-memory mock.

use realboard_core::types::{CardRecord, CommentRecord, Lane, Priority, Tag, UserIdentity, VoteRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Fields the client supplies when creating a card; the server assigns
/// the canonical id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub content: String,
    pub lane_id: String,
    pub priority: Priority,
    pub author_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: String,
    pub author_id: String,
}

/// Board API operations. Async methods are awaited inline by their
/// callers, so implementations need no spawn-safety beyond `Send + Sync`
/// on the type itself.
#[allow(async_fn_in_trait)]
pub trait BoardApi: Send + Sync {
    // Snapshot reads
    async fn fetch_lanes(&self, board_id: &str) -> Result<Vec<Lane>, ApiError>;
    async fn fetch_cards(&self, board_id: &str) -> Result<Vec<CardRecord>, ApiError>;
    async fn fetch_card(&self, card_id: &str) -> Result<CardRecord, ApiError>;
    async fn fetch_comments(&self, card_id: &str) -> Result<Vec<CommentRecord>, ApiError>;
    async fn fetch_votes(&self, card_id: &str) -> Result<Vec<VoteRecord>, ApiError>;
    async fn fetch_user(&self, user_id: &str) -> Result<UserIdentity, ApiError>;

    // Writes; each returns the canonical entity where the server
    // fabricates fields the client guessed.
    async fn create_card(&self, board_id: &str, card: &NewCard) -> Result<CardRecord, ApiError>;
    async fn move_card(&self, card_id: &str, lane_id: &str) -> Result<(), ApiError>;
    async fn archive_card(&self, card_id: &str) -> Result<(), ApiError>;
    async fn cast_vote(&self, card_id: &str, user_id: &str, weight: i32) -> Result<(), ApiError>;
    async fn create_comment(
        &self,
        card_id: &str,
        comment: &NewComment,
    ) -> Result<CommentRecord, ApiError>;
    async fn update_priority(&self, card_id: &str, priority: Priority) -> Result<(), ApiError>;
    async fn set_assignee(&self, card_id: &str, user_id: Option<&str>) -> Result<(), ApiError>;
    async fn create_or_find_tag(&self, board_id: &str, label: &str) -> Result<Tag, ApiError>;
    async fn assign_tag(&self, card_id: &str, tag_id: &str) -> Result<(), ApiError>;
    async fn remove_tag(&self, card_id: &str, tag_id: &str) -> Result<(), ApiError>;
}
