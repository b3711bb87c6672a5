//! In-memory `BoardApi` used by the unit and scenario tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use realboard_core::types::{
    CardRecord, CommentRecord, Lane, Priority, Tag, UserIdentity, VoteRecord,
};

use crate::api::{ApiError, BoardApi, NewCard, NewComment};

#[derive(Default)]
pub struct MockApi {
    users: Mutex<HashMap<String, UserIdentity>>,
    lanes: Mutex<Vec<Lane>>,
    cards: Mutex<Vec<CardRecord>>,
    comments: Mutex<HashMap<String, Vec<CommentRecord>>>,
    votes: Mutex<HashMap<String, Vec<VoteRecord>>>,
    tags: Mutex<Vec<Tag>>,
    /// Write calls fail with a 500 while set.
    pub fail_writes: std::sync::atomic::AtomicBool,
    /// Write calls stall for this long before completing, so tests can
    /// interleave event handling with an in-flight write.
    write_delay: Mutex<Option<Duration>>,
    user_fetches: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, identity: UserIdentity) {
        self.users
            .lock()
            .unwrap()
            .insert(identity.id.clone(), identity);
    }

    pub fn set_lanes(&self, lanes: Vec<Lane>) {
        *self.lanes.lock().unwrap() = lanes;
    }

    pub fn add_card_record(&self, card: CardRecord) {
        self.cards.lock().unwrap().push(card);
    }

    pub fn add_comment_record(&self, comment: CommentRecord) {
        self.comments
            .lock()
            .unwrap()
            .entry(comment.card_id.clone())
            .or_default()
            .push(comment);
    }

    pub fn add_vote_record(&self, card_id: &str, vote: VoteRecord) {
        self.votes
            .lock()
            .unwrap()
            .entry(card_id.to_string())
            .or_default()
            .push(vote);
    }

    pub fn user_fetch_count(&self) -> usize {
        self.user_fetches.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn write_gate(&self) -> Result<(), ApiError> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                body: "injected failure".into(),
            });
        }
        Ok(())
    }
}

impl BoardApi for MockApi {
    async fn fetch_lanes(&self, _board_id: &str) -> Result<Vec<Lane>, ApiError> {
        Ok(self.lanes.lock().unwrap().clone())
    }

    async fn fetch_cards(&self, _board_id: &str) -> Result<Vec<CardRecord>, ApiError> {
        Ok(self.cards.lock().unwrap().clone())
    }

    async fn fetch_card(&self, card_id: &str) -> Result<CardRecord, ApiError> {
        self.cards
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                entity: "card",
                id: card_id.to_string(),
            })
    }

    async fn fetch_comments(&self, card_id: &str) -> Result<Vec<CommentRecord>, ApiError> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(card_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_votes(&self, card_id: &str) -> Result<Vec<VoteRecord>, ApiError> {
        Ok(self
            .votes
            .lock()
            .unwrap()
            .get(card_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserIdentity, ApiError> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })
    }

    async fn create_card(&self, _board_id: &str, card: &NewCard) -> Result<CardRecord, ApiError> {
        self.write_gate().await?;
        let record = CardRecord {
            id: self.next_id("c"),
            content: card.content.clone(),
            author_id: card.author_id.clone(),
            lane_id: Some(card.lane_id.clone()),
            priority: card.priority,
            assignee_id: None,
            tags: vec![],
            created_at: Utc::now(),
        };
        self.cards.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn move_card(&self, card_id: &str, lane_id: &str) -> Result<(), ApiError> {
        self.write_gate().await?;
        if let Some(c) = self
            .cards
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == card_id)
        {
            c.lane_id = Some(lane_id.to_string());
        }
        Ok(())
    }

    async fn archive_card(&self, card_id: &str) -> Result<(), ApiError> {
        self.write_gate().await?;
        self.cards.lock().unwrap().retain(|c| c.id != card_id);
        Ok(())
    }

    async fn cast_vote(&self, card_id: &str, user_id: &str, weight: i32) -> Result<(), ApiError> {
        self.write_gate().await?;
        let mut votes = self.votes.lock().unwrap();
        let entry = votes.entry(card_id.to_string()).or_default();
        entry.retain(|v| v.user_id != user_id);
        if weight != 0 {
            entry.push(VoteRecord {
                user_id: user_id.to_string(),
                weight,
            });
        }
        Ok(())
    }

    async fn create_comment(
        &self,
        card_id: &str,
        comment: &NewComment,
    ) -> Result<CommentRecord, ApiError> {
        self.write_gate().await?;
        let record = CommentRecord {
            id: self.next_id("cm"),
            card_id: card_id.to_string(),
            author_id: comment.author_id.clone(),
            content: comment.content.clone(),
            created_at: Utc::now(),
        };
        self.comments
            .lock()
            .unwrap()
            .entry(card_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update_priority(&self, card_id: &str, priority: Priority) -> Result<(), ApiError> {
        self.write_gate().await?;
        if let Some(c) = self
            .cards
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == card_id)
        {
            c.priority = priority;
        }
        Ok(())
    }

    async fn set_assignee(&self, card_id: &str, user_id: Option<&str>) -> Result<(), ApiError> {
        self.write_gate().await?;
        if let Some(c) = self
            .cards
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == card_id)
        {
            c.assignee_id = user_id.map(str::to_string);
        }
        Ok(())
    }

    async fn create_or_find_tag(&self, _board_id: &str, label: &str) -> Result<Tag, ApiError> {
        self.write_gate().await?;
        let mut tags = self.tags.lock().unwrap();
        if let Some(found) = tags.iter().find(|t| t.label == label) {
            return Ok(found.clone());
        }
        let tag = Tag {
            id: self.next_id("t"),
            label: label.to_string(),
            color: None,
        };
        tags.push(tag.clone());
        Ok(tag)
    }

    async fn assign_tag(&self, _card_id: &str, _tag_id: &str) -> Result<(), ApiError> {
        self.write_gate().await
    }

    async fn remove_tag(&self, _card_id: &str, _tag_id: &str) -> Result<(), ApiError> {
        self.write_gate().await
    }
}
