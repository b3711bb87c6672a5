//! Board action executor: user-initiated mutations.
//!
//! Every mutation follows the same shape: capture enough state to invert
//! the change, apply it to the store before the first await (zero-latency
//! local feedback), issue the write, then either patch locally fabricated
//! fields with the canonical ones (correlating strictly by id, never by
//! array position) or restore the captured state exactly. A failed write
//! never leaves a partially applied mutation behind.

use std::sync::Arc;

use chrono::Utc;
use realboard_core::store::BoardStore;
use realboard_core::types::{
    Card, Comment, Priority, Tag, UserIdentity, VoteKind, TEMP_ID_PREFIX,
};

use crate::api::{ApiError, BoardApi, NewCard, NewComment};
use crate::directory::UserDirectory;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The write failed; the optimistic change has already been rolled
    /// back when this is returned.
    #[error("Write failed (rolled back): {0}")]
    WriteFailed(#[from] ApiError),

    #[error("Unknown card: {0}")]
    UnknownCard(String),

    #[error("Unknown lane: {0}")]
    UnknownLane(String),
}

pub struct ActionExecutor<A: BoardApi> {
    api: Arc<A>,
    store: Arc<BoardStore>,
    directory: Arc<UserDirectory>,
    board_id: String,
    local_user: UserIdentity,
}

impl<A: BoardApi> ActionExecutor<A> {
    pub fn new(
        api: Arc<A>,
        store: Arc<BoardStore>,
        directory: Arc<UserDirectory>,
        board_id: impl Into<String>,
        local_user: UserIdentity,
    ) -> Self {
        Self {
            api,
            store,
            directory,
            board_id: board_id.into(),
            local_user,
        }
    }

    pub fn local_user(&self) -> &UserIdentity {
        &self.local_user
    }

    /// Create a card optimistically under a temporary id, then swap in
    /// the canonical id and timestamp on write success. Returns the
    /// canonical id.
    pub async fn add_card(
        &self,
        content: &str,
        lane_id: &str,
        priority: Priority,
    ) -> Result<String, ActionError> {
        if !self.store.has_lane(lane_id) {
            return Err(ActionError::UnknownLane(lane_id.to_string()));
        }
        let temp_id = format!("{}{}", TEMP_ID_PREFIX, Utc::now().timestamp_millis());
        let card = Card {
            id: temp_id.clone(),
            content: content.to_string(),
            author: self.local_user.clone(),
            lane_id: lane_id.to_string(),
            column: self.store.column_for(Some(lane_id)),
            priority,
            likes: vec![],
            dislikes: vec![],
            comments: vec![],
            assignee: None,
            tags: vec![],
            created_at: Utc::now(),
        };
        self.store.insert_card(card);

        let new_card = NewCard {
            content: content.to_string(),
            lane_id: lane_id.to_string(),
            priority,
            author_id: self.local_user.id.clone(),
        };
        match self.api.create_card(&self.board_id, &new_card).await {
            Ok(record) => {
                let canonical = record.id.clone();
                self.store.with_card_mut(&temp_id, |c| {
                    c.id = record.id;
                    c.created_at = record.created_at;
                });
                log::debug!("[actions] Card {} confirmed as {}", temp_id, canonical);
                Ok(canonical)
            }
            Err(e) => {
                self.store.remove_card(&temp_id);
                log::warn!("[actions] Card create failed, rolled back: {}", e);
                Err(e.into())
            }
        }
    }

    /// Move a card to another lane. On write success the card is marked
    /// "moving" for the grace window so a stale server echo cannot revert
    /// a move already visible locally.
    pub async fn move_card(&self, card_id: &str, target_lane_id: &str) -> Result<(), ActionError> {
        let previous = self
            .store
            .card(card_id)
            .ok_or_else(|| ActionError::UnknownCard(card_id.to_string()))?;
        if !self.store.has_lane(target_lane_id) {
            return Err(ActionError::UnknownLane(target_lane_id.to_string()));
        }

        let column = self.store.column_for(Some(target_lane_id));
        self.store.with_card_mut(card_id, |c| {
            c.lane_id = target_lane_id.to_string();
            c.column = column;
        });
        // Marked before the write: stale lane events arriving while the
        // write is in flight must not clobber the optimistic lane.
        self.store.mark_moving(card_id);

        match self.api.move_card(card_id, target_lane_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store.unmark_moving(card_id);
                self.store.with_card_mut(card_id, |c| {
                    c.lane_id = previous.lane_id;
                    c.column = previous.column;
                });
                log::warn!("[actions] Move of {} failed, rolled back: {}", card_id, e);
                Err(e.into())
            }
        }
    }

    /// Archive a card: removed from the active set outright, reinserted
    /// only if the write fails.
    pub async fn delete_card(&self, card_id: &str) -> Result<(), ActionError> {
        let removed = self
            .store
            .remove_card(card_id)
            .ok_or_else(|| ActionError::UnknownCard(card_id.to_string()))?;

        match self.api.archive_card(card_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store.insert_card(removed);
                log::warn!("[actions] Archive of {} failed, rolled back: {}", card_id, e);
                Err(e.into())
            }
        }
    }

    /// Toggle the local user's vote. Same-polarity revote removes the
    /// vote, opposite polarity replaces it; the user is never in both
    /// lists at once.
    pub async fn vote(&self, card_id: &str, kind: VoteKind) -> Result<(), ActionError> {
        let previous = self
            .store
            .card(card_id)
            .ok_or_else(|| ActionError::UnknownCard(card_id.to_string()))?;

        let mut weight = 0;
        self.store.with_card_mut(card_id, |c| {
            weight = c.toggle_vote(&self.local_user.name, kind);
        });

        match self
            .api
            .cast_vote(card_id, &self.local_user.id, weight)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store.with_card_mut(card_id, |c| {
                    c.likes = previous.likes;
                    c.dislikes = previous.dislikes;
                });
                log::warn!("[actions] Vote on {} failed, rolled back: {}", card_id, e);
                Err(e.into())
            }
        }
    }

    /// Add a comment with a temporary id; patched to the canonical id and
    /// timestamp by id correlation on success.
    pub async fn add_comment(&self, card_id: &str, content: &str) -> Result<String, ActionError> {
        if !self.store.contains_card(card_id) {
            return Err(ActionError::UnknownCard(card_id.to_string()));
        }
        let temp_id = format!("{}{}", TEMP_ID_PREFIX, Utc::now().timestamp_millis());
        let comment = Comment {
            id: temp_id.clone(),
            author: self.local_user.clone(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.store
            .with_card_mut(card_id, |c| c.comments.push(comment));

        let new_comment = NewComment {
            content: content.to_string(),
            author_id: self.local_user.id.clone(),
        };
        match self.api.create_comment(card_id, &new_comment).await {
            Ok(record) => {
                let canonical = record.id.clone();
                self.store.with_card_mut(card_id, |c| {
                    if let Some(cm) = c.comments.iter_mut().find(|cm| cm.id == temp_id) {
                        cm.id = record.id;
                        cm.created_at = record.created_at;
                    }
                });
                Ok(canonical)
            }
            Err(e) => {
                self.store
                    .with_card_mut(card_id, |c| c.comments.retain(|cm| cm.id != temp_id));
                log::warn!("[actions] Comment on {} failed, rolled back: {}", card_id, e);
                Err(e.into())
            }
        }
    }

    pub async fn change_priority(
        &self,
        card_id: &str,
        priority: Priority,
    ) -> Result<(), ActionError> {
        let previous = self
            .store
            .card(card_id)
            .ok_or_else(|| ActionError::UnknownCard(card_id.to_string()))?;

        self.store.with_card_mut(card_id, |c| c.priority = priority);

        match self.api.update_priority(card_id, priority).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store
                    .with_card_mut(card_id, |c| c.priority = previous.priority);
                log::warn!(
                    "[actions] Priority change on {} failed, rolled back: {}",
                    card_id,
                    e
                );
                Err(e.into())
            }
        }
    }

    /// Assign a user to a card, or clear the assignee with `None`.
    pub async fn assign_user(
        &self,
        card_id: &str,
        user_id: Option<&str>,
    ) -> Result<(), ActionError> {
        let previous = self
            .store
            .card(card_id)
            .ok_or_else(|| ActionError::UnknownCard(card_id.to_string()))?;

        let assignee = match user_id {
            Some(id) => Some(self.directory.resolve(self.api.as_ref(), id).await),
            None => None,
        };
        self.store
            .with_card_mut(card_id, |c| c.assignee = assignee);

        match self.api.set_assignee(card_id, user_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store
                    .with_card_mut(card_id, |c| c.assignee = previous.assignee);
                log::warn!("[actions] Assign on {} failed, rolled back: {}", card_id, e);
                Err(e.into())
            }
        }
    }

    /// Two-phase tag add: create-or-find the tag by label (safe to
    /// repeat), then attach it to the card. The optimistic tag survives
    /// only if both phases succeed.
    pub async fn add_tag(&self, card_id: &str, label: &str) -> Result<Tag, ActionError> {
        let previous = self
            .store
            .card(card_id)
            .ok_or_else(|| ActionError::UnknownCard(card_id.to_string()))?;

        let temp_id = format!("{}{}", TEMP_ID_PREFIX, Utc::now().timestamp_millis());
        self.store.with_card_mut(card_id, |c| {
            c.tags.push(Tag {
                id: temp_id.clone(),
                label: label.to_string(),
                color: None,
            })
        });

        let rollback = |e: ApiError| {
            self.store
                .with_card_mut(card_id, |c| c.tags = previous.tags.clone());
            log::warn!("[actions] Tag add on {} failed, rolled back: {}", card_id, e);
            ActionError::WriteFailed(e)
        };

        let tag = match self.api.create_or_find_tag(&self.board_id, label).await {
            Ok(tag) => tag,
            Err(e) => return Err(rollback(e)),
        };
        if let Err(e) = self.api.assign_tag(card_id, &tag.id).await {
            return Err(rollback(e));
        }

        let canonical = tag.clone();
        self.store.with_card_mut(card_id, |c| {
            if let Some(t) = c.tags.iter_mut().find(|t| t.id == temp_id) {
                *t = canonical;
            }
        });
        Ok(tag)
    }

    pub async fn remove_tag(&self, card_id: &str, tag_id: &str) -> Result<(), ActionError> {
        let previous = self
            .store
            .card(card_id)
            .ok_or_else(|| ActionError::UnknownCard(card_id.to_string()))?;

        self.store
            .with_card_mut(card_id, |c| c.tags.retain(|t| t.id != tag_id));

        match self.api.remove_tag(card_id, tag_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store
                    .with_card_mut(card_id, |c| c.tags = previous.tags);
                log::warn!(
                    "[actions] Tag removal on {} failed, rolled back: {}",
                    card_id,
                    e
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockApi;
    use realboard_core::types::Lane;
    use std::time::Duration;

    fn fixture() -> ActionExecutor<MockApi> {
        let lanes = vec![
            Lane {
                id: "l-1".into(),
                name: "ideas".into(),
                position: 0,
            },
            Lane {
                id: "l-2".into(),
                name: "discuss".into(),
                position: 1,
            },
        ];
        let api = Arc::new(MockApi::new());
        api.set_lanes(lanes.clone());
        let store = Arc::new(BoardStore::new(Duration::from_secs(3)));
        store.replace_lanes(lanes);
        ActionExecutor::new(
            api,
            store,
            Arc::new(UserDirectory::new()),
            "b-1",
            UserIdentity::new("u-1", "Ada"),
        )
    }

    fn store(exec: &ActionExecutor<MockApi>) -> &BoardStore {
        &exec.store
    }

    #[tokio::test]
    async fn test_add_card_swaps_temp_for_canonical() {
        let exec = fixture();
        let id = exec.add_card("hello", "l-1", Priority::High).await.unwrap();
        assert!(!id.starts_with(TEMP_ID_PREFIX));
        assert_eq!(store(&exec).card_count(), 1);
        let card = store(&exec).card(&id).unwrap();
        assert_eq!(card.column, "ideas");
        assert_eq!(card.author.name, "Ada");
    }

    #[tokio::test]
    async fn test_add_card_rolls_back_on_failure() {
        let exec = fixture();
        exec.api.set_fail_writes(true);
        assert!(exec.add_card("hello", "l-1", Priority::Low).await.is_err());
        assert_eq!(store(&exec).card_count(), 0);
    }

    #[tokio::test]
    async fn test_move_card_marks_moving() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        exec.move_card(&id, "l-2").await.unwrap();
        let card = store(&exec).card(&id).unwrap();
        assert_eq!(card.column, "discuss");
        assert!(store(&exec).is_moving(&id));
    }

    #[tokio::test]
    async fn test_move_card_rolls_back_on_failure() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        exec.api.set_fail_writes(true);
        assert!(exec.move_card(&id, "l-2").await.is_err());
        let card = store(&exec).card(&id).unwrap();
        assert_eq!(card.lane_id, "l-1");
        assert_eq!(card.column, "ideas");
        assert!(!store(&exec).is_moving(&id));
    }

    #[tokio::test]
    async fn test_delete_card_restores_on_failure() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        exec.api.set_fail_writes(true);
        assert!(exec.delete_card(&id).await.is_err());
        assert!(store(&exec).contains_card(&id));
        exec.api.set_fail_writes(false);
        exec.delete_card(&id).await.unwrap();
        assert!(!store(&exec).contains_card(&id));
    }

    #[tokio::test]
    async fn test_vote_toggle_sequence() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();

        exec.vote(&id, VoteKind::Up).await.unwrap();
        assert_eq!(store(&exec).card(&id).unwrap().likes, vec!["Ada"]);

        exec.vote(&id, VoteKind::Up).await.unwrap();
        assert!(store(&exec).card(&id).unwrap().likes.is_empty());

        exec.vote(&id, VoteKind::Down).await.unwrap();
        let card = store(&exec).card(&id).unwrap();
        assert!(card.likes.is_empty());
        assert_eq!(card.dislikes, vec!["Ada"]);
    }

    #[tokio::test]
    async fn test_vote_rolls_back_exactly() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        exec.vote(&id, VoteKind::Up).await.unwrap();
        let before = store(&exec).card(&id).unwrap();

        exec.api.set_fail_writes(true);
        assert!(exec.vote(&id, VoteKind::Down).await.is_err());
        assert_eq!(store(&exec).card(&id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_add_comment_patches_canonical_id() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        let comment_id = exec.add_comment(&id, "nice one").await.unwrap();
        let card = store(&exec).card(&id).unwrap();
        assert_eq!(card.comments.len(), 1);
        assert_eq!(card.comments[0].id, comment_id);
        assert!(!comment_id.starts_with(TEMP_ID_PREFIX));
    }

    #[tokio::test]
    async fn test_change_priority_rolls_back() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Low).await.unwrap();
        exec.api.set_fail_writes(true);
        assert!(exec.change_priority(&id, Priority::Urgent).await.is_err());
        assert_eq!(store(&exec).card(&id).unwrap().priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_assign_and_unassign() {
        let exec = fixture();
        exec.api.add_user(UserIdentity::new("u-2", "Grace"));
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();

        exec.assign_user(&id, Some("u-2")).await.unwrap();
        assert_eq!(
            store(&exec).card(&id).unwrap().assignee.unwrap().name,
            "Grace"
        );

        exec.assign_user(&id, None).await.unwrap();
        assert!(store(&exec).card(&id).unwrap().assignee.is_none());
    }

    #[tokio::test]
    async fn test_add_tag_two_phase() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        let tag = exec.add_tag(&id, "infra").await.unwrap();
        let card = store(&exec).card(&id).unwrap();
        assert_eq!(card.tags.len(), 1);
        assert_eq!(card.tags[0].id, tag.id);
        assert!(!card.tags[0].id.starts_with(TEMP_ID_PREFIX));

        // Repeating the label reuses the server-side tag.
        let id2 = exec.add_card("y", "l-1", Priority::Medium).await.unwrap();
        let tag2 = exec.add_tag(&id2, "infra").await.unwrap();
        assert_eq!(tag.id, tag2.id);
    }

    #[tokio::test]
    async fn test_add_tag_rolls_back_on_failure() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        exec.api.set_fail_writes(true);
        assert!(exec.add_tag(&id, "infra").await.is_err());
        assert!(store(&exec).card(&id).unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn test_remove_tag_rolls_back_on_failure() {
        let exec = fixture();
        let id = exec.add_card("x", "l-1", Priority::Medium).await.unwrap();
        let tag = exec.add_tag(&id, "infra").await.unwrap();
        exec.api.set_fail_writes(true);
        assert!(exec.remove_tag(&id, &tag.id).await.is_err());
        assert_eq!(store(&exec).card(&id).unwrap().tags.len(), 1);
    }
}
