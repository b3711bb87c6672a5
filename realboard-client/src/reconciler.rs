//! Event reconciler: merges pushed server events into the local store.
//!
//! Classification per event:
//! - self-originated (actor id equals the local user id): dropped, the
//!   change was already applied optimistically;
//! - foreign with a minimal payload (vote, assignee, presence): patched
//!   in place on the specific card or presence entry;
//! - foreign structural (card/lane create/update/move/delete): patched
//!   in place when the payload suffices, otherwise a scoped reload.
//!   Lanes always reload before cards, since column resolution depends on the
//!   current lane list.
//!
//! Delivery is at-least-once and unordered, so every merge here is
//! idempotent: inserts dedup by canonical id, votes and assignees upsert,
//! presence replaces the whole set.

use std::sync::Arc;

use realboard_core::events::ServerEvent;
use realboard_core::store::BoardStore;
use realboard_core::types::Comment;
use tokio::sync::mpsc;

use crate::api::BoardApi;
use crate::directory::UserDirectory;
use crate::loader;

pub struct Reconciler<A: BoardApi> {
    api: Arc<A>,
    store: Arc<BoardStore>,
    directory: Arc<UserDirectory>,
    board_id: String,
    local_user_id: String,
    /// Events the board store does not own (chat, notifications) are
    /// forwarded here for the embedding application.
    app_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
}

impl<A: BoardApi> Reconciler<A> {
    pub fn new(
        api: Arc<A>,
        store: Arc<BoardStore>,
        directory: Arc<UserDirectory>,
        board_id: impl Into<String>,
        local_user_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            store,
            directory,
            board_id: board_id.into(),
            local_user_id: local_user_id.into(),
            app_tx: None,
        }
    }

    /// Route chat/notification events to the embedding application.
    pub fn set_app_channel(&mut self, tx: mpsc::UnboundedSender<ServerEvent>) {
        self.app_tx = Some(tx);
    }

    /// Merge one pushed event. Failures inside are logged and converted
    /// into compensating reloads; nothing propagates to the caller.
    pub async fn handle(&self, event: ServerEvent) {
        if event.actor() == Some(self.local_user_id.as_str()) {
            log::debug!("[reconciler] Ignoring own {} echo", event.name());
            return;
        }

        match event {
            ServerEvent::CardCreated(p) => {
                if self.store.contains_card(&p.card.id) {
                    log::debug!("[reconciler] Duplicate card:created for {}", p.card.id);
                    return;
                }
                let card =
                    loader::enrich_card(self.api.as_ref(), &self.store, &self.directory, p.card)
                        .await;
                self.store.insert_card(card);
            }
            ServerEvent::CardUpdated(p) => {
                let moving = self.store.is_moving(&p.card.id);
                let lane_id = self.store.resolve_lane_id(p.card.lane_id.as_deref());
                let column = self.store.column_for(Some(&lane_id));
                let patched = self.store.with_card_mut(&p.card.id, |c| {
                    c.content = p.card.content.clone();
                    c.priority = p.card.priority;
                    c.tags = p.card.tags.clone();
                    if !moving {
                        c.lane_id = lane_id;
                        c.column = column;
                    }
                });
                if !patched {
                    self.reload_cards().await;
                }
            }
            ServerEvent::CardMoved(p) => {
                if self.store.is_moving(&p.card_id) {
                    log::debug!(
                        "[reconciler] Card {} inside move grace window, skipping",
                        p.card_id
                    );
                    return;
                }
                if !self.store.has_lane(&p.target_lane_id) {
                    self.reload_lanes_then_cards().await;
                    return;
                }
                let column = self.store.column_for(Some(&p.target_lane_id));
                let patched = self.store.with_card_mut(&p.card_id, |c| {
                    c.lane_id = p.target_lane_id.clone();
                    c.column = column;
                });
                if !patched {
                    self.reload_cards().await;
                }
            }
            ServerEvent::CardArchived(p) => {
                if self.store.remove_card(&p.card_id).is_none() {
                    log::debug!("[reconciler] Archive for unknown card {}", p.card_id);
                }
            }
            ServerEvent::CardUnarchived(p) => {
                // The payload carries only the id; fetch the record and
                // reinsert (insert dedups if a reload raced us).
                match self.api.fetch_card(&p.card_id).await {
                    Ok(record) => {
                        let card = loader::enrich_card(
                            self.api.as_ref(),
                            &self.store,
                            &self.directory,
                            record,
                        )
                        .await;
                        self.store.insert_card(card);
                    }
                    Err(e) => {
                        log::warn!(
                            "[reconciler] Unarchive fetch for {} failed: {}",
                            p.card_id,
                            e
                        );
                        self.reload_cards().await;
                    }
                }
            }
            ServerEvent::CommentCreated(p) => {
                let author = self
                    .directory
                    .resolve(self.api.as_ref(), &p.comment.author_id)
                    .await;
                let comment = Comment {
                    id: p.comment.id,
                    author,
                    content: p.comment.content,
                    created_at: p.comment.created_at,
                };
                let patched = self.store.with_card_mut(&p.comment.card_id, |c| {
                    if !c.comments.iter().any(|cm| cm.id == comment.id) {
                        c.comments.push(comment);
                    }
                });
                if !patched {
                    self.reload_cards().await;
                }
            }
            ServerEvent::VoteChanged(p) => {
                let name = self
                    .directory
                    .resolve(self.api.as_ref(), &p.user_id)
                    .await
                    .name;
                let patched = self
                    .store
                    .with_card_mut(&p.card_id, |c| c.set_vote(&name, p.weight));
                if !patched {
                    self.reload_cards().await;
                }
            }
            ServerEvent::AssigneeAdded(p) | ServerEvent::AssigneeRemoved(p) => {
                let assignee = match p.assignee_id.as_deref() {
                    Some(id) => Some(self.directory.resolve(self.api.as_ref(), id).await),
                    None => None,
                };
                let patched = self
                    .store
                    .with_card_mut(&p.card_id, |c| c.assignee = assignee);
                if !patched {
                    self.reload_cards().await;
                }
            }
            ServerEvent::PresenceUpdate(p) => {
                let users = self
                    .directory
                    .resolve_all(self.api.as_ref(), &p.user_ids)
                    .await;
                self.store.replace_presence(users);
            }
            ServerEvent::LaneCreated(p) | ServerEvent::LaneUpdated(p) => {
                self.store.upsert_lane(p.lane);
            }
            ServerEvent::LaneDeleted(p) => {
                // In-place filter is the authoritative path: drop the lane
                // and every card in it. Unknown lane means our topology is
                // stale, so reload lanes before cards.
                if !self.store.remove_lane(&p.lane_id) {
                    log::warn!(
                        "[reconciler] lane:deleted for unknown lane {}, reloading",
                        p.lane_id
                    );
                    self.reload_lanes_then_cards().await;
                }
            }
            ev @ (ServerEvent::ChatMessageSent(_)
            | ServerEvent::ChatMessageDeleted(_)
            | ServerEvent::NotificationCreated(_)) => {
                if let Some(tx) = &self.app_tx {
                    let _ = tx.send(ev);
                }
            }
        }
    }

    /// Full scoped reload after reconnection or ambiguity: lanes first,
    /// then cards.
    pub async fn reload_lanes_then_cards(&self) {
        if let Err(e) = loader::load_lanes(self.api.as_ref(), &self.store, &self.board_id).await {
            log::warn!("[reconciler] Lane reload failed: {}", e);
            return;
        }
        self.reload_cards().await;
    }

    async fn reload_cards(&self) {
        // Background reconciliation reload: never shows the blocking
        // loading indicator.
        if let Err(e) = loader::load_cards(
            self.api.as_ref(),
            &self.store,
            &self.directory,
            &self.board_id,
            false,
        )
        .await
        {
            log::warn!("[reconciler] Card reload failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockApi;
    use chrono::Utc;
    use realboard_core::events::{
        CardMovedPayload, CardPayload, CardRefPayload, CommentPayload, LaneRefPayload,
        PresencePayload, VotePayload,
    };
    use realboard_core::types::{Card, CardRecord, CommentRecord, Lane, Priority, UserIdentity};
    use std::time::Duration;

    fn lane(id: &str, name: &str, position: i32) -> Lane {
        Lane {
            id: id.into(),
            name: name.into(),
            position,
        }
    }

    fn record(id: &str, lane_id: &str, author: &str) -> CardRecord {
        CardRecord {
            id: id.into(),
            content: "x".into(),
            author_id: author.into(),
            lane_id: Some(lane_id.into()),
            priority: Priority::Medium,
            assignee_id: None,
            tags: vec![],
            created_at: Utc::now(),
        }
    }

    fn card(id: &str, lane_id: &str, column: &str) -> Card {
        Card {
            id: id.into(),
            content: "x".into(),
            author: UserIdentity::new("u-2", "Grace"),
            lane_id: lane_id.into(),
            column: column.into(),
            priority: Priority::Medium,
            likes: vec![],
            dislikes: vec![],
            comments: vec![],
            assignee: None,
            tags: vec![],
            created_at: Utc::now(),
        }
    }

    fn fixture() -> Reconciler<MockApi> {
        let api = Arc::new(MockApi::new());
        api.set_lanes(vec![lane("l-1", "ideas", 0), lane("l-2", "discuss", 1)]);
        api.add_user(UserIdentity::new("u-2", "Grace"));
        let store = Arc::new(BoardStore::new(Duration::from_millis(50)));
        store.replace_lanes(vec![lane("l-1", "ideas", 0), lane("l-2", "discuss", 1)]);
        Reconciler::new(api, store, Arc::new(UserDirectory::new()), "b-1", "u-1")
    }

    #[tokio::test]
    async fn test_duplicate_card_created_inserts_once() {
        let rec = fixture();
        let payload = CardPayload {
            card: record("c-9", "l-1", "u-2"),
            user_id: Some("u-2".into()),
        };
        rec.handle(ServerEvent::CardCreated(payload.clone())).await;
        rec.handle(ServerEvent::CardCreated(payload)).await;
        assert_eq!(rec.store.card_count(), 1);
    }

    #[tokio::test]
    async fn test_self_originated_event_ignored() {
        let rec = fixture();
        rec.handle(ServerEvent::CardCreated(CardPayload {
            card: record("c-9", "l-1", "u-1"),
            user_id: Some("u-1".into()),
        }))
        .await;
        assert_eq!(rec.store.card_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_move_patches_column() {
        let rec = fixture();
        rec.store.insert_card(card("c-1", "l-1", "ideas"));
        rec.handle(ServerEvent::CardMoved(CardMovedPayload {
            card_id: "c-1".into(),
            target_lane_id: "l-2".into(),
            user_id: Some("u-2".into()),
        }))
        .await;
        let c = rec.store.card("c-1").unwrap();
        assert_eq!(c.column, "discuss");
    }

    #[tokio::test]
    async fn test_move_suppressed_inside_grace_window() {
        let rec = fixture();
        rec.store.insert_card(card("c-1", "l-2", "discuss"));
        rec.store.mark_moving("c-1");

        rec.handle(ServerEvent::CardMoved(CardMovedPayload {
            card_id: "c-1".into(),
            target_lane_id: "l-1".into(),
            user_id: Some("u-2".into()),
        }))
        .await;
        assert_eq!(rec.store.card("c-1").unwrap().column, "discuss");

        // After the window elapses the same event applies again.
        tokio::time::sleep(Duration::from_millis(60)).await;
        rec.handle(ServerEvent::CardMoved(CardMovedPayload {
            card_id: "c-1".into(),
            target_lane_id: "l-1".into(),
            user_id: Some("u-2".into()),
        }))
        .await;
        assert_eq!(rec.store.card("c-1").unwrap().column, "ideas");
    }

    #[tokio::test]
    async fn test_update_on_moving_card_patches_content_but_not_lane() {
        let rec = fixture();
        rec.store.insert_card(card("c-1", "l-2", "discuss"));
        rec.store.mark_moving("c-1");

        let mut stale = record("c-1", "l-1", "u-2");
        stale.content = "edited".into();
        rec.handle(ServerEvent::CardUpdated(CardPayload {
            card: stale,
            user_id: Some("u-2".into()),
        }))
        .await;

        let c = rec.store.card("c-1").unwrap();
        assert_eq!(c.content, "edited");
        assert_eq!(c.lane_id, "l-2");
        assert_eq!(c.column, "discuss");
    }

    #[tokio::test]
    async fn test_unarchived_refetches_and_reinserts_once() {
        let rec = fixture();
        rec.api.add_card_record(record("c-1", "l-2", "u-2"));

        let event = ServerEvent::CardUnarchived(CardRefPayload {
            card_id: "c-1".into(),
            user_id: Some("u-2".into()),
        });
        rec.handle(event.clone()).await;
        rec.handle(event).await;

        assert_eq!(rec.store.card_count(), 1);
        let c = rec.store.card("c-1").unwrap();
        assert_eq!(c.column, "discuss");
        assert_eq!(c.author.name, "Grace");
    }

    #[tokio::test]
    async fn test_duplicate_comment_created_inserts_once() {
        let rec = fixture();
        rec.store.insert_card(card("c-1", "l-1", "ideas"));
        let comment = CommentRecord {
            id: "cm-1".into(),
            card_id: "c-1".into(),
            author_id: "u-2".into(),
            content: "looks good".into(),
            created_at: Utc::now(),
        };
        rec.api.add_comment_record(comment.clone());

        let event = ServerEvent::CommentCreated(CommentPayload {
            comment,
            user_id: Some("u-2".into()),
        });
        rec.handle(event.clone()).await;
        rec.handle(event).await;

        let c = rec.store.card("c-1").unwrap();
        assert_eq!(c.comments.len(), 1);
        assert_eq!(c.comments[0].author.name, "Grace");
        assert_eq!(c.comments[0].content, "looks good");
    }

    #[tokio::test]
    async fn test_vote_changed_patches_in_place() {
        let rec = fixture();
        rec.store.insert_card(card("c-1", "l-1", "ideas"));
        rec.handle(ServerEvent::VoteChanged(VotePayload {
            card_id: "c-1".into(),
            user_id: "u-2".into(),
            weight: 1,
        }))
        .await;
        assert_eq!(rec.store.card("c-1").unwrap().likes, vec!["Grace"]);

        rec.handle(ServerEvent::VoteChanged(VotePayload {
            card_id: "c-1".into(),
            user_id: "u-2".into(),
            weight: -1,
        }))
        .await;
        let c = rec.store.card("c-1").unwrap();
        assert!(c.likes.is_empty());
        assert_eq!(c.dislikes, vec!["Grace"]);
    }

    #[tokio::test]
    async fn test_archived_removes_card() {
        let rec = fixture();
        rec.store.insert_card(card("c-1", "l-1", "ideas"));
        rec.handle(ServerEvent::CardArchived(CardRefPayload {
            card_id: "c-1".into(),
            user_id: Some("u-2".into()),
        }))
        .await;
        assert_eq!(rec.store.card_count(), 0);
    }

    #[tokio::test]
    async fn test_lane_deleted_drops_lane_and_cards() {
        let rec = fixture();
        rec.store.insert_card(card("c-1", "l-2", "discuss"));
        rec.store.insert_card(card("c-2", "l-2", "discuss"));
        rec.store.insert_card(card("c-3", "l-1", "ideas"));

        rec.handle(ServerEvent::LaneDeleted(LaneRefPayload {
            lane_id: "l-2".into(),
            user_id: Some("u-2".into()),
        }))
        .await;

        assert!(rec.store.lanes().iter().all(|l| l.id != "l-2"));
        let cards = rec.store.cards();
        assert_eq!(cards.len(), 1);
        assert!(cards.iter().all(|c| c.lane_id != "l-2"));
    }

    #[tokio::test]
    async fn test_lane_deleted_unknown_reloads_scoped() {
        let rec = fixture();
        // Server topology no longer includes l-2; our local copy does.
        rec.api.set_lanes(vec![lane("l-1", "ideas", 0)]);
        rec.store.insert_card(card("c-1", "l-1", "ideas"));

        rec.handle(ServerEvent::LaneDeleted(LaneRefPayload {
            lane_id: "l-ghost".into(),
            user_id: Some("u-2".into()),
        }))
        .await;

        assert_eq!(rec.store.lanes().len(), 1);
    }

    #[tokio::test]
    async fn test_presence_update_resolves_identities() {
        let rec = fixture();
        rec.handle(ServerEvent::PresenceUpdate(PresencePayload {
            user_ids: vec!["u-2".into(), "u-missing-abc".into()],
        }))
        .await;
        let presence = rec.store.presence();
        assert_eq!(presence.len(), 2);
        assert_eq!(presence[0].name, "Grace");
        assert_eq!(presence[1].name, "u-missin…");
    }

    #[tokio::test]
    async fn test_chat_events_forwarded_not_stored() {
        let mut rec = fixture();
        let (tx, mut rx) = mpsc::unbounded_channel();
        rec.set_app_channel(tx);
        rec.handle(ServerEvent::ChatMessageSent(
            realboard_core::events::ChatMessagePayload {
                id: "m-1".into(),
                author_id: "u-2".into(),
                content: "hi".into(),
                created_at: Utc::now(),
            },
        ))
        .await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::ChatMessageSent(_)
        ));
        assert_eq!(rec.store.card_count(), 0);
    }
}
