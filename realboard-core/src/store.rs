//! In-memory projection of one board: lanes, cards and presence.
//!
//! The store is mutated only by the action executor (optimistic writes)
//! and the event reconciler (foreign merges). All merge helpers are
//! idempotent or replace wholesale: lane loads fully replace the lane
//! list, card inserts dedup by id, votes and assignees upsert by id.
//! Reads hand out clones so the UI never observes a half-applied change.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::lanes::LaneMapper;
use crate::types::{BoardSnapshot, Card, Lane, UserIdentity};

struct BoardInner {
    lanes: Vec<Lane>,
    mapper: LaneMapper,
    cards: Vec<Card>,
    presence: Vec<UserIdentity>,
    /// Cards with a move write in flight or just confirmed, and when the
    /// marker was set. Entries expire after the grace window.
    moving: HashMap<String, Instant>,
    loading: bool,
}

pub struct BoardStore {
    inner: RwLock<BoardInner>,
    grace_window: Duration,
}

impl BoardStore {
    pub fn new(grace_window: Duration) -> Self {
        Self {
            inner: RwLock::new(BoardInner {
                lanes: Vec::new(),
                mapper: LaneMapper::default(),
                cards: Vec::new(),
                presence: Vec::new(),
                moving: HashMap::new(),
                loading: false,
            }),
            grace_window,
        }
    }

    // Lanes

    /// Replace the lane list wholesale and rebuild the mapper. Columns of
    /// existing cards are recomputed; cards in a lane that no longer
    /// exists are reassigned to the default lane.
    pub fn replace_lanes(&self, mut lanes: Vec<Lane>) {
        lanes.sort_by_key(|l| l.position);
        let mut inner = self.inner.write().unwrap();
        inner.mapper = LaneMapper::from_lanes(&lanes);
        inner.lanes = lanes;
        refresh_columns(&mut inner);
    }

    /// Insert or update a single lane (foreign `lane:created` /
    /// `lane:updated` merge), keeping position order.
    pub fn upsert_lane(&self, lane: Lane) {
        let mut inner = self.inner.write().unwrap();
        match inner.lanes.iter_mut().find(|l| l.id == lane.id) {
            Some(existing) => *existing = lane,
            None => inner.lanes.push(lane),
        }
        inner.lanes.sort_by_key(|l| l.position);
        inner.mapper = LaneMapper::from_lanes(&inner.lanes);
        refresh_columns(&mut inner);
    }

    /// Remove a lane and every card still referencing it. Returns false
    /// when the lane id is unknown (caller falls back to a reload).
    pub fn remove_lane(&self, lane_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let before = inner.lanes.len();
        inner.lanes.retain(|l| l.id != lane_id);
        if inner.lanes.len() == before {
            return false;
        }
        inner.cards.retain(|c| c.lane_id != lane_id);
        inner.mapper = LaneMapper::from_lanes(&inner.lanes);
        refresh_columns(&mut inner);
        true
    }

    pub fn lanes(&self) -> Vec<Lane> {
        self.inner.read().unwrap().lanes.clone()
    }

    pub fn column_for(&self, lane_id: Option<&str>) -> String {
        self.inner.read().unwrap().mapper.column_for(lane_id)
    }

    pub fn resolve_lane_id(&self, lane_id: Option<&str>) -> String {
        self.inner.read().unwrap().mapper.resolve_lane_id(lane_id)
    }

    pub fn has_lane(&self, lane_id: &str) -> bool {
        self.inner.read().unwrap().mapper.contains(lane_id)
    }

    // Cards

    pub fn replace_cards(&self, cards: Vec<Card>) {
        let mut inner = self.inner.write().unwrap();
        inner.cards = cards;
        refresh_columns(&mut inner);
    }

    /// Insert a card unless one with the same id already exists. Returns
    /// false on a duplicate, tolerating at-least-once event delivery.
    pub fn insert_card(&self, card: Card) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.cards.iter().any(|c| c.id == card.id) {
            log::debug!("[store] Skipping duplicate card {}", card.id);
            return false;
        }
        inner.cards.push(card);
        true
    }

    pub fn contains_card(&self, card_id: &str) -> bool {
        self.inner.read().unwrap().cards.iter().any(|c| c.id == card_id)
    }

    pub fn card(&self, card_id: &str) -> Option<Card> {
        self.inner
            .read()
            .unwrap()
            .cards
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
    }

    /// Mutate a card in place, correlating strictly by id. Returns false
    /// when the card is unknown.
    pub fn with_card_mut(&self, card_id: &str, f: impl FnOnce(&mut Card)) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.cards.iter_mut().find(|c| c.id == card_id) {
            Some(card) => {
                f(card);
                true
            }
            None => false,
        }
    }

    pub fn remove_card(&self, card_id: &str) -> Option<Card> {
        let mut inner = self.inner.write().unwrap();
        let idx = inner.cards.iter().position(|c| c.id == card_id)?;
        Some(inner.cards.remove(idx))
    }

    pub fn cards(&self) -> Vec<Card> {
        self.inner.read().unwrap().cards.clone()
    }

    pub fn card_count(&self) -> usize {
        self.inner.read().unwrap().cards.len()
    }

    // Move grace window

    /// Mark a card as having a move in flight or just confirmed. While
    /// marked, reconciliation must not overwrite its lane.
    pub fn mark_moving(&self, card_id: &str) {
        self.inner
            .write()
            .unwrap()
            .moving
            .insert(card_id.to_string(), Instant::now());
    }

    pub fn unmark_moving(&self, card_id: &str) {
        self.inner.write().unwrap().moving.remove(card_id);
    }

    /// Whether a card is inside its move grace window. Expired markers
    /// are pruned lazily here.
    pub fn is_moving(&self, card_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let grace = self.grace_window;
        inner.moving.retain(|_, set_at| set_at.elapsed() < grace);
        inner.moving.contains_key(card_id)
    }

    // Presence

    pub fn replace_presence(&self, users: Vec<UserIdentity>) {
        self.inner.write().unwrap().presence = users;
    }

    pub fn presence(&self) -> Vec<UserIdentity> {
        self.inner.read().unwrap().presence.clone()
    }

    // Read surface

    pub fn set_loading(&self, loading: bool) {
        self.inner.write().unwrap().loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().unwrap().loading
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let inner = self.inner.read().unwrap();
        BoardSnapshot {
            lanes: inner.lanes.clone(),
            cards: inner.cards.clone(),
            presence: inner.presence.clone(),
            loading: inner.loading,
        }
    }
}

/// Recompute every card's column name and reattach cards whose lane no
/// longer exists to the default lane. Keeps the invariant that every
/// card's laneId resolves to a known lane.
fn refresh_columns(inner: &mut BoardInner) {
    for card in &mut inner.cards {
        let lane_id = inner.mapper.resolve_lane_id(Some(&card.lane_id));
        card.column = inner.mapper.column_for(Some(&lane_id));
        card.lane_id = lane_id;
    }
}
