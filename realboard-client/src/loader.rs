//! Snapshot loaders for the board store.
//!
//! `load_lanes` fully replaces the lane list; lane topology is never
//! merged incrementally, which keeps it convergent after any change.
//! `load_cards` fetches the card snapshot and enriches every card
//! concurrently and independently: one card's failing lookups degrade
//! that card to placeholders without blocking its siblings.

use futures_util::future::join_all;
use realboard_core::store::BoardStore;
use realboard_core::types::{Card, CardRecord, Comment, UserIdentity};

use crate::api::{ApiError, BoardApi};
use crate::directory::UserDirectory;

/// Fetch the lane snapshot and replace the store's lane list wholesale.
pub async fn load_lanes<A: BoardApi>(
    api: &A,
    store: &BoardStore,
    board_id: &str,
) -> Result<(), ApiError> {
    let lanes = api.fetch_lanes(board_id).await?;
    log::debug!("[loader] Loaded {} lanes for board {}", lanes.len(), board_id);
    store.replace_lanes(lanes);
    Ok(())
}

/// Fetch the card snapshot and replace the store's cards, enriching each
/// card in parallel. `show_loading` drives the blocking indicator and is
/// set only for the initial full board load.
pub async fn load_cards<A: BoardApi>(
    api: &A,
    store: &BoardStore,
    directory: &UserDirectory,
    board_id: &str,
    show_loading: bool,
) -> Result<(), ApiError> {
    if show_loading {
        store.set_loading(true);
    }
    let result = load_cards_inner(api, store, directory, board_id).await;
    if show_loading {
        store.set_loading(false);
    }
    result
}

async fn load_cards_inner<A: BoardApi>(
    api: &A,
    store: &BoardStore,
    directory: &UserDirectory,
    board_id: &str,
) -> Result<(), ApiError> {
    let records = api.fetch_cards(board_id).await?;
    log::debug!("[loader] Loaded {} cards for board {}", records.len(), board_id);
    let cards = join_all(
        records
            .into_iter()
            .map(|record| enrich_card(api, store, directory, record)),
    )
    .await;
    store.replace_cards(cards);
    Ok(())
}

/// Build a fully enriched card from a raw record. Infallible: each
/// enrichment degrades on its own: identity failures become placeholder
/// names, comment/vote fetch failures become empty lists.
pub async fn enrich_card<A: BoardApi>(
    api: &A,
    store: &BoardStore,
    directory: &UserDirectory,
    record: CardRecord,
) -> Card {
    let lane_id = store.resolve_lane_id(record.lane_id.as_deref());
    let column = store.column_for(Some(&lane_id));

    let (author, comments, (likes, dislikes), assignee) = tokio::join!(
        directory.resolve(api, &record.author_id),
        load_comments(api, directory, &record.id),
        load_vote_rollup(api, directory, &record.id),
        resolve_assignee(api, directory, record.assignee_id.as_deref()),
    );

    Card {
        id: record.id,
        content: record.content,
        author,
        lane_id,
        column,
        priority: record.priority,
        likes,
        dislikes,
        comments,
        assignee,
        tags: record.tags,
        created_at: record.created_at,
    }
}

async fn load_comments<A: BoardApi>(
    api: &A,
    directory: &UserDirectory,
    card_id: &str,
) -> Vec<Comment> {
    let records = match api.fetch_comments(card_id).await {
        Ok(records) => records,
        Err(e) => {
            log::warn!("[loader] Comment fetch failed for card {}: {}", card_id, e);
            return Vec::new();
        }
    };
    let mut comments = Vec::with_capacity(records.len());
    for record in records {
        comments.push(Comment {
            author: directory.resolve(api, &record.author_id).await,
            id: record.id,
            content: record.content,
            created_at: record.created_at,
        });
    }
    comments
}

/// Roll votes up into display-name lists: the sign of each ballot's
/// weight selects the like or dislike list.
async fn load_vote_rollup<A: BoardApi>(
    api: &A,
    directory: &UserDirectory,
    card_id: &str,
) -> (Vec<String>, Vec<String>) {
    let votes = match api.fetch_votes(card_id).await {
        Ok(votes) => votes,
        Err(e) => {
            log::warn!("[loader] Vote fetch failed for card {}: {}", card_id, e);
            return (Vec::new(), Vec::new());
        }
    };
    let mut likes = Vec::new();
    let mut dislikes = Vec::new();
    for vote in votes {
        let name = directory.resolve(api, &vote.user_id).await.name;
        if vote.weight > 0 {
            likes.push(name);
        } else if vote.weight < 0 {
            dislikes.push(name);
        }
    }
    (likes, dislikes)
}

async fn resolve_assignee<A: BoardApi>(
    api: &A,
    directory: &UserDirectory,
    assignee_id: Option<&str>,
) -> Option<UserIdentity> {
    match assignee_id {
        Some(id) => Some(directory.resolve(api, id).await),
        None => None,
    }
}
