//! reqwest implementation of the board API.
//!
//! Endpoint shapes mirror the server's REST surface; every non-2xx
//! response is mapped to `ApiError::Status` with the body preserved for
//! logging at the call site.

use realboard_core::types::{
    CardRecord, CommentRecord, Lane, Priority, Tag, UserIdentity, VoteRecord,
};
use serde::Serialize;

use crate::api::{ApiError, BoardApi, NewCard, NewComment};

pub struct HttpBoardApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBoardApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.client.get(self.url(path)).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let resp = self.client.delete(self.url(path)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveBody<'a> {
    lane_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteBody<'a> {
    user_id: &'a str,
    weight: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PriorityBody {
    priority: Priority,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssigneeBody<'a> {
    user_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagBody<'a> {
    label: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagRefBody<'a> {
    tag_id: &'a str,
}

impl BoardApi for HttpBoardApi {
    async fn fetch_lanes(&self, board_id: &str) -> Result<Vec<Lane>, ApiError> {
        self.get_json(&format!("/boards/{}/lanes", board_id)).await
    }

    async fn fetch_cards(&self, board_id: &str) -> Result<Vec<CardRecord>, ApiError> {
        self.get_json(&format!("/boards/{}/cards", board_id)).await
    }

    async fn fetch_card(&self, card_id: &str) -> Result<CardRecord, ApiError> {
        self.get_json(&format!("/cards/{}", card_id)).await
    }

    async fn fetch_comments(&self, card_id: &str) -> Result<Vec<CommentRecord>, ApiError> {
        self.get_json(&format!("/cards/{}/comments", card_id)).await
    }

    async fn fetch_votes(&self, card_id: &str) -> Result<Vec<VoteRecord>, ApiError> {
        self.get_json(&format!("/cards/{}/votes", card_id)).await
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserIdentity, ApiError> {
        self.get_json(&format!("/users/{}", user_id)).await
    }

    async fn create_card(&self, board_id: &str, card: &NewCard) -> Result<CardRecord, ApiError> {
        self.post_json(&format!("/boards/{}/cards", board_id), card)
            .await
    }

    async fn move_card(&self, card_id: &str, lane_id: &str) -> Result<(), ApiError> {
        self.post_empty(&format!("/cards/{}/move", card_id), &MoveBody { lane_id })
            .await
    }

    async fn archive_card(&self, card_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/cards/{}", card_id)).await
    }

    async fn cast_vote(&self, card_id: &str, user_id: &str, weight: i32) -> Result<(), ApiError> {
        self.post_empty(
            &format!("/cards/{}/votes", card_id),
            &VoteBody { user_id, weight },
        )
        .await
    }

    async fn create_comment(
        &self,
        card_id: &str,
        comment: &NewComment,
    ) -> Result<CommentRecord, ApiError> {
        self.post_json(&format!("/cards/{}/comments", card_id), comment)
            .await
    }

    async fn update_priority(&self, card_id: &str, priority: Priority) -> Result<(), ApiError> {
        self.post_empty(
            &format!("/cards/{}/priority", card_id),
            &PriorityBody { priority },
        )
        .await
    }

    async fn set_assignee(&self, card_id: &str, user_id: Option<&str>) -> Result<(), ApiError> {
        self.post_empty(
            &format!("/cards/{}/assignee", card_id),
            &AssigneeBody { user_id },
        )
        .await
    }

    async fn create_or_find_tag(&self, board_id: &str, label: &str) -> Result<Tag, ApiError> {
        // Safe to repeat: the server matches an existing tag by label
        // before creating one.
        self.post_json(&format!("/boards/{}/tags", board_id), &TagBody { label })
            .await
    }

    async fn assign_tag(&self, card_id: &str, tag_id: &str) -> Result<(), ApiError> {
        self.post_empty(&format!("/cards/{}/tags", card_id), &TagRefBody { tag_id })
            .await
    }

    async fn remove_tag(&self, card_id: &str, tag_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/cards/{}/tags/{}", card_id, tag_id))
            .await
    }
}
