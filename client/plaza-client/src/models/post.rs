use super::{null_as_default, timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    Friends,
    Private,
}

/// Author projection embedded in posts and comments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostAuthor {
    pub full_name: Option<String>,
    pub nick_name: Option<String>,
    pub profile_pic: Option<String>,
}

impl PostAuthor {
    /// Name shown when a profile has not been loaded
    pub fn anonymous() -> Self {
        Self {
            full_name: Some("Anonymous".to_string()),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.nick_name.as_deref())
            .unwrap_or("Anonymous")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Like {
    /// Client-side like, used until the next reload from the backend
    pub fn local(account_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            created_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "profile")]
    pub author: Option<PostAuthor>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    #[default]
    Pending,
    Available,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub key: String,
    /// MIME-like category, e.g. `image/jpeg`
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub status: MediaStatus,
    #[serde(default)]
    pub url: Option<String>,
}

impl Media {
    pub fn is_image(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|t| t.starts_with("image/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    #[serde(default, rename = "profile")]
    pub author: Option<PostAuthor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, rename = "medias", deserialize_with = "null_as_default")]
    pub media: Vec<Media>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub likes: Vec<Like>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
}

impl Post {
    pub fn is_liked_by(&self, account_id: Uuid) -> bool {
        self.likes.iter().any(|like| like.account_id == account_id)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePostRequest {
    pub content: String,
    pub visibility: Visibility,
}

/// One entry of a batch presign request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub file_name: String,
    pub content_type: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub url: String,
    pub key: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
