//! Wire and domain types shared by the client components
//!
//! Field names follow the backend's camelCase JSON. Collections and strings
//! that the backend may send as `null` decode to their empty value.

pub mod account;
pub mod message;
pub mod post;
pub mod profile;
pub mod timestamp;

pub use account::{Account, LoginRequest, RegisterRequest};
pub use message::{Conversation, ConversationRef, Message, MessageContentType, OutboundMessage};
pub use post::{
    Comment, CreatePostRequest, Like, Media, MediaStatus, Post, PostAuthor, PresignRequest,
    PresignResponse, Visibility,
};
pub use profile::{Friend, Profile, ProfileUpdate};

use serde::{Deserialize, Deserializer, Serialize};

/// Paging parameters understood by every list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page_no: u32,
    pub size: u32,
    pub sort_by: String,
    pub ascending: bool,
}

impl PageRequest {
    /// Newest first by creation time
    pub fn newest_first(page_no: u32, size: u32) -> Self {
        Self {
            page_no,
            size,
            sort_by: "createdAt".to_string(),
            ascending: false,
        }
    }
}

/// Decode `null` as `T::default()`
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
