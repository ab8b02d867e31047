//! Backend API seams
//!
//! Each concern gets its own trait so components depend only on what they
//! call and tests can substitute mocks or fakes per concern.

mod auth;
mod http;
mod message;
mod post;
mod profile;

pub use http::HttpBackend;

use crate::feed::FeedSource;
use crate::media::MediaOwner;
use crate::models::{
    Account, Comment, Conversation, CreatePostRequest, LoginRequest, Media, Message, PageRequest,
    Post, PresignRequest, PresignResponse, Profile, ProfileUpdate, RegisterRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use error_types::ClientResult;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> ClientResult<Account>;

    async fn register(&self, request: &RegisterRequest) -> ClientResult<Account>;

    async fn logout(&self) -> ClientResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn current_profile(&self) -> ClientResult<Profile>;

    async fn list_profiles(&self, page: &PageRequest) -> ClientResult<Vec<Profile>>;

    async fn profile_detail(&self, profile_id: Uuid) -> ClientResult<Profile>;

    async fn search_profiles(&self, name: &str) -> ClientResult<Vec<Profile>>;

    /// Returns the updated profile when the backend echoes it
    async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Option<Profile>>;

    async fn follow(&self, profile_id: Uuid) -> ClientResult<()>;

    async fn avatar_presign(&self, request: &PresignRequest) -> ClientResult<PresignResponse>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostApi: Send + Sync {
    async fn create_post(&self, request: &CreatePostRequest) -> ClientResult<Post>;

    async fn posts_page(&self, source: &FeedSource, page: &PageRequest) -> ClientResult<Vec<Post>>;

    async fn like(&self, post_id: Uuid) -> ClientResult<()>;

    async fn unlike(&self, post_id: Uuid) -> ClientResult<()>;

    /// Returns the stored comment when the backend echoes it
    async fn comment(&self, post_id: Uuid, content: &str) -> ClientResult<Option<Comment>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaApi: Send + Sync {
    /// One presigned target per request, in request order
    async fn presign_batch(&self, requests: &[PresignRequest]) -> ClientResult<Vec<PresignResponse>>;

    async fn upload_object(&self, url: &str, content_type: &str, data: Bytes) -> ClientResult<()>;

    async fn confirm_upload(&self, key: &str) -> ClientResult<()>;

    async fn media_page(&self, owner: &MediaOwner, page: &PageRequest) -> ClientResult<Vec<Media>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// `None` when the two accounts have never exchanged a message
    async fn conversation_with(&self, peer_id: Uuid) -> ClientResult<Option<Conversation>>;

    async fn conversation_messages(&self, conversation_id: Uuid) -> ClientResult<Vec<Message>>;
}
