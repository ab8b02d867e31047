//! Feed synchronization
//!
//! A [`FeedSynchronizer`] owns the ordering and pagination of one feed
//! source. Post state itself lives in the shared [`PostStore`]; likes and
//! comments are applied there optimistically and rolled back when the
//! backend rejects them.

pub mod mutation;
pub mod pager;
pub mod store;

pub use mutation::{Mutation, MutationKind, MutationLog, MutationState};
pub use pager::{LoadOutcome, LoadPhase};
pub use store::{LikeChange, PostStore};

use crate::api::PostApi;
use crate::media::{MediaUploader, UploadFile, UploadReport};
use crate::models::{Comment, CreatePostRequest, Like, PageRequest, Post, PostAuthor, Visibility};
use crate::profile::ProfileStore;
use crate::session::SessionStore;
use chrono::Utc;
use error_types::{ClientError, ClientResult};
use pager::{PageTicket, Pager};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where a feed's posts come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedSource {
    /// Posts visible to the signed-in account
    Home,
    /// Posts written by the signed-in account
    Mine,
    /// Posts written by another account
    User(Uuid),
}

impl FeedSource {
    pub fn path(&self) -> String {
        match self {
            FeedSource::Home => "/post/feeds".to_string(),
            FeedSource::Mine => "/post/user/me".to_string(),
            FeedSource::User(id) => format!("/post/user/{id}"),
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Home => write!(f, "home"),
            FeedSource::Mine => write!(f, "mine"),
            FeedSource::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Result of [`FeedSynchronizer::create_post`]
#[derive(Debug, Clone)]
pub struct CreatedPost {
    pub post: Post,
    pub uploads: UploadReport,
}

pub struct FeedSynchronizer {
    source: FeedSource,
    api: Arc<dyn PostApi>,
    uploader: Arc<MediaUploader>,
    store: Arc<PostStore>,
    session: Arc<SessionStore>,
    profile: Arc<ProfileStore>,
    pager: Mutex<Pager<Uuid>>,
    mutations: Mutex<MutationLog>,
}

impl FeedSynchronizer {
    pub fn new(
        source: FeedSource,
        page_size: u32,
        api: Arc<dyn PostApi>,
        uploader: Arc<MediaUploader>,
        store: Arc<PostStore>,
        session: Arc<SessionStore>,
        profile: Arc<ProfileStore>,
    ) -> Self {
        Self {
            source,
            api,
            uploader,
            store,
            session,
            profile,
            pager: Mutex::new(Pager::new(page_size)),
            mutations: Mutex::new(MutationLog::default()),
        }
    }

    pub fn source(&self) -> FeedSource {
        self.source
    }

    /// Posts of this feed in display order
    pub fn posts(&self) -> Vec<Post> {
        let ids = self.pager.lock().items().to_vec();
        self.store.snapshot(&ids)
    }

    pub fn has_more(&self) -> bool {
        self.pager.lock().has_more()
    }

    pub fn phase(&self) -> LoadPhase {
        self.pager.lock().phase()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().snapshot()
    }

    /// Reload from the first page. Skipped while another load is in flight.
    pub async fn load_initial_page(&self) -> ClientResult<LoadOutcome> {
        let ticket = self.pager.lock().begin_initial();
        self.run(ticket).await
    }

    /// Load the first page the first time only
    pub async fn ensure_initialized(&self) -> ClientResult<LoadOutcome> {
        let ticket = self.pager.lock().begin_initialization();
        self.run(ticket).await
    }

    /// Append the next page. Skipped while loading or once exhausted.
    pub async fn load_next_page(&self) -> ClientResult<LoadOutcome> {
        let ticket = self.pager.lock().begin_next();
        self.run(ticket).await
    }

    /// Drop the feed's ordering and pagination, e.g. after sign-out
    pub fn reset(&self) {
        self.pager.lock().reset();
        self.mutations.lock().clear();
    }

    async fn run(&self, ticket: Option<PageTicket>) -> ClientResult<LoadOutcome> {
        let Some(ticket) = ticket else {
            debug!(feed = %self.source, "Page load skipped");
            return Ok(LoadOutcome::Skipped);
        };

        let page = PageRequest::newest_first(ticket.page_no, ticket.size);
        match self.api.posts_page(&self.source, &page).await {
            Ok(posts) => {
                let mut pager = self.pager.lock();
                if !pager.is_current(&ticket) {
                    debug!(feed = %self.source, page = ticket.page_no, "Dropping page from before a reset");
                    return Ok(LoadOutcome::Skipped);
                }
                let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
                self.store.upsert_many(posts);
                let outcome = pager.finish(ticket, ids);
                drop(pager);
                debug!(feed = %self.source, page = ticket.page_no, ?outcome, "Page loaded");
                Ok(outcome)
            }
            Err(e) => {
                self.pager.lock().abort(ticket);
                error!(feed = %self.source, page = ticket.page_no, error = %e, "Failed to load page");
                Err(e)
            }
        }
    }

    /// Create a post, attach files best-effort, then reload the first page
    pub async fn create_post(
        &self,
        content: &str,
        visibility: Visibility,
        files: Vec<UploadFile>,
    ) -> ClientResult<CreatedPost> {
        self.session.require("create posts")?;
        let content = content.trim();
        if content.is_empty() && files.is_empty() {
            return Err(ClientError::validation("Post must have content or media"));
        }

        let request = CreatePostRequest {
            content: content.to_string(),
            visibility,
        };
        let post = self.api.create_post(&request).await?;
        info!(post_id = %post.id, files = files.len(), "Post created");

        let uploads = self.uploader.upload_for_post(post.id, files).await?;

        match self.load_initial_page().await {
            Ok(LoadOutcome::Skipped) => debug!(feed = %self.source, "Reload after post creation skipped"),
            Ok(_) => {}
            Err(e) => error!(post_id = %post.id, error = %e, "Failed to reload feed after creating post"),
        }

        Ok(CreatedPost { post, uploads })
    }

    /// Like a post as the signed-in account
    ///
    /// Returns `None` when the post is loaded and already liked by this
    /// account. Backend failures are rolled back and reported through the
    /// returned mutation, not as an error.
    pub async fn like(&self, post_id: Uuid) -> ClientResult<Option<Mutation>> {
        let account = self.session.require("like posts")?;

        let mutation_id = Uuid::new_v4();
        if self.store.add_like(post_id, Like::local(account.id), mutation_id) == LikeChange::Unchanged {
            return Ok(None);
        }
        self.mutations.lock().begin(mutation_id, post_id, MutationKind::Like);

        let result = self.api.like(post_id).await;
        Ok(self.settle(mutation_id, post_id, result))
    }

    /// Remove the signed-in account's like
    ///
    /// Returns `None` when the post is loaded and not liked by this account.
    pub async fn unlike(&self, post_id: Uuid) -> ClientResult<Option<Mutation>> {
        let account = self.session.require("unlike posts")?;

        let mutation_id = Uuid::new_v4();
        if self.store.remove_like(post_id, account.id, mutation_id) == LikeChange::Unchanged {
            return Ok(None);
        }
        self.mutations.lock().begin(mutation_id, post_id, MutationKind::Unlike);

        let result = self.api.unlike(post_id).await;
        Ok(self.settle(mutation_id, post_id, result))
    }

    /// Comment on a post; the comment is visible before the backend answers
    pub async fn comment(&self, post_id: Uuid, text: &str) -> ClientResult<Option<Mutation>> {
        self.session.require("comment on posts")?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::validation("Comment must not be blank"));
        }

        let author = self
            .profile
            .current()
            .map(|p| p.as_author())
            .unwrap_or_else(PostAuthor::anonymous);
        let local = Comment {
            id: Uuid::new_v4(),
            content: text.to_string(),
            created_at: Some(Utc::now()),
            author: Some(author),
        };
        let mutation_id = Uuid::new_v4();
        self.store.append_comment(post_id, local, mutation_id);
        self.mutations.lock().begin(mutation_id, post_id, MutationKind::Comment);

        let result = self.api.comment(post_id, text).await.map(|echo| {
            if let Some(echo) = echo {
                self.store
                    .adopt_comment_identity(mutation_id, echo.id, echo.created_at);
            }
        });
        Ok(self.settle(mutation_id, post_id, result))
    }

    fn settle(&self, mutation_id: Uuid, post_id: Uuid, result: ClientResult<()>) -> Option<Mutation> {
        match result {
            Ok(()) => {
                self.store.confirm(mutation_id);
                self.mutations.lock().confirm(mutation_id)
            }
            Err(e) => {
                self.store.rollback(mutation_id);
                let mutation = self.mutations.lock().fail(mutation_id, &e);
                warn!(
                    feed = %self.source,
                    %post_id,
                    kind = ?mutation.as_ref().map(|m| m.kind),
                    error = %e,
                    "Mutation rejected, rolled back"
                );
                mutation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockAuthApi, MockMediaApi, MockPostApi, MockProfileApi};
    use crate::config::ImageConfig;
    use crate::media::ImageTranscoder;
    use crate::models::Account;
    use crate::profile::DirectoryOptions;
    use crate::storage::{KeyValueStore, MemoryStore, StorageKey};

    struct Fixture {
        account_id: Uuid,
        store: Arc<PostStore>,
        session: Arc<SessionStore>,
        profile: Arc<ProfileStore>,
        uploader: Arc<MediaUploader>,
    }

    fn fixture(media: MockMediaApi) -> Fixture {
        let account_id = Uuid::new_v4();
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        storage
            .save(
                StorageKey::Account,
                &Account {
                    id: account_id,
                    email: "ada@plaza.dev".into(),
                    role: None,
                },
            )
            .unwrap();

        let session = Arc::new(SessionStore::restore(Arc::new(MockAuthApi::new()), storage.clone()).unwrap());
        let uploader = Arc::new(MediaUploader::new(
            Arc::new(media),
            Arc::new(ImageTranscoder::new(ImageConfig::default())),
        ));
        let profile = Arc::new(
            ProfileStore::restore(
                Arc::new(MockProfileApi::new()),
                uploader.clone(),
                session.clone(),
                storage,
                DirectoryOptions::default(),
            )
            .unwrap(),
        );

        Fixture {
            account_id,
            store: Arc::new(PostStore::new()),
            session,
            profile,
            uploader,
        }
    }

    fn feed(fx: &Fixture, api: MockPostApi) -> FeedSynchronizer {
        FeedSynchronizer::new(
            FeedSource::Home,
            3,
            Arc::new(api),
            fx.uploader.clone(),
            fx.store.clone(),
            fx.session.clone(),
            fx.profile.clone(),
        )
    }

    fn post() -> Post {
        serde_json::from_value(serde_json::json!({ "id": Uuid::new_v4(), "content": "hi" })).unwrap()
    }

    #[tokio::test]
    async fn test_like_noop_when_already_liked() {
        let fx = fixture(MockMediaApi::new());
        let mut liked = post();
        liked.likes.push(Like::local(fx.account_id));
        let post_id = liked.id;
        fx.store.upsert_many([liked]);

        let mut api = MockPostApi::new();
        api.expect_like().never();

        let mutation = feed(&fx, api).like(post_id).await.unwrap();
        assert!(mutation.is_none());
    }

    #[tokio::test]
    async fn test_failed_like_rolls_back() {
        let fx = fixture(MockMediaApi::new());
        let p = post();
        let post_id = p.id;
        fx.store.upsert_many([p]);

        let mut api = MockPostApi::new();
        api.expect_like()
            .times(1)
            .returning(|_| Err(ClientError::http_status("like post", 500, None)));

        let feed = feed(&fx, api);
        let mutation = feed.like(post_id).await.unwrap().unwrap();

        assert_eq!(mutation.state, MutationState::Failed);
        assert_eq!(mutation.kind, MutationKind::Like);
        assert!(fx.store.get(post_id).unwrap().likes.is_empty());
    }

    #[tokio::test]
    async fn test_like_on_unloaded_post_still_sends() {
        let fx = fixture(MockMediaApi::new());
        let mut api = MockPostApi::new();
        api.expect_like().times(1).returning(|_| Ok(()));

        let mutation = feed(&fx, api).like(Uuid::new_v4()).await.unwrap().unwrap();
        assert_eq!(mutation.state, MutationState::Confirmed);
    }

    #[tokio::test]
    async fn test_comment_adopts_server_identity() {
        let fx = fixture(MockMediaApi::new());
        let p = post();
        let post_id = p.id;
        fx.store.upsert_many([p]);
        let canonical = Uuid::new_v4();

        let mut api = MockPostApi::new();
        api.expect_comment()
            .withf(|_, content| content == "nice")
            .times(1)
            .returning(move |_, content| {
                Ok(Some(Comment {
                    id: canonical,
                    content: content.to_string(),
                    created_at: None,
                    author: None,
                }))
            });

        let mutation = feed(&fx, api).comment(post_id, "  nice ").await.unwrap().unwrap();

        assert_eq!(mutation.state, MutationState::Confirmed);
        let comments = fx.store.get(post_id).unwrap().comments;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, canonical);
        assert_eq!(comments[0].author.as_ref().unwrap().display_name(), "Anonymous");
    }

    #[tokio::test]
    async fn test_blank_post_rejected() {
        let fx = fixture(MockMediaApi::new());
        let mut api = MockPostApi::new();
        api.expect_create_post().never();

        let result = feed(&fx, api).create_post("   ", Visibility::Public, vec![]).await;
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_post_uploads_then_reloads() {
        let mut media = MockMediaApi::new();
        media.expect_presign_batch().times(1).returning(|reqs| {
            Ok(reqs
                .iter()
                .map(|r| crate::models::PresignResponse {
                    url: format!("https://bucket.local/{}", r.file_name),
                    key: r.file_name.clone(),
                    expires_in: None,
                })
                .collect())
        });
        media.expect_upload_object().times(1).returning(|_, _, _| Ok(()));
        media.expect_confirm_upload().times(1).returning(|_| Ok(()));

        let fx = fixture(media);
        let created = post();
        let created_id = created.id;

        let mut api = MockPostApi::new();
        let echo = created.clone();
        api.expect_create_post()
            .withf(|req| req.content == "hello" && req.visibility == Visibility::Friends)
            .times(1)
            .returning(move |_| Ok(echo.clone()));
        api.expect_posts_page()
            .withf(|_, page| page.page_no == 0)
            .times(1)
            .returning(move |_, _| Ok(vec![created.clone()]));

        let feed = feed(&fx, api);
        let result = feed
            .create_post(
                " hello ",
                Visibility::Friends,
                vec![UploadFile::new("clip.mp4", "video/mp4", vec![1u8, 2, 3])],
            )
            .await
            .unwrap();

        assert!(result.uploads.is_complete());
        assert_eq!(feed.posts()[0].id, created_id);
    }

    #[tokio::test]
    async fn test_failed_reload_after_create_is_not_an_error() {
        let fx = fixture(MockMediaApi::new());
        let created = post();

        let mut api = MockPostApi::new();
        api.expect_create_post()
            .returning(move |_| Ok(created.clone()));
        api.expect_posts_page()
            .returning(|_, _| Err(ClientError::http_status("get feed page", 502, None)));

        let feed = feed(&fx, api);
        let result = feed.create_post("text only", Visibility::Public, vec![]).await;

        assert!(result.is_ok());
        assert_eq!(feed.phase(), LoadPhase::Empty);
    }

    #[tokio::test]
    async fn test_failed_load_restores_phase_and_propagates() {
        let fx = fixture(MockMediaApi::new());
        let mut api = MockPostApi::new();
        api.expect_posts_page()
            .returning(|_, _| Err(ClientError::http_status("get feed page", 503, None)));

        let feed = feed(&fx, api);
        let result = feed.load_initial_page().await;

        assert_eq!(result.unwrap_err().status(), Some(503));
        assert_eq!(feed.phase(), LoadPhase::Empty);
    }

    #[test]
    fn test_source_paths() {
        let id = Uuid::new_v4();
        assert_eq!(FeedSource::Home.path(), "/post/feeds");
        assert_eq!(FeedSource::Mine.path(), "/post/user/me");
        assert_eq!(FeedSource::User(id).path(), format!("/post/user/{id}"));
    }
}
