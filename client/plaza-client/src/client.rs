//! Client facade
//!
//! Wires every component from a [`ClientConfig`]. Components receive their
//! collaborators explicitly, so tests can assemble a client from fakes with
//! [`PlazaClient::assemble`].

use crate::api::{AuthApi, HttpBackend, MediaApi, MessageApi, PostApi, ProfileApi};
use crate::config::ClientConfig;
use crate::feed::{FeedSource, FeedSynchronizer, PostStore};
use crate::media::{ImageTranscoder, MediaGallery, MediaOwner, MediaUploader};
use crate::models::Account;
use crate::profile::{DirectoryOptions, ProfileStore};
use crate::realtime::{BrokerConnection, ConversationChannel, CookieProvider, StompClient, WS_PATH};
use crate::session::SessionStore;
use crate::storage::{FileStore, KeyValueStore};
use error_types::ClientResult;
use parking_lot::Mutex;
use resilience::{ReconnectPolicy, TimeoutConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Backend API implementations, one per concern
#[derive(Clone)]
pub struct ApiSet {
    pub auth: Arc<dyn AuthApi>,
    pub profile: Arc<dyn ProfileApi>,
    pub post: Arc<dyn PostApi>,
    pub media: Arc<dyn MediaApi>,
    pub message: Arc<dyn MessageApi>,
}

impl ApiSet {
    /// Every concern served by one HTTP backend
    pub fn http(backend: HttpBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            auth: backend.clone(),
            profile: backend.clone(),
            post: backend.clone(),
            media: backend.clone(),
            message: backend,
        }
    }
}

pub struct PlazaClient {
    config: ClientConfig,
    apis: ApiSet,
    session: Arc<SessionStore>,
    profile: Arc<ProfileStore>,
    posts: Arc<PostStore>,
    uploader: Arc<MediaUploader>,
    channel: Arc<ConversationChannel>,
    feeds: Mutex<HashMap<FeedSource, Arc<FeedSynchronizer>>>,
}

impl PlazaClient {
    /// Production wiring: HTTP backend, file storage, STOMP broker
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = HttpBackend::new(&config)?;
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.storage_path)?);

        let cookie_source = http.clone();
        let cookie_url = config.api_base().to_string();
        let cookies: CookieProvider = Arc::new(move || cookie_source.cookie_header(&cookie_url));
        let broker: Arc<dyn BrokerConnection> = Arc::new(StompClient::new(
            format!("{}{}", config.ws_base(), WS_PATH),
            ReconnectPolicy::fixed(config.reconnect_delay()),
            TimeoutConfig {
                duration: config.request_timeout(),
            },
            Some(cookies),
        ));

        Self::assemble(config, ApiSet::http(http), storage, broker)
    }

    pub fn assemble(
        config: ClientConfig,
        apis: ApiSet,
        storage: Arc<dyn KeyValueStore>,
        broker: Arc<dyn BrokerConnection>,
    ) -> ClientResult<Self> {
        let session = Arc::new(SessionStore::restore(apis.auth.clone(), storage.clone())?);
        let uploader = Arc::new(MediaUploader::new(
            apis.media.clone(),
            Arc::new(ImageTranscoder::new(config.image.clone())),
        ));
        let options = DirectoryOptions {
            suggestions_page_size: config.suggestions_page_size,
            min_search_len: config.min_search_len,
            search_debounce: config.search_debounce(),
        };
        let profile = Arc::new(ProfileStore::restore(
            apis.profile.clone(),
            uploader.clone(),
            session.clone(),
            storage,
            options,
        )?);
        let channel = Arc::new(ConversationChannel::new(broker, apis.message.clone(), session.clone()));

        Ok(Self {
            config,
            apis,
            session,
            profile,
            posts: Arc::new(PostStore::new()),
            uploader,
            channel,
            feeds: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn profile(&self) -> &Arc<ProfileStore> {
        &self.profile
    }

    pub fn posts(&self) -> &Arc<PostStore> {
        &self.posts
    }

    pub fn uploader(&self) -> &Arc<MediaUploader> {
        &self.uploader
    }

    pub fn channel(&self) -> &Arc<ConversationChannel> {
        &self.channel
    }

    /// The synchronizer for `source`, created on first use
    pub fn feed(&self, source: FeedSource) -> Arc<FeedSynchronizer> {
        self.feeds
            .lock()
            .entry(source)
            .or_insert_with(|| {
                Arc::new(FeedSynchronizer::new(
                    source,
                    self.config.feed_page_size,
                    self.apis.post.clone(),
                    self.uploader.clone(),
                    self.posts.clone(),
                    self.session.clone(),
                    self.profile.clone(),
                ))
            })
            .clone()
    }

    pub fn home_feed(&self) -> Arc<FeedSynchronizer> {
        self.feed(FeedSource::Home)
    }

    pub fn media_gallery(&self, owner: MediaOwner) -> MediaGallery {
        MediaGallery::new(owner, self.apis.media.clone(), self.config.media_page_size)
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Account> {
        let account = self.session.login(email, password).await?;
        self.reset_views();
        Ok(account)
    }

    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> ClientResult<Account> {
        let account = self.session.register(email, password, full_name).await?;
        self.reset_views();
        Ok(account)
    }

    /// Sign out, closing the realtime channel and dropping every cached view
    pub async fn logout(&self) -> ClientResult<()> {
        self.channel.teardown();
        self.channel.clear();
        self.session.logout().await?;
        self.reset_views();
        Ok(())
    }

    fn reset_views(&self) {
        for feed in self.feeds.lock().values() {
            feed.reset();
        }
        self.posts.clear();
        self.profile.clear();
        info!("Local views reset");
    }
}
