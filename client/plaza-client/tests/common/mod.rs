//! Hand-written fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use error_types::{ClientError, ClientResult};
use parking_lot::Mutex;
use plaza_client::api::{AuthApi, MediaApi, MessageApi, PostApi, ProfileApi};
use plaza_client::feed::FeedSource;
use plaza_client::media::MediaOwner;
use plaza_client::models::{
    Account, Comment, Conversation, CreatePostRequest, LoginRequest, Media, Message, PageRequest, Post,
    PresignRequest, PresignResponse, Profile, ProfileUpdate, RegisterRequest, Visibility,
};
use plaza_client::realtime::{BrokerConnection, BrokerSubscription, ConnectionState};
use plaza_client::storage::{KeyValueStore, MemoryStore};
use plaza_client::{ApiSet, ClientConfig, PlazaClient};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use uuid::Uuid;

pub fn post(content: &str) -> Post {
    Post {
        id: Uuid::new_v4(),
        author: None,
        content: content.to_string(),
        visibility: Visibility::Public,
        media: vec![],
        created_at: None,
        likes: vec![],
        comments: vec![],
    }
}

pub fn posts(n: usize) -> Vec<Post> {
    (0..n).map(|i| post(&format!("post {i}"))).collect()
}

/// Poll `condition` until it holds, yielding to spawned tasks in between
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// In-process backend covering every API trait
#[derive(Default)]
pub struct FakeBackend {
    pub account_id: Mutex<Option<Uuid>>,
    pub pages: Mutex<Vec<Vec<Post>>>,
    pub page_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
    like_gate: Mutex<Option<Arc<Semaphore>>>,
    pub fail_likes: AtomicBool,
    pub fail_comments: AtomicBool,
    pub like_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub conversation: Mutex<Option<Conversation>>,
    pub history: Mutex<Vec<Message>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_pages(pages: Vec<Vec<Post>>) -> Arc<Self> {
        let backend = Self::default();
        *backend.pages.lock() = pages;
        Arc::new(backend)
    }

    /// Hold every page request until a permit is added to the returned gate
    pub fn hold_pages(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Hold every like request until a permit is added to the returned gate
    pub fn hold_likes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.like_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn apis(self: &Arc<Self>) -> ApiSet {
        ApiSet {
            auth: self.clone(),
            profile: self.clone(),
            post: self.clone(),
            media: self.clone(),
            message: self.clone(),
        }
    }

    fn account(&self, email: &str) -> Account {
        let id = *self.account_id.lock().get_or_insert_with(Uuid::new_v4);
        Account {
            id,
            email: email.to_string(),
            role: None,
        }
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn login(&self, request: &LoginRequest) -> ClientResult<Account> {
        Ok(self.account(&request.email))
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<Account> {
        Ok(self.account(&request.email))
    }

    async fn logout(&self) -> ClientResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ProfileApi for FakeBackend {
    async fn current_profile(&self) -> ClientResult<Profile> {
        let id = (*self.account_id.lock()).ok_or_else(|| ClientError::http_status("get profile", 401, None))?;
        let profile = serde_json::json!({ "id": id, "fullName": "Grace Hopper", "nickName": "grace" });
        serde_json::from_value(profile).map_err(|e| ClientError::parse("profile", e))
    }

    async fn list_profiles(&self, _page: &PageRequest) -> ClientResult<Vec<Profile>> {
        Ok(vec![])
    }

    async fn profile_detail(&self, _profile_id: Uuid) -> ClientResult<Profile> {
        self.current_profile().await
    }

    async fn search_profiles(&self, _name: &str) -> ClientResult<Vec<Profile>> {
        Ok(vec![])
    }

    async fn update_profile(&self, _update: &ProfileUpdate) -> ClientResult<Option<Profile>> {
        Ok(None)
    }

    async fn follow(&self, _profile_id: Uuid) -> ClientResult<()> {
        Ok(())
    }

    async fn avatar_presign(&self, request: &PresignRequest) -> ClientResult<PresignResponse> {
        Ok(presigned(request))
    }
}

#[async_trait]
impl PostApi for FakeBackend {
    async fn create_post(&self, request: &CreatePostRequest) -> ClientResult<Post> {
        Ok(post(&request.content))
    }

    async fn posts_page(&self, _source: &FeedSource, page: &PageRequest) -> ClientResult<Vec<Post>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| ClientError::network("get feed page", e))?
                .forget();
        }
        Ok(self
            .pages
            .lock()
            .get(page.page_no as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn like(&self, _post_id: Uuid) -> ClientResult<()> {
        self.like_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.like_gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| ClientError::network("like post", e))?
                .forget();
        }
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(ClientError::http_status("like post", 500, None));
        }
        Ok(())
    }

    async fn unlike(&self, _post_id: Uuid) -> ClientResult<()> {
        self.like_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(ClientError::http_status("unlike post", 500, None));
        }
        Ok(())
    }

    async fn comment(&self, _post_id: Uuid, content: &str) -> ClientResult<Option<Comment>> {
        if self.fail_comments.load(Ordering::SeqCst) {
            return Err(ClientError::http_status("comment on post", 503, None));
        }
        Ok(Some(Comment {
            id: Uuid::new_v4(),
            content: content.to_string(),
            created_at: None,
            author: None,
        }))
    }
}

#[async_trait]
impl MediaApi for FakeBackend {
    async fn presign_batch(&self, requests: &[PresignRequest]) -> ClientResult<Vec<PresignResponse>> {
        Ok(requests.iter().map(presigned).collect())
    }

    async fn upload_object(&self, _url: &str, _content_type: &str, _data: Bytes) -> ClientResult<()> {
        Ok(())
    }

    async fn confirm_upload(&self, _key: &str) -> ClientResult<()> {
        Ok(())
    }

    async fn media_page(&self, _owner: &MediaOwner, _page: &PageRequest) -> ClientResult<Vec<Media>> {
        Ok(vec![])
    }
}

#[async_trait]
impl MessageApi for FakeBackend {
    async fn conversation_with(&self, _peer_id: Uuid) -> ClientResult<Option<Conversation>> {
        Ok(self.conversation.lock().clone())
    }

    async fn conversation_messages(&self, _conversation_id: Uuid) -> ClientResult<Vec<Message>> {
        Ok(self.history.lock().clone())
    }
}

fn presigned(request: &PresignRequest) -> PresignResponse {
    PresignResponse {
        url: format!("https://bucket.local/{}?sig=1", request.file_name),
        key: format!("uploads/{}", request.file_name),
        expires_in: Some(900),
    }
}

/// Broker that connects instantly and records everything published
pub struct MemoryBroker {
    state: watch::Sender<ConnectionState>,
    subscriptions: Mutex<HashMap<String, (String, mpsc::UnboundedSender<String>)>>,
    pub published: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
    /// When false, `activate` leaves the broker disconnected
    pub connect_on_activate: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            state,
            subscriptions: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            connect_on_activate: AtomicBool::new(true),
        })
    }

    /// Change the connection state; dropping the connection ends every subscription
    pub fn set_state(&self, state: ConnectionState) {
        if state != ConnectionState::Connected {
            self.subscriptions.lock().clear();
        }
        self.state.send_replace(state);
    }

    /// Deliver `body` to every subscriber of `destination`
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        self.subscriptions
            .lock()
            .values()
            .filter(|(dest, _)| dest == destination)
            .filter(|(_, tx)| tx.send(body.to_string()).is_ok())
            .count()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .values()
            .map(|(dest, _)| dest.clone())
            .collect()
    }
}

impl BrokerConnection for MemoryBroker {
    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn activate(&self) {
        if self.connect_on_activate.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Connected);
        } else {
            self.set_state(ConnectionState::Connecting);
        }
    }

    fn deactivate(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    fn subscribe(&self, destination: &str) -> ClientResult<BrokerSubscription> {
        if !self.is_connected() {
            return Err(ClientError::network("subscribe", "broker not connected"));
        }
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .lock()
            .insert(id.clone(), (destination.to_string(), tx));
        Ok(BrokerSubscription {
            id,
            destination: destination.to_string(),
            messages: rx,
        })
    }

    fn unsubscribe(&self, subscription_id: &str) {
        self.subscriptions.lock().remove(subscription_id);
    }

    fn publish(&self, destination: &str, body: String) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::network("publish", "broker not connected"));
        }
        self.published.lock().push((destination.to_string(), body));
        Ok(())
    }
}

/// Client over the fakes with in-memory storage
pub fn client(backend: &Arc<FakeBackend>, broker: &Arc<MemoryBroker>) -> PlazaClient {
    client_with_storage(backend, broker, Arc::new(MemoryStore::new()))
}

pub fn client_with_storage(
    backend: &Arc<FakeBackend>,
    broker: &Arc<MemoryBroker>,
    storage: Arc<dyn KeyValueStore>,
) -> PlazaClient {
    PlazaClient::assemble(ClientConfig::default(), backend.apis(), storage, broker.clone())
        .expect("assemble client")
}

/// Client already signed in as the backend's account
pub async fn signed_in(backend: &Arc<FakeBackend>, broker: &Arc<MemoryBroker>) -> PlazaClient {
    let client = client(backend, broker);
    client
        .login("grace@plaza.dev", "hunter2")
        .await
        .expect("login");
    client
}
