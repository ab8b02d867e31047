//! Realtime conversation channel
//!
//! Owns the active conversation and its message list. At most one broker
//! subscription is active at a time: selecting another conversation, or the
//! connection coming back, replaces it.

use super::transport::{BrokerConnection, BrokerSubscription, ConnectionState};
use super::{topic_for, CHAT_SEND_DESTINATION};
use crate::api::MessageApi;
use crate::models::{Conversation, ConversationRef, Message, MessageContentType, OutboundMessage};
use crate::session::SessionStore;
use chrono::Utc;
use error_types::{ClientError, ClientResult};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const INCOMING_CAPACITY: usize = 64;

struct ActiveSubscription {
    id: String,
    conversation_id: Uuid,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct ChannelState {
    peer: Option<Uuid>,
    conversation: Option<Conversation>,
    messages: Vec<Message>,
    subscription: Option<ActiveSubscription>,
}

impl ChannelState {
    fn conversation_id(&self) -> Option<Uuid> {
        self.conversation.as_ref().and_then(|c| c.id)
    }
}

struct ChannelInner {
    broker: Arc<dyn BrokerConnection>,
    api: Arc<dyn MessageApi>,
    session: Arc<SessionStore>,
    state: Mutex<ChannelState>,
    incoming: broadcast::Sender<Message>,
}

pub struct ConversationChannel {
    inner: Arc<ChannelInner>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationChannel {
    pub fn new(broker: Arc<dyn BrokerConnection>, api: Arc<dyn MessageApi>, session: Arc<SessionStore>) -> Self {
        let (incoming, _) = broadcast::channel(INCOMING_CAPACITY);
        Self {
            inner: Arc::new(ChannelInner {
                broker,
                api,
                session,
                state: Mutex::new(ChannelState::default()),
                incoming,
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Activate the broker connection and re-subscribe whenever it comes up
    pub fn connect(&self) {
        {
            let mut watcher = self.watcher.lock();
            if watcher.as_ref().map_or(true, |w| w.is_finished()) {
                *watcher = Some(spawn_watcher(
                    Arc::downgrade(&self.inner),
                    self.inner.broker.state(),
                ));
            }
        }
        self.inner.broker.activate();
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.broker.state().borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.broker.state()
    }

    /// Messages appended from the broker, for views that render incrementally
    pub fn incoming(&self) -> broadcast::Receiver<Message> {
        self.inner.incoming.subscribe()
    }

    pub fn conversation(&self) -> Option<Conversation> {
        self.inner.state.lock().conversation.clone()
    }

    pub fn peer(&self) -> Option<Uuid> {
        self.inner.state.lock().peer
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().messages.clone()
    }

    /// Make the conversation with `peer_id` the active one
    ///
    /// Lookup failures fall back to an unpersisted placeholder so the user
    /// can still start the conversation.
    pub async fn select_conversation(&self, peer_id: Uuid) -> ClientResult<Conversation> {
        let account = self.inner.session.require("open a conversation")?;
        let placeholder = Conversation::placeholder(account.id, peer_id);

        let (conversation, history) = match self.inner.api.conversation_with(peer_id).await {
            Ok(Some(conversation)) => match conversation.id {
                Some(id) => {
                    let history = match self.inner.api.conversation_messages(id).await {
                        Ok(history) => history,
                        Err(e) => {
                            warn!(conversation_id = %id, error = %e, "Failed to load message history");
                            Vec::new()
                        }
                    };
                    (conversation, history)
                }
                None => (placeholder, Vec::new()),
            },
            Ok(None) => (placeholder, Vec::new()),
            Err(e) => {
                warn!(%peer_id, error = %e, "Conversation lookup failed, starting a new one");
                (placeholder, Vec::new())
            }
        };

        {
            let mut state = self.inner.state.lock();
            state.peer = Some(peer_id);
            state.conversation = Some(conversation.clone());
            state.messages = history;
        }
        debug!(%peer_id, conversation_id = ?conversation.id, "Conversation selected");

        self.inner.subscribe_active();
        Ok(conversation)
    }

    /// Subscribe to the active conversation's topic, replacing any previous
    /// subscription. Returns whether a subscription is now live.
    pub fn subscribe_active(&self) -> bool {
        self.inner.subscribe_active()
    }

    /// Publish a text message to the active peer
    ///
    /// Returns `Ok(None)` without side effects when the text is blank, no
    /// peer is selected or the broker is not connected.
    pub fn send(&self, text: &str) -> ClientResult<Option<Message>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let account = self.inner.session.require("send messages")?;
        if !self.inner.broker.is_connected() {
            debug!("Message not sent: broker is not connected");
            return Ok(None);
        }

        let (peer, conversation, allocated) = {
            let mut state = self.inner.state.lock();
            let Some(peer) = state.peer else {
                return Ok(None);
            };
            let conversation = state
                .conversation
                .get_or_insert_with(|| Conversation::placeholder(account.id, peer));
            let allocated = conversation.id.is_none();
            let id = *conversation.id.get_or_insert_with(Uuid::new_v4);
            let conversation = ConversationRef {
                id,
                user1: conversation.user1,
                user2: conversation.user2,
            };
            (peer, conversation, allocated)
        };

        let conversation_id = conversation.id;
        let outbound = OutboundMessage {
            id: Uuid::new_v4(),
            sender: account.id,
            receiver: peer,
            content: text.to_string(),
            content_type: MessageContentType::Text,
            timestamp: Utc::now(),
            conversation,
        };
        let body = serde_json::to_string(&outbound).map_err(|e| ClientError::parse("outbound message", e))?;

        if allocated {
            info!(%conversation_id, %peer, "Starting new conversation");
            self.inner.subscribe_active();
        }

        if let Err(e) = self.inner.broker.publish(CHAT_SEND_DESTINATION, body) {
            warn!(%conversation_id, error = %e, "Message not sent");
            return Ok(None);
        }

        let message = outbound.to_message();
        let mut state = self.inner.state.lock();
        if state.conversation_id() == Some(conversation_id) {
            state.messages.push(message.clone());
        }
        Ok(Some(message))
    }

    /// Unsubscribe and deactivate the broker connection
    pub fn teardown(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        self.inner.release_subscription();
        self.inner.broker.deactivate();
        info!("Conversation channel torn down");
    }

    /// Forget the selected conversation, e.g. after sign-out
    pub fn clear(&self) {
        self.inner.release_subscription();
        let mut state = self.inner.state.lock();
        state.peer = None;
        state.conversation = None;
        state.messages.clear();
    }
}

impl Drop for ConversationChannel {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.abort();
        }
        self.inner.release_subscription();
    }
}

impl ChannelInner {
    fn subscribe_active(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if let Some(previous) = state.subscription.take() {
            self.broker.unsubscribe(&previous.id);
            previous.pump.abort();
        }

        let Some(conversation_id) = state.conversation_id() else {
            return false;
        };
        if !self.broker.is_connected() {
            return false;
        }

        match self.broker.subscribe(&topic_for(conversation_id)) {
            Ok(subscription) => {
                let id = subscription.id.clone();
                let pump = spawn_pump(Arc::downgrade(self), conversation_id, subscription);
                state.subscription = Some(ActiveSubscription {
                    id,
                    conversation_id,
                    pump,
                });
                debug!(%conversation_id, "Subscribed to conversation topic");
                true
            }
            Err(e) => {
                warn!(%conversation_id, error = %e, "Failed to subscribe to conversation");
                false
            }
        }
    }

    fn release_subscription(&self) {
        if let Some(active) = self.state.lock().subscription.take() {
            self.broker.unsubscribe(&active.id);
            active.pump.abort();
        }
    }

    fn receive(&self, conversation_id: Uuid, body: &str) {
        let message: Message = match serde_json::from_str(body) {
            Ok(message) => message,
            Err(e) => {
                warn!(%conversation_id, error = %e, "Dropping malformed chat message");
                return;
            }
        };

        if self.session.account_id() == Some(message.sender) {
            return;
        }
        if message.conversation_id.is_some_and(|id| id != conversation_id) {
            debug!(%conversation_id, "Dropping message for another conversation");
            return;
        }

        {
            let mut state = self.state.lock();
            let active = state
                .subscription
                .as_ref()
                .map(|s| s.conversation_id);
            if active != Some(conversation_id) {
                return;
            }
            state.messages.push(message.clone());
        }
        let _ = self.incoming.send(message);
    }
}

fn spawn_pump(inner: Weak<ChannelInner>, conversation_id: Uuid, mut subscription: BrokerSubscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(body) = subscription.messages.recv().await {
            let Some(inner) = inner.upgrade() else { break };
            inner.receive(conversation_id, &body);
        }
        debug!(%conversation_id, destination = %subscription.destination, "Subscription pump stopped");
    })
}

fn spawn_watcher(inner: Weak<ChannelInner>, mut state: watch::Receiver<ConnectionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current = *state.borrow_and_update();
        loop {
            if current == ConnectionState::Connected {
                let Some(inner) = inner.upgrade() else { break };
                if inner.subscribe_active() {
                    info!("Conversation subscription restored");
                }
            }
            if state.changed().await.is_err() {
                break;
            }
            current = *state.borrow_and_update();
            debug!(state = ?current, "Broker connection state changed");
        }
    })
}
