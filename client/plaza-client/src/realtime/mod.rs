//! Realtime messaging over the STOMP broker

pub mod channel;
pub mod stomp;
pub mod transport;

pub use channel::ConversationChannel;
pub use stomp::{Command, Frame, StompError};
pub use transport::{BrokerConnection, BrokerSubscription, ConnectionState, CookieProvider, StompClient};

use uuid::Uuid;

/// WebSocket endpoint, relative to the WebSocket base URL
pub const WS_PATH: &str = "/message/ws";

/// Destination for outbound chat messages
pub const CHAT_SEND_DESTINATION: &str = "/message/chat.send";

/// Topic carrying one conversation's messages
pub fn topic_for(conversation_id: Uuid) -> String {
    format!("/topic/chat/{conversation_id}")
}
