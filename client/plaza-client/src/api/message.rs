use super::{HttpBackend, MessageApi};
use crate::models::{Conversation, Message};
use async_trait::async_trait;
use error_types::ClientResult;
use uuid::Uuid;

#[async_trait]
impl MessageApi for HttpBackend {
    async fn conversation_with(&self, peer_id: Uuid) -> ClientResult<Option<Conversation>> {
        let req = self
            .client
            .get(self.url("/message/conversation"))
            .query(&[("receiverId", peer_id)]);
        self.json_opt("get conversation", req).await
    }

    async fn conversation_messages(&self, conversation_id: Uuid) -> ClientResult<Vec<Message>> {
        let req = self
            .client
            .get(self.url("/message/conversation/messages"))
            .query(&[("conversationId", conversation_id)]);
        Ok(self
            .json_opt("get conversation messages", req)
            .await?
            .unwrap_or_default())
    }
}
