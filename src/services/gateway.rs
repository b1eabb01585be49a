use crate::error::AppResult;
use crate::models::{
    Chat, ChatId, CreateChatResponse, Message, MessageId, MessagePage, OutgoingMessage,
    SendMessageResponse, UserId,
};
use async_trait::async_trait;

/// Request/response boundary to the chat backend. Holds no chat state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn create_chat(&self, target_user_id: UserId, is_ephemeral: bool)
        -> AppResult<CreateChatResponse>;

    async fn list_chats(&self) -> AppResult<Vec<Chat>>;

    async fn get_chat(&self, chat_id: ChatId) -> AppResult<Chat>;

    async fn list_messages(&self, chat_id: ChatId, page: MessagePage) -> AppResult<Vec<Message>>;

    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> AppResult<SendMessageResponse>;

    async fn mark_read(&self, message_id: MessageId) -> AppResult<()>;

    /// Best-effort notification that a message burned on this client.
    async fn burn_message(&self, message_id: MessageId) -> AppResult<()>;

    async fn delete_message(&self, message_id: MessageId) -> AppResult<()>;

    async fn pin_chat(&self, chat_id: ChatId, pinned: bool) -> AppResult<()>;
}
