#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ephemeral_chat::models::{
    Chat, ChatId, CreateChatResponse, Message, MessageId, MessagePage, OutgoingMessage,
    SendMessageResponse, UserId,
};
use ephemeral_chat::{AppError, AppResult, ChatGateway, Clock, ExpiryPolicy, ManualClock, MessageStore};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub const ME: UserId = 1;
pub const PEER: UserId = 2;

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[derive(Default)]
struct Inner {
    chats: Vec<Chat>,
    messages: HashMap<ChatId, Vec<Message>>,
    next_id: MessageId,
    fail_burn: bool,
    hang_burn: bool,
    fail_read: bool,
    fail_delete: bool,
    fail_send: bool,
    fail_list: bool,
    burn_calls: Vec<MessageId>,
    read_calls: Vec<MessageId>,
    delete_calls: Vec<MessageId>,
    sent: Vec<(ChatId, OutgoingMessage)>,
    created: Vec<(UserId, bool)>,
    pins: Vec<(ChatId, bool)>,
}

/// In-memory backend. Burn and delete calls are recorded but the records
/// stay, so tests can check the store hides them on its own.
pub struct FakeGateway {
    clock: ManualClock,
    inner: Mutex<Inner>,
}

fn transport(message: &str) -> AppError {
    AppError::Transport {
        status: None,
        message: message.to_string(),
    }
}

impl FakeGateway {
    pub fn new(clock: ManualClock) -> Arc<Self> {
        Arc::new(Self {
            clock,
            inner: Mutex::new(Inner {
                next_id: 1000,
                ..Inner::default()
            }),
        })
    }

    pub fn put(&self, message: Message) {
        self.inner
            .lock()
            .messages
            .entry(message.chat_id)
            .or_default()
            .push(message);
    }

    pub fn set_chats(&self, chats: Vec<Chat>) {
        self.inner.lock().chats = chats;
    }

    pub fn fail_burn(&self, fail: bool) {
        self.inner.lock().fail_burn = fail;
    }

    /// Burn notifications never complete.
    pub fn hang_burn(&self, hang: bool) {
        self.inner.lock().hang_burn = hang;
    }

    pub fn fail_read(&self, fail: bool) {
        self.inner.lock().fail_read = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.inner.lock().fail_delete = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.inner.lock().fail_send = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        self.inner.lock().fail_list = fail;
    }

    pub fn burn_calls(&self) -> Vec<MessageId> {
        self.inner.lock().burn_calls.clone()
    }

    pub fn read_calls(&self) -> Vec<MessageId> {
        self.inner.lock().read_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<MessageId> {
        self.inner.lock().delete_calls.clone()
    }

    pub fn sent(&self) -> Vec<(ChatId, OutgoingMessage)> {
        self.inner.lock().sent.clone()
    }

    pub fn created(&self) -> Vec<(UserId, bool)> {
        self.inner.lock().created.clone()
    }

    pub fn pins(&self) -> Vec<(ChatId, bool)> {
        self.inner.lock().pins.clone()
    }
}

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn create_chat(
        &self,
        target_user_id: UserId,
        is_ephemeral: bool,
    ) -> AppResult<CreateChatResponse> {
        let mut inner = self.inner.lock();
        inner.created.push((target_user_id, is_ephemeral));
        let existing = inner
            .chats
            .iter()
            .find(|chat| chat.member_ids().contains(&target_user_id))
            .map(|chat| chat.id);
        if let Some(chat_id) = existing {
            return Ok(CreateChatResponse {
                chat_id,
                is_new: false,
            });
        }
        let chat_id = inner.chats.len() as ChatId + 100;
        inner.chats.push(chat(chat_id, &[target_user_id], 0));
        Ok(CreateChatResponse {
            chat_id,
            is_new: true,
        })
    }

    async fn list_chats(&self) -> AppResult<Vec<Chat>> {
        Ok(self.inner.lock().chats.clone())
    }

    async fn get_chat(&self, chat_id: ChatId) -> AppResult<Chat> {
        self.inner
            .lock()
            .chats
            .iter()
            .find(|chat| chat.id == chat_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn list_messages(&self, chat_id: ChatId, page: MessagePage) -> AppResult<Vec<Message>> {
        let inner = self.inner.lock();
        if inner.fail_list {
            return Err(transport("list failed"));
        }
        Ok(inner
            .messages
            .get(&chat_id)
            .map(|all| {
                all.iter()
                    .skip(page.offset as usize)
                    .take(page.limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> AppResult<SendMessageResponse> {
        let mut inner = self.inner.lock();
        if inner.fail_send {
            return Err(transport("send failed"));
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.sent.push((chat_id, message.clone()));
        let record = serde_json::from_value(json!({
            "id": id,
            "chat_id": chat_id,
            "sender_id": ME,
            "content_type": message.content_type,
            "content": message.content,
            "encryption_key": message.encryption_key,
            "media_url": message.media_url,
            "created_at": self.clock.now().to_rfc3339(),
            "expire_after_read": message.expire_after_read,
            "expire_after": message.expire_after,
        }))
        .map_err(|e| transport(&e.to_string()))?;
        inner.messages.entry(chat_id).or_default().push(record);
        Ok(SendMessageResponse {
            message_id: id,
            encryption_key: Some(message.encryption_key.clone()),
        })
    }

    async fn mark_read(&self, message_id: MessageId) -> AppResult<()> {
        let mut inner = self.inner.lock();
        inner.read_calls.push(message_id);
        if inner.fail_read {
            return Err(transport("read failed"));
        }
        let now = self.clock.now();
        for message in inner.messages.values_mut().flatten() {
            if message.id == message_id && !message.is_read {
                message.is_read = true;
                message.read_at = Some(now);
            }
        }
        Ok(())
    }

    async fn burn_message(&self, message_id: MessageId) -> AppResult<()> {
        let hang = {
            let mut inner = self.inner.lock();
            inner.burn_calls.push(message_id);
            if inner.fail_burn {
                return Err(transport("burn failed"));
            }
            inner.hang_burn
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn delete_message(&self, message_id: MessageId) -> AppResult<()> {
        let mut inner = self.inner.lock();
        inner.delete_calls.push(message_id);
        if inner.fail_delete {
            return Err(AppError::Transport {
                status: Some(500),
                message: "delete failed".into(),
            });
        }
        Ok(())
    }

    async fn pin_chat(&self, chat_id: ChatId, pinned: bool) -> AppResult<()> {
        let mut inner = self.inner.lock();
        inner.pins.push((chat_id, pinned));
        for chat in inner.chats.iter_mut().filter(|chat| chat.id == chat_id) {
            chat.is_pinned = pinned;
        }
        Ok(())
    }
}

pub fn chat(id: ChatId, members: &[UserId], unread_count: u32) -> Chat {
    serde_json::from_value(json!({
        "id": id,
        "members": members,
        "is_ephemeral": 1,
        "unread_count": unread_count
    }))
    .unwrap()
}

/// An encrypted, unread, burn-after-read text message from the peer.
pub fn text_message(id: MessageId, chat_id: ChatId, text: &str, created_at: DateTime<Utc>) -> Message {
    let key = crypto_core::generate_key();
    serde_json::from_value(json!({
        "id": id,
        "chat_id": chat_id,
        "sender_id": PEER,
        "content_type": "text",
        "content": crypto_core::encrypt(text, &key).unwrap(),
        "encryption_key": key,
        "created_at": created_at.to_rfc3339(),
        "is_read": 0,
        "expire_after_read": 1,
        "is_deleted": 0
    }))
    .unwrap()
}

/// A message with an absolute TTL and no read gating.
pub fn ttl_message(id: MessageId, chat_id: ChatId, text: &str, ttl_secs: u64) -> Message {
    let mut message = text_message(id, chat_id, text, t0());
    message.expire_after_read = false;
    message.expire_after = Some(ttl_secs);
    message
}

pub struct Harness {
    pub clock: ManualClock,
    pub gateway: Arc<FakeGateway>,
    pub store: MessageStore,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::new(t0());
        let gateway = FakeGateway::new(clock.clone());
        let store = MessageStore::with_clock(
            gateway.clone(),
            Arc::new(clock.clone()),
            ExpiryPolicy::default(),
        );
        Self {
            clock,
            gateway,
            store,
        }
    }

    /// Move the wall clock and paused tokio time together.
    pub async fn advance(&self, by: Duration) {
        self.clock.advance(by);
        if let Ok(std) = by.to_std() {
            tokio::time::sleep(std).await;
        }
    }

    /// Give spawned notification tasks a chance to run.
    pub async fn settle(&self) {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    pub fn visible_ids(&self) -> Vec<MessageId> {
        self.store.messages().iter().map(|view| view.id()).collect()
    }
}
