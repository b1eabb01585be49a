//! In-memory view of the user's ephemeral chats.
//!
//! The store is local-authoritative: reads, burns and deletes are applied to
//! the held state first and the server is told afterwards. A burned id stays
//! hidden for the rest of the session whatever the server returns later.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    Chat, ChatId, ContentType, CreateChatResponse, DisplayContent, LocalEffect, Message,
    MessageId, MessagePage, MessageView, OutgoingMessage, RemoteSync, SendOptions, SendReceipt,
    SweepReport, SyncOutcome, UserId,
};
use crate::services::burn_scheduler::BurnScheduler;
use crate::services::expiry::ExpiryPolicy;
use crate::services::gateway::ChatGateway;
use crate::services::http_gateway::HttpChatGateway;
use crate::state::{ChatState, SharedState};
use crypto_core::CryptoError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

enum ReadTarget {
    Visible { message: Message, changed: bool },
    Unloaded,
    Terminal,
}

pub struct MessageStore {
    state: SharedState,
    gateway: Arc<dyn ChatGateway>,
    scheduler: BurnScheduler,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
    default_page: MessagePage,
}

impl MessageStore {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self::with_clock(gateway, Arc::new(SystemClock), ExpiryPolicy::default())
    }

    pub fn with_clock(
        gateway: Arc<dyn ChatGateway>,
        clock: Arc<dyn Clock>,
        policy: ExpiryPolicy,
    ) -> Self {
        let state = ChatState::shared();
        let scheduler = BurnScheduler::new(state.clone(), gateway.clone(), policy, clock.clone());
        Self {
            state,
            gateway,
            scheduler,
            policy,
            clock,
            default_page: MessagePage::default(),
        }
    }

    /// Store backed by [`HttpChatGateway`] with the configured delay and page.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let gateway = Arc::new(HttpChatGateway::from_config(config)?);
        let store = Self::with_clock(
            gateway,
            Arc::new(SystemClock),
            ExpiryPolicy::new(config.burn_delay()),
        );
        Ok(store.with_default_page(config.default_page()))
    }

    pub fn with_default_page(mut self, page: MessagePage) -> Self {
        self.default_page = page;
        self
    }

    pub fn scheduler(&self) -> &BurnScheduler {
        &self.scheduler
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    // ----- chats -----

    /// Open (or find) the ephemeral chat with `target_user_id`.
    pub async fn create_chat(&self, target_user_id: UserId) -> AppResult<CreateChatResponse> {
        let response = self.gateway.create_chat(target_user_id, true).await?;
        info!(chat_id = response.chat_id, is_new = response.is_new, "chat ready");

        if response.is_new {
            if let Err(e) = self.refresh_chats().await {
                warn!(chat_id = response.chat_id, error = %e, "chat list refresh failed");
            }
        }
        Ok(response)
    }

    /// Replace the chat list and recompute the unread total.
    pub async fn refresh_chats(&self) -> AppResult<Vec<Chat>> {
        let chats = self.gateway.list_chats().await?;
        let mut state = self.state.lock();
        state.set_chats(chats.clone());
        debug!(count = chats.len(), unread = state.unread_total, "chat list refreshed");
        Ok(chats)
    }

    /// Fetch chat details and make it the current chat.
    pub async fn open_chat(&self, chat_id: ChatId) -> AppResult<Chat> {
        let chat = self.gateway.get_chat(chat_id).await?;
        self.activate_chat(chat_id);
        self.state.lock().current_chat = Some(chat.clone());
        Ok(chat)
    }

    pub async fn set_pinned(&self, chat_id: ChatId, pinned: bool) -> AppResult<()> {
        self.gateway.pin_chat(chat_id, pinned).await?;
        info!(chat_id, pinned, "chat pin updated");
        self.refresh_chats().await.map(|_| ())
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.state.lock().chats.clone()
    }

    pub fn unread_total(&self) -> u32 {
        self.state.lock().unread_total
    }

    pub fn has_unread(&self) -> bool {
        self.unread_total() > 0
    }

    pub fn current_chat(&self) -> Option<Chat> {
        self.state.lock().current_chat.clone()
    }

    pub fn active_chat_id(&self) -> Option<ChatId> {
        self.state.lock().active_chat_id
    }

    /// Visible messages of the active chat, oldest first.
    pub fn messages(&self) -> Vec<MessageView> {
        self.state.lock().messages.clone()
    }

    /// Close the active chat and abort its timers. Burned ids are kept.
    pub fn clear_current_chat(&self) {
        self.scheduler.cancel_all();
        self.state.lock().clear_current();
    }

    /// Forget everything, including which ids were burned.
    pub fn reset(&self) {
        self.scheduler.cancel_all();
        self.state.lock().reset();
    }

    // ----- messages -----

    /// Fetch a page of `chat_id`, burn what is already due, decrypt the rest
    /// and arm timers for everything that will expire.
    pub async fn load_messages(
        &self,
        chat_id: ChatId,
        page: MessagePage,
    ) -> AppResult<Vec<MessageView>> {
        page.validate()?;
        self.activate_chat(chat_id);

        let records = self.gateway.list_messages(chat_id, page).await?;

        let Some(to_decrypt) = self.ingest(chat_id, records) else {
            debug!(chat_id, "active chat changed during load; response dropped");
            return Ok(Vec::new());
        };

        let burned = self.scheduler.sweep_detached(self.clock.now());
        if !burned.is_empty() {
            debug!(chat_id, burned = ?burned, "expired messages burned on load");
        }

        self.decrypt_pending(&to_decrypt);

        let armed: Vec<Message> = self
            .state
            .lock()
            .messages
            .iter()
            .filter(|view| self.policy.burn_deadline(&view.message).is_some())
            .map(|view| view.message.clone())
            .collect();
        for message in &armed {
            self.scheduler.schedule(message);
        }

        Ok(self.messages())
    }

    /// Encrypt and send a message, then reload the chat.
    ///
    /// Outgoing messages always burn after read and never carry a TTL,
    /// whatever `options` asks for.
    pub async fn send(
        &self,
        chat_id: ChatId,
        content: &str,
        options: SendOptions,
    ) -> AppResult<SendReceipt> {
        validate_outgoing(content, &options)?;

        if options.expire_after_read == Some(false) || options.expire_after.is_some() {
            debug!(chat_id, "caller expiry options overridden");
        }

        let key = crypto_core::generate_key();
        let ciphertext = crypto_core::encrypt(content, &key)?;
        let outgoing = OutgoingMessage {
            content: ciphertext,
            content_type: options.content_type,
            media_url: options.media_url.map(|url| url.trim().to_string()),
            encryption_key: key.clone(),
            expire_after_read: true,
            expire_after: None,
        };

        let response = self.gateway.send_message(chat_id, &outgoing).await?;
        info!(
            chat_id,
            message_id = response.message_id,
            content_type = options.content_type.as_str(),
            "message sent"
        );

        if let Err(e) = self.load_messages(chat_id, self.default_page).await {
            warn!(chat_id, error = %e, "reload after send failed");
        }

        Ok(SendReceipt {
            message_id: response.message_id,
            encryption_key: response.encryption_key.unwrap_or(key),
        })
    }

    /// Mark a message read, arm its burn, then send the receipt.
    ///
    /// An existing `read_at` is kept so a repeated read never extends the
    /// countdown. A failed receipt is logged; the local read stands. Ids that
    /// were never loaded still get a receipt; burned or deleted ids do not.
    pub async fn mark_read(&self, id: MessageId) -> SyncOutcome {
        let now = self.clock.now();
        let target = {
            let mut state = self.state.lock();
            match state.position(id) {
                Some(idx) if !state.messages[idx].message.is_deleted => {
                    let message = &mut state.messages[idx].message;
                    let changed = !message.is_read || message.read_at.is_none();
                    message.is_read = true;
                    if message.read_at.is_none() {
                        message.read_at = Some(now);
                    }
                    ReadTarget::Visible {
                        message: message.clone(),
                        changed,
                    }
                }
                Some(_) => ReadTarget::Terminal,
                None if state.is_terminal(id) => ReadTarget::Terminal,
                None => ReadTarget::Unloaded,
            }
        };

        let local = match target {
            ReadTarget::Terminal => return SyncOutcome::noop(),
            ReadTarget::Unloaded => {
                debug!(message_id = id, "read receipt for a message not loaded");
                LocalEffect::NoOp
            }
            ReadTarget::Visible { message, changed } => {
                if message.expire_after_read {
                    self.scheduler.schedule(&message);
                }
                if changed {
                    LocalEffect::Applied
                } else {
                    LocalEffect::NoOp
                }
            }
        };

        let remote = match self.gateway.mark_read(id).await {
            Ok(()) => {
                if let Err(e) = self.refresh_chats().await {
                    debug!(message_id = id, error = %e, "unread counts not refreshed");
                }
                RemoteSync::Synced
            }
            Err(e) => {
                warn!(message_id = id, error = %e, "read receipt failed");
                RemoteSync::Failed(e.to_string())
            }
        };

        SyncOutcome { local, remote }
    }

    /// Delete a message. It disappears locally whatever the server says;
    /// a server error is still returned.
    pub async fn delete_message(&self, id: MessageId) -> AppResult<()> {
        let result = self.gateway.delete_message(id).await;

        self.scheduler.cancel(id);
        {
            let mut state = self.state.lock();
            if let Some(idx) = state.position(id) {
                state.messages.remove(idx);
            }
            state.tombstone(id);
        }

        match result {
            Ok(()) => {
                info!(message_id = id, "message deleted");
                Ok(())
            }
            Err(e) => {
                warn!(message_id = id, error = %e, "server delete failed; removed locally");
                Err(e)
            }
        }
    }

    pub async fn burn(&self, id: MessageId) -> SyncOutcome {
        self.scheduler.burn(id).await
    }

    /// Sweep the held messages at the current time.
    pub async fn tick(&self) -> SweepReport {
        self.scheduler.sweep(self.clock.now()).await
    }

    // ----- internals -----

    fn activate_chat(&self, chat_id: ChatId) {
        let mut state = self.state.lock();
        if state.active_chat_id == Some(chat_id) {
            return;
        }
        self.scheduler.cancel_all();
        let previous = state.active_chat_id.replace(chat_id);
        state.messages.clear();
        if state
            .current_chat
            .as_ref()
            .is_some_and(|chat| chat.id != chat_id)
        {
            state.current_chat = None;
        }
        debug!(chat_id, previous = ?previous, "active chat switched");
    }

    /// Merge fetched records into the visible list.
    ///
    /// Returns the ids that still need decrypting, or `None` if `chat_id` is
    /// no longer the active chat.
    fn ingest(&self, chat_id: ChatId, records: Vec<Message>) -> Option<HashSet<MessageId>> {
        let mut state = self.state.lock();
        if state.active_chat_id != Some(chat_id) {
            return None;
        }

        let mut previous: HashMap<MessageId, MessageView> = std::mem::take(&mut state.messages)
            .into_iter()
            .map(|view| (view.id(), view))
            .collect();
        let mut to_decrypt = HashSet::new();
        let mut fresh = Vec::with_capacity(records.len());

        for mut record in records {
            if state.is_terminal(record.id) {
                continue;
            }
            if record.is_deleted {
                state.tombstone(record.id);
                continue;
            }

            let display = match previous.remove(&record.id) {
                Some(prev) => {
                    // The server may not have seen our read receipt yet.
                    if prev.message.is_read && !record.is_read {
                        record.is_read = true;
                    }
                    if record.is_read && record.read_at.is_none() {
                        record.read_at = prev.message.read_at;
                    }
                    let unchanged = prev.message.content == record.content
                        && prev.message.encryption_key == record.encryption_key;
                    unchanged.then_some(prev.display)
                }
                None => None,
            };

            let display = display.unwrap_or_else(|| {
                to_decrypt.insert(record.id);
                DisplayContent::Empty
            });
            fresh.push(MessageView::new(record, display));
        }

        fresh.sort_by(|a, b| Message::display_order(&a.message, &b.message));
        state.messages = fresh;
        drop(state);

        // Messages that fell out of the page no longer need timers.
        for id in previous.keys() {
            self.scheduler.cancel(*id);
        }

        Some(to_decrypt)
    }

    fn decrypt_pending(&self, ids: &HashSet<MessageId>) {
        if ids.is_empty() {
            return;
        }

        let pending: Vec<Message> = self
            .state
            .lock()
            .messages
            .iter()
            .filter(|view| ids.contains(&view.id()))
            .map(|view| view.message.clone())
            .collect();

        let decoded: HashMap<MessageId, DisplayContent> = pending
            .iter()
            .map(|message| (message.id, decode(message)))
            .collect();

        let mut state = self.state.lock();
        for view in state.messages.iter_mut() {
            if let Some(display) = decoded.get(&view.id()) {
                view.display = display.clone();
            }
        }
    }
}

impl Drop for MessageStore {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
    }
}

fn validate_outgoing(content: &str, options: &SendOptions) -> AppResult<()> {
    match options.content_type {
        ContentType::Text if content.trim().is_empty() => Err(AppError::Validation(
            "message content cannot be empty".into(),
        )),
        kind if kind.is_media()
            && options
                .media_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty()) =>
        {
            Err(AppError::Validation(format!(
                "{} messages require a media url",
                kind.as_str()
            )))
        }
        _ => Ok(()),
    }
}

fn decode(message: &Message) -> DisplayContent {
    match (message.content.as_deref(), message.encryption_key.as_deref()) {
        (Some(content), Some(key)) if !content.is_empty() && !key.is_empty() => {
            match crypto_core::decrypt_with_strategy(content, key) {
                Ok((plaintext, strategy)) => {
                    debug!(message_id = message.id, strategy = ?strategy, "message decrypted");
                    DisplayContent::Plaintext(plaintext)
                }
                // Media captions are optional and encrypt to an empty body.
                Err(CryptoError::EmptyPlaintext) if message.content_type.is_media() => {
                    DisplayContent::Empty
                }
                Err(e) => {
                    debug!(message_id = message.id, error = %e, "message undecryptable");
                    DisplayContent::Undecryptable
                }
            }
        }
        (Some(content), _) if !content.is_empty() => {
            DisplayContent::Plaintext(content.to_string())
        }
        _ => DisplayContent::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::services::gateway::MockChatGateway;
    use chrono::{DateTime, Utc};
    use mockall::predicate::{always, eq};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn store(gateway: MockChatGateway) -> MessageStore {
        MessageStore::with_clock(
            Arc::new(gateway),
            Arc::new(ManualClock::new(t0())),
            ExpiryPolicy::default(),
        )
    }

    fn encrypted(id: MessageId, text: &str) -> Message {
        let key = crypto_core::generate_key();
        serde_json::from_value(json!({
            "id": id,
            "chat_id": 1,
            "sender_id": 2,
            "content": crypto_core::encrypt(text, &key).unwrap(),
            "encryption_key": key,
            "created_at": "2024-05-01T09:59:00Z",
            "expire_after_read": 1
        }))
        .unwrap()
    }

    #[test]
    fn validation_rules() {
        assert!(validate_outgoing("  ", &SendOptions::text()).is_err());
        assert!(validate_outgoing("hi", &SendOptions::text()).is_ok());
        assert!(validate_outgoing("", &SendOptions::media(ContentType::Image, " ")).is_err());
        assert!(validate_outgoing("", &SendOptions::media(ContentType::Image, "/u/a.png")).is_ok());
        let no_url = SendOptions {
            content_type: ContentType::Video,
            ..SendOptions::default()
        };
        assert!(validate_outgoing("clip", &no_url).is_err());
    }

    #[test]
    fn decode_handles_missing_pairs() {
        let mut msg = encrypted(1, "secret");
        assert_eq!(decode(&msg), DisplayContent::Plaintext("secret".into()));

        msg.encryption_key = Some("not-the-key".into());
        assert_eq!(decode(&msg), DisplayContent::Undecryptable);

        msg.content = None;
        assert_eq!(decode(&msg), DisplayContent::Empty);

        let mut image = encrypted(2, "");
        image.content_type = ContentType::Image;
        assert_eq!(decode(&image), DisplayContent::Empty);
        image.content = Some(crypto_core::encrypt("real caption", "the-real-key").unwrap());
        image.encryption_key = Some("totally-wrong-key".into());
        assert_eq!(decode(&image), DisplayContent::Undecryptable);

        let mut empty_text = encrypted(3, "");
        empty_text.content_type = ContentType::Text;
        assert_eq!(decode(&empty_text), DisplayContent::Undecryptable);

        msg.content = Some("legacy plain".into());
        msg.encryption_key = None;
        assert_eq!(decode(&msg), DisplayContent::Plaintext("legacy plain".into()));
    }

    #[tokio::test]
    async fn load_decrypts_and_orders() {
        let mut later = encrypted(5, "second");
        later.created_at = Some(t0());
        let earlier = encrypted(9, "first");
        let tie = encrypted(7, "tie");

        let mut gateway = MockChatGateway::new();
        gateway
            .expect_list_messages()
            .with(eq(1), eq(MessagePage::default()))
            .returning(move |_, _| Ok(vec![later.clone(), earlier.clone(), tie.clone()]));
        let store = store(gateway);

        let views = store.load_messages(1, MessagePage::default()).await.unwrap();
        let texts: Vec<_> = views.iter().map(|v| v.text().to_string()).collect();
        assert_eq!(texts, vec!["tie", "first", "second"]);
        assert_eq!(store.active_chat_id(), Some(1));
    }

    #[tokio::test]
    async fn load_rejects_oversized_page() {
        let store = store(MockChatGateway::new());
        let err = store.load_messages(1, MessagePage::new(51, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn send_forces_burn_after_read() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_send_message()
            .withf(|chat_id, msg| {
                *chat_id == 1
                    && msg.expire_after_read
                    && msg.expire_after.is_none()
                    && crypto_core::decrypt(&msg.content, &msg.encryption_key).as_deref()
                        == Ok("hello")
            })
            .times(1)
            .returning(|_, _| {
                Ok(crate::models::SendMessageResponse {
                    message_id: 77,
                    encryption_key: None,
                })
            });
        gateway
            .expect_list_messages()
            .with(eq(1), always())
            .returning(|_, _| Ok(vec![]));
        let store = store(gateway);

        let options = SendOptions {
            expire_after_read: Some(false),
            expire_after: Some(3600),
            ..SendOptions::text()
        };
        let receipt = store.send(1, "hello", options).await.unwrap();
        assert_eq!(receipt.message_id, 77);
        assert_eq!(receipt.encryption_key.len(), 26);
    }

    #[tokio::test]
    async fn send_surfaces_transport_error() {
        let mut gateway = MockChatGateway::new();
        gateway.expect_send_message().returning(|_, _| {
            Err(AppError::Transport {
                status: Some(500),
                message: "boom".into(),
            })
        });
        let store = store(gateway);
        let err = store.send(1, "hello", SendOptions::text()).await.unwrap_err();
        assert!(matches!(err, AppError::Transport { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn refresh_sums_unread_counts() {
        let mut gateway = MockChatGateway::new();
        gateway.expect_list_chats().returning(|| {
            Ok(serde_json::from_value(json!([
                {"id": 1, "unread_count": 2},
                {"id": 2, "unread_count": 0},
                {"id": 3, "unread_count": 5}
            ]))
            .unwrap())
        });
        let store = store(gateway);
        assert!(!store.has_unread());

        store.refresh_chats().await.unwrap();
        assert_eq!(store.unread_total(), 7);
        assert!(store.has_unread());
        assert_eq!(store.chats().len(), 3);
    }

    #[tokio::test]
    async fn read_receipt_sent_for_unloaded_id() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_mark_read()
            .with(eq(55))
            .times(1)
            .returning(|_| Ok(()));
        gateway.expect_list_chats().returning(|| Ok(vec![]));
        let store = store(gateway);

        let outcome = store.mark_read(55).await;
        assert_eq!(
            outcome,
            SyncOutcome {
                local: LocalEffect::NoOp,
                remote: RemoteSync::Synced
            }
        );
    }

    #[tokio::test]
    async fn create_chat_is_always_ephemeral() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_create_chat()
            .with(eq(42), eq(true))
            .returning(|_, _| {
                Ok(CreateChatResponse {
                    chat_id: 9,
                    is_new: false,
                })
            });
        let store = store(gateway);
        let response = store.create_chat(42).await.unwrap();
        assert_eq!(response.chat_id, 9);
    }
}
