use crate::models::{Chat, ChatId, DisplayContent, MessageId, MessageView};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

pub(crate) type SharedState = Arc<Mutex<ChatState>>;

/// Everything the store holds for the session.
///
/// Guarded by a `parking_lot::Mutex`; callers take the lock for short
/// critical sections and never across an `.await`.
#[derive(Debug, Default)]
pub(crate) struct ChatState {
    pub chats: Vec<Chat>,
    pub unread_total: u32,
    pub current_chat: Option<Chat>,
    /// Chat whose messages are loaded into `messages`
    pub active_chat_id: Option<ChatId>,
    pub messages: Vec<MessageView>,
    /// Ids burned or deleted this session. Never shown again.
    pub burned: HashSet<MessageId>,
}

impl ChatState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(ChatState::default()))
    }

    pub fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|view| view.id() == id)
    }

    pub fn is_terminal(&self, id: MessageId) -> bool {
        self.burned.contains(&id)
    }

    /// Remove a visible message and record it as burned.
    ///
    /// Returns the burned view, or `None` if it was not visible or already
    /// deleted.
    pub fn burn(&mut self, id: MessageId) -> Option<MessageView> {
        let idx = self.position(id)?;
        if self.messages[idx].message.is_deleted {
            return None;
        }
        let mut view = self.messages.remove(idx);
        view.message.is_deleted = true;
        view.message.content = None;
        view.display = DisplayContent::Burned;
        self.burned.insert(id);
        Some(view)
    }

    /// Record an id as terminal without it ever having been visible.
    pub fn tombstone(&mut self, id: MessageId) {
        self.burned.insert(id);
    }

    pub fn set_chats(&mut self, chats: Vec<Chat>) {
        self.unread_total = chats.iter().map(|chat| chat.unread_count).sum();
        self.chats = chats;
    }

    /// Forget the open chat. Burned ids survive.
    pub fn clear_current(&mut self) {
        self.current_chat = None;
        self.active_chat_id = None;
        self.messages.clear();
    }

    pub fn reset(&mut self) {
        *self = ChatState::default();
    }
}
