use super::{lenient_bool, lenient_datetime_opt, ChatId, MessageId, Participant, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNDECRYPTABLE_TEXT: &str = "(message undecryptable)";
pub const BURNED_TEXT: &str = "(message burned)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    File,
}

impl ContentType {
    /// Media messages carry their payload in `media_url` and must have one.
    pub fn is_media(self) -> bool {
        !matches!(self, ContentType::Text)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Audio => "audio",
            ContentType::Video => "video",
            ContentType::File => "file",
        }
    }
}

/// Message record as returned by the chat backend.
///
/// Booleans come from MySQL `TINYINT` columns and may arrive as `0`/`1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Participant>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_read: bool,
    #[serde(default, deserialize_with = "lenient_datetime_opt")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub expire_after_read: bool,
    /// Absolute TTL in seconds, counted from `created_at`
    #[serde(default)]
    pub expire_after: Option<u64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_deleted: bool,
}

impl Message {
    fn sort_key(&self) -> (Option<DateTime<Utc>>, MessageId) {
        (self.created_at, self.id)
    }

    /// Ordering used for display: oldest first, ties by id.
    pub fn display_order(a: &Message, b: &Message) -> std::cmp::Ordering {
        a.sort_key().cmp(&b.sort_key())
    }
}

/// What a message shows in place of its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayContent {
    Plaintext(String),
    Undecryptable,
    Burned,
    /// Nothing to decrypt (no content/key pair).
    Empty,
}

/// Presentation projection of a [`Message`]. Never sent back to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageView {
    pub message: Message,
    pub display: DisplayContent,
}

impl MessageView {
    pub fn new(message: Message, display: DisplayContent) -> Self {
        Self { message, display }
    }

    pub fn id(&self) -> MessageId {
        self.message.id
    }

    /// Text to render. Sentinels replace content that cannot be shown.
    pub fn text(&self) -> &str {
        match &self.display {
            DisplayContent::Plaintext(text) => text,
            DisplayContent::Undecryptable => UNDECRYPTABLE_TEXT,
            DisplayContent::Burned => BURNED_TEXT,
            DisplayContent::Empty => "",
        }
    }

    pub fn decrypt_failed(&self) -> bool {
        matches!(
            self.display,
            DisplayContent::Undecryptable | DisplayContent::Burned
        )
    }
}

/// Caller options for an outgoing message.
///
/// The expiry fields exist so callers can pass what the UI collected; the
/// store always overrides them with burn-after-read and no TTL.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub content_type: ContentType,
    pub media_url: Option<String>,
    pub expire_after_read: Option<bool>,
    pub expire_after: Option<u64>,
}

impl SendOptions {
    pub fn text() -> Self {
        Self::default()
    }

    pub fn media(content_type: ContentType, media_url: impl Into<String>) -> Self {
        Self {
            content_type,
            media_url: Some(media_url.into()),
            ..Self::default()
        }
    }
}

/// Body of `POST /chats/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub content: String,
    pub content_type: ContentType,
    pub media_url: Option<String>,
    pub encryption_key: String,
    pub expire_after_read: bool,
    pub expire_after: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: MessageId,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// Returned to callers of `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesEnvelope {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Window into a chat's history, newest first on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagePage {
    pub limit: u32,
    pub offset: u32,
}

impl MessagePage {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 50;

    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(crate::error::AppError::Validation(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(())
    }
}

impl Default for MessagePage {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}
