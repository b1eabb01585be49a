pub mod chat;
pub mod message;
pub mod outcome;

pub use chat::{
    Chat, ChatEnvelope, ChatsEnvelope, CreateChatRequest, CreateChatResponse, Participant,
    PinChatRequest,
};
pub use message::{
    ContentType, DisplayContent, Message, MessagePage, MessageView, MessagesEnvelope,
    OutgoingMessage, SendMessageResponse, SendOptions, SendReceipt, BURNED_TEXT,
    UNDECRYPTABLE_TEXT,
};
pub use outcome::{LocalEffect, RemoteSync, SweepReport, SyncOutcome};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

pub type MessageId = i64;
pub type ChatId = i64;
pub type UserId = i64;

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolLike {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Accepts `true`/`false`, `0`/`1` and their string forms. Null is false.
pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<BoolLike>::deserialize(deserializer)? {
        None => false,
        Some(BoolLike::Bool(b)) => b,
        Some(BoolLike::Int(n)) => n != 0,
        Some(BoolLike::Text(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
    })
}

/// RFC 3339, or MySQL `YYYY-MM-DD HH:MM:SS` read as UTC.
pub(crate) fn lenient_datetime_opt<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(None),
    };
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
