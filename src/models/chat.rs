use super::{lenient_bool, lenient_datetime_opt, ChatId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A chat member. The list endpoint sends bare ids, the detail endpoint
/// sends `{id, username, avatar}` objects; both land here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Participant {
    pub fn from_id(id: UserId) -> Self {
        Self {
            id,
            username: None,
            avatar: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MemberRef {
    Id(UserId),
    Full(Participant),
}

fn members<'de, D>(deserializer: D) -> Result<Vec<Participant>, D::Error>
where
    D: Deserializer<'de>,
{
    let refs = Option::<Vec<MemberRef>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(refs
        .into_iter()
        .map(|member| match member {
            MemberRef::Id(id) => Participant::from_id(id),
            MemberRef::Full(participant) => participant,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    /// Other members, in server order
    #[serde(default, deserialize_with = "members")]
    pub members: Vec<Participant>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_ephemeral: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_pinned: bool,
    #[serde(default, deserialize_with = "lenient_datetime_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.iter().map(|m| m.id).collect()
    }
}

/// Body of `POST /chats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub target_user_id: UserId,
    pub is_ephemeral: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    pub chat_id: ChatId,
    #[serde(default)]
    pub is_new: bool,
}

/// Body of `POST /chats/{id}/pin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinChatRequest {
    pub is_pinned: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatsEnvelope {
    #[serde(default)]
    pub chats: Vec<Chat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatEnvelope {
    pub chat: Chat,
}
