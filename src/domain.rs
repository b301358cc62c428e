//! Data model shared across the capture and assembly pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One paginated batch of character summaries from the character-chats endpoint.
///
/// The upstream service reports declared totals alongside each page; only the
/// first page with a nonzero total is trusted (see [crate::registry]).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CharacterListPage {
    #[serde(default)]
    pub characters: Vec<CharacterRecord>,
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
    #[serde(default)]
    pub page: u32,
    #[serde(default, rename = "totalCharacters")]
    pub total_characters: u32,
    #[serde(default, rename = "totalChats")]
    pub total_chats: u32,
}

/// A character summary record as it appears in a character-list page.
///
/// `raw` keeps the full upstream record; list pages carry complete records,
/// so the first sighting is authoritative and never merged with later ones.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CharacterRecord {
    #[serde(default)]
    pub character_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub chat_count: u32,
    #[serde(flatten)]
    pub raw: Value,
}

fn default_true() -> bool {
    true
}

/// One chat summary from a character-expansion response (`{"chats": [...]}`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatSummary {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub raw: Value,
}

/// The real chat payload behind an individual chat page, once discriminated
/// from the framework bootstrap blob that loads alongside it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub character: CharacterInfo,
    #[serde(default)]
    pub chat: ChatInfo,
    #[serde(default, rename = "chatMessages")]
    pub chat_messages: Vec<RawMessage>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CharacterInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub first_messages: Vec<String>,
    #[serde(flatten)]
    pub raw: Value,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub user_name: String,
}

/// One element of a chat payload's message array. The API contract is
/// newest-first within a payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub message: String,
}

impl RawMessage {
    /// A record with neither text nor a timestamp carries nothing usable.
    pub fn is_malformed(&self) -> bool {
        self.message.is_empty() && self.created_at.is_empty()
    }
}

/// Canonical export record, one per logical turn. Matches the import format
/// expected by downstream chat clients.
#[derive(Clone, Debug, Serialize)]
pub struct TranscriptEntry {
    pub name: String,
    pub is_user: bool,
    pub is_system: bool,
    pub send_date: String,
    pub mes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swipes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swipe_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swipe_info: Option<Vec<SwipeInfo>>,
    pub extra: MessageExtra,
    pub force_avatar: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SwipeInfo {
    pub send_date: String,
    pub extra: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageExtra {
    #[serde(rename = "isSmallSys")]
    pub is_small_sys: bool,
    pub token_count: u32,
    pub bias: String,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl Default for MessageExtra {
    fn default() -> Self {
        MessageExtra {
            is_small_sys: false,
            token_count: 0,
            bias: String::new(),
            reasoning: String::new(),
            memory: None,
        }
    }
}

/// An alternate opening line attached to a character, distinct from the
/// displayed first message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlternateGreeting {
    pub index: usize,
    pub message: String,
}
