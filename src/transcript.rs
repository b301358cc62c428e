//! Converts raw chat payloads into canonical, time-ordered transcripts.
//!
//! The upstream message array is newest-first and its "is main message" flag
//! is unreliable, so turns are reconstructed heuristically: after reversal,
//! a run of consecutive messages from the same sender is treated as one
//! logical turn whose later elements are swipe variants. The grouping lives
//! in [group_by_sender] alone so it can be swapped if the upstream contract
//! ever firms up.

use std::cmp::Ordering;

use log::{debug, info, warn};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{
    AlternateGreeting, ChatInfo, ChatPayload, MessageExtra, RawMessage, SwipeInfo, TranscriptEntry,
};

/// Sender name used when persona extraction failed upstream.
const FALLBACK_USER_NAME: &str = "You";

/// Sender name used when the payload carries no character name.
const FALLBACK_CHARACTER_NAME: &str = "Character";

/// An assembled chat, ready to hand off to a persistence sink.
#[derive(Clone, Debug)]
pub struct Transcript {
    pub character_name: String,
    pub chat_id: String,
    pub entries: Vec<TranscriptEntry>,
}

/// Assembles one raw chat payload into a canonical transcript.
///
/// Returns `None` for payloads with no usable messages; that signals
/// "nothing to extract", not an error. Malformed individual messages are
/// skipped with a warning and never abort the rest of the chat.
pub fn assemble(payload: &ChatPayload, persona_name: Option<&str>) -> Option<Transcript> {
    if payload.chat_messages.is_empty() {
        warn!("no messages in chat payload");
        return None;
    }

    let usable: Vec<&RawMessage> = payload
        .chat_messages
        .iter()
        .filter(|message| {
            if message.is_malformed() {
                warn!("skipping malformed message record in chat {}", payload.chat.id);
                false
            } else {
                true
            }
        })
        .collect();

    if usable.is_empty() {
        warn!("no valid messages after filtering");
        return None;
    }

    // The API contract is newest-first; working order is oldest-first.
    let oldest_first: Vec<&RawMessage> = usable.into_iter().rev().collect();
    debug!("reversed {} messages to oldest-first", oldest_first.len());

    let character_name = if payload.character.name.is_empty() {
        FALLBACK_CHARACTER_NAME
    } else {
        payload.character.name.as_str()
    };
    let user_name = persona_name.unwrap_or(FALLBACK_USER_NAME);

    let groups = group_by_sender(&oldest_first);
    debug!("grouped into {} logical turns", groups.len());

    let mut entries: Vec<TranscriptEntry> = groups
        .iter()
        .map(|group| convert_group(group, character_name, user_name))
        .collect();

    // Steps above already produce this order; the explicit sort makes it an
    // invariant independent of upstream ordering violations.
    entries.sort_by(|a, b| compare_send_dates(&a.send_date, &b.send_date));

    info!("assembled {} entries for chat {}", entries.len(), payload.chat.id);

    Some(Transcript {
        character_name: character_name.to_string(),
        chat_id: payload.chat.id.clone(),
        entries,
    })
}

/// Partitions an oldest-first message sequence into runs of consecutive
/// messages sharing the same `is_bot` flag. Each run is one logical turn:
/// the first element is the displayed variant, the rest are swipes.
///
/// This is a policy decision standing in for the upstream's unreliable
/// main-message flag, not a verified protocol guarantee.
pub fn group_by_sender<'a>(oldest_first: &'a [&'a RawMessage]) -> Vec<&'a [&'a RawMessage]> {
    let mut groups = Vec::new();
    let mut start = 0;

    for i in 1..=oldest_first.len() {
        if i == oldest_first.len() || oldest_first[i].is_bot != oldest_first[start].is_bot {
            groups.push(&oldest_first[start..i]);
            start = i;
        }
    }

    groups
}

fn convert_group(group: &[&RawMessage], character_name: &str, user_name: &str) -> TranscriptEntry {
    let main = group[0];
    let sender = if main.is_bot { character_name } else { user_name };
    let text = main.message.trim().to_string();

    let (swipes, swipe_id, swipe_info) = if group.len() > 1 {
        let swipes = group.iter().map(|m| m.message.trim().to_string()).collect();
        let info = group
            .iter()
            .map(|m| SwipeInfo {
                send_date: m.created_at.clone(),
                extra: serde_json::json!({}),
            })
            .collect();
        (Some(swipes), Some(0), Some(info))
    } else {
        (None, None, None)
    };

    let mut extra = MessageExtra::default();
    if main.is_bot {
        extra.token_count = estimate_tokens(&text);
    }

    TranscriptEntry {
        name: sender.to_string(),
        is_user: !main.is_bot,
        is_system: false,
        send_date: main.created_at.clone(),
        mes: text,
        swipes,
        swipe_id,
        swipe_info,
        extra,
        force_avatar: String::new(),
    }
}

/// Crude token estimate (~4 characters per token). An estimate, not ground
/// truth.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    std::cmp::max(1, (text.len() / 4) as u32)
}

/// Ascending order on RFC 3339 timestamps, falling back to lexicographic
/// comparison for stamps that fail to parse. Total and deterministic.
fn compare_send_dates(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn parse_timestamp(stamp: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(stamp, &Rfc3339).ok()
}

/// Non-empty alternate opening lines attached to the character, distinct
/// from the displayed first message.
pub fn alternate_greetings(payload: &ChatPayload) -> Vec<AlternateGreeting> {
    let alternates: Vec<AlternateGreeting> = payload
        .character
        .first_messages
        .iter()
        .enumerate()
        .filter(|(_, greeting)| !greeting.trim().is_empty())
        .map(|(index, greeting)| AlternateGreeting {
            index,
            message: greeting.trim().to_string(),
        })
        .collect();

    if !alternates.is_empty() {
        info!("found {} alternate greetings", alternates.len());
    }
    alternates
}

/// The chat's summary/memory text, if any.
pub fn chat_memory(chat: &ChatInfo) -> Option<String> {
    let summary = chat.summary.trim();
    if summary.is_empty() {
        None
    } else {
        Some(summary.to_string())
    }
}
