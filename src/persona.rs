//! User persona name extraction.
//!
//! The persona name (the user's display identity inside a chat) is not part
//! of the chat payload proper. The reliable source is the serialized store
//! state embedded in the page source; payload-side fallback paths exist for
//! older response shapes.

use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde_json::Value;

fn store_state_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // window._storeState_ = JSON.parse("{...escaped json...}");
        Regex::new(r#"window\._storeState_\s*=\s*JSON\.parse\("((?:\\.|[^"\\])*)"\)"#)
            .unwrap_or_else(|err| panic!("invalid store-state pattern: {err}"))
    })
}

/// Extracts the persona name from the page source via the embedded
/// `window._storeState_` blob. Parsing the source directly is more reliable
/// than executing script in the page.
pub fn from_page_source(page_source: &str) -> Option<String> {
    let captures = store_state_pattern().captures(page_source)?;
    let escaped = captures.get(1)?.as_str();

    // The capture is a JS string literal body; decoding it as a JSON string
    // performs the same unescaping.
    let literal = format!("\"{escaped}\"");
    let inner: String = serde_json::from_str(&literal).ok()?;
    let store_state: Value = serde_json::from_str(&inner).ok()?;

    let name = store_state.get("user")?.get("profile")?.get("name")?.as_str()?.trim();
    if name.is_empty() {
        debug!("store state present but persona name empty");
        return None;
    }

    Some(name.to_string())
}

/// Fallback: looks for the persona name inside the chat payload itself.
/// Checked in order: `user.profile.name`, a root-level `name` distinct from
/// the character's, then `chat.user_name`.
pub fn from_payload(payload: &Value) -> Option<String> {
    if let Some(name) = payload
        .get("user")
        .and_then(|u| u.get("profile"))
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    if let Some(name) = payload.get("name").and_then(Value::as_str) {
        let character_name = payload
            .get("character")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !name.is_empty() && name != character_name {
            return Some(name.to_string());
        }
    }

    if let Some(name) = payload
        .get("chat")
        .and_then(|c| c.get("user_name"))
        .and_then(Value::as_str)
    {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    debug!("persona name not found in payload");
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_persona_from_store_state() {
        let page = r#"<script>window._storeState_ = JSON.parse("{\"user\":{\"profile\":{\"name\":\"Pat\"}}}");</script>"#;
        assert_eq!(from_page_source(page), Some("Pat".to_string()));
    }

    #[test]
    fn missing_store_state_yields_none() {
        assert_eq!(from_page_source("<html><body>nothing here</body></html>"), None);
    }

    #[test]
    fn malformed_store_state_yields_none() {
        let page = r#"window._storeState_ = JSON.parse("{not json");"#;
        assert_eq!(from_page_source(page), None);
    }

    #[test]
    fn payload_fallback_prefers_user_profile_path() {
        let payload = json!({
            "user": { "profile": { "name": "Profile Name" } },
            "name": "Root Name",
            "chat": { "user_name": "Chat Name" },
        });
        assert_eq!(from_payload(&payload), Some("Profile Name".to_string()));
    }

    #[test]
    fn root_name_matching_character_is_rejected() {
        let payload = json!({
            "name": "Robot",
            "character": { "name": "Robot" },
            "chat": { "user_name": "Pat" },
        });
        assert_eq!(from_payload(&payload), Some("Pat".to_string()));
    }

    #[test]
    fn no_persona_anywhere_yields_none() {
        assert_eq!(from_payload(&json!({ "chat": {} })), None);
    }
}
