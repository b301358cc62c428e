//! End-to-end run against a fully scripted browser session: list scroll,
//! accordion expansion, chat navigation, and JSONL export on disk.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use chatharvest::stubs::{response_received_entry, BrowserDriverStub, DebugChannelStub};
use chatharvest::{JsonlWriter, ScrapeConfig, Scraper};

fn test_config() -> ScrapeConfig {
    ScrapeConfig {
        turbo_mode: true,
        delay_between_requests: Duration::ZERO,
        delay_between_chats: Duration::ZERO,
        scroll_no_growth_threshold: 2,
        max_scroll_iterations: 10,
        expansion_timeout: Duration::from_millis(200),
        chat_timeout: Duration::from_millis(300),
        ..ScrapeConfig::default()
    }
}

fn scripted_session() -> (Arc<DebugChannelStub>, Arc<BrowserDriverStub>) {
    let channel = Arc::new(DebugChannelStub::default());
    let driver = Arc::new(BrowserDriverStub::new(Arc::clone(&channel)));

    driver.stage_on_script(
        "window.scrollBy",
        vec![response_received_entry(
            "1.1",
            "https://chat.example/api/chats/character-chats?page=1",
            200,
        )],
    );
    channel.set_body(
        "1.1",
        &json!({
            "characters": [
                { "character_id": "char1", "name": "Robot", "is_deleted": false, "is_public": true, "chat_count": 1 },
            ],
            "hasMore": false,
            "page": 1,
            "totalCharacters": 1,
            "totalChats": 1,
        })
        .to_string(),
    );

    driver.stage_on_script(
        "getElementById('char1')",
        vec![response_received_entry(
            "2.1",
            "https://chat.example/api/chats/character/char1/chats",
            200,
        )],
    );
    channel.set_body("2.1", &json!({ "chats": [ { "id": "chat1" } ] }).to_string());

    driver.stage_on_navigate(
        "/chats/chat1",
        vec![
            response_received_entry("3.1", "https://chat.example/_app/chats/chat1/bootstrap.json", 200),
            response_received_entry("3.2", "https://chat.example/api/chats/chat1", 200),
        ],
    );
    channel.set_body("3.1", &json!({ "routes": [] }).to_string());
    channel.set_body(
        "3.2",
        &json!({
            "character": { "name": "Robot", "first_messages": [] },
            "chat": { "id": "chat1", "summary": "remembers the rain", "user_name": "" },
            "chatMessages": [
                { "is_bot": true, "created_at": "2024-01-01T00:00:04Z", "message": "m4" },
                { "is_bot": false, "created_at": "2024-01-01T00:00:03Z", "message": "m3" },
                { "is_bot": true, "created_at": "2024-01-01T00:00:02Z", "message": "m2" },
                { "is_bot": false, "created_at": "2024-01-01T00:00:01Z", "message": "m1" },
            ],
        })
        .to_string(),
    );

    driver.set_page_source(
        r#"<script>window._storeState_ = JSON.parse("{\"user\":{\"profile\":{\"name\":\"Pat\"}}}");</script>"#,
    );

    (channel, driver)
}

#[test]
fn scripted_session_produces_a_jsonl_export() {
    let _ = env_logger::try_init();

    let (channel, driver) = scripted_session();
    let export_dir = tempfile::tempdir().unwrap();

    let mut scraper = Scraper::new(driver, channel, test_config(), "https://chat.example");
    let mut sink = JsonlWriter::new(export_dir.path());

    let summary = scraper.run(&mut sink).unwrap();
    assert_eq!(summary.characters_registered, 1);
    assert_eq!(summary.chats_saved, 1);
    assert_eq!(summary.chats_skipped, 0);
    assert!(!summary.cancelled);

    let path = export_dir.path().join("Robot - chat1.jsonl");
    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 5);

    let metadata: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(metadata["character_name"], "Robot");
    assert_eq!(metadata["chat_metadata"]["chat_id_hash"], "chat1");

    // Entries are oldest-first with the persona applied to user turns and
    // the chat memory injected into the first entry.
    let first: Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(first["mes"], "m1");
    assert_eq!(first["name"], "Pat");
    assert_eq!(first["is_user"], true);
    assert_eq!(first["extra"]["memory"], "remembers the rain");

    let second: Value = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(second["mes"], "m2");
    assert_eq!(second["name"], "Robot");
    assert!(second["extra"].get("memory").is_none());

    let last: Value = serde_json::from_str(lines[4]).unwrap();
    assert_eq!(last["mes"], "m4");
}

#[test]
fn empty_session_saves_nothing_but_completes() {
    let _ = env_logger::try_init();

    let channel = Arc::new(DebugChannelStub::default());
    let driver = Arc::new(BrowserDriverStub::new(Arc::clone(&channel)));
    let export_dir = tempfile::tempdir().unwrap();

    let mut scraper = Scraper::new(driver, channel, test_config(), "https://chat.example");
    let mut sink = JsonlWriter::new(export_dir.path());

    // The channel works but the page produces no traffic at all.
    let summary = scraper.run(&mut sink).unwrap();
    assert_eq!(summary.characters_registered, 0);
    assert_eq!(summary.chats_saved, 0);

    assert!(fs::read_dir(export_dir.path()).unwrap().next().is_none());
}
