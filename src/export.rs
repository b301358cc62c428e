//! Transcript persistence in the portable JSONL import format.
//!
//! An export is one metadata line followed by one line per transcript entry.
//! The [TranscriptSink] seam keeps the pipeline free of storage decisions;
//! [JsonlWriter] is the stock directory-backed implementation.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use log::{debug, info};
use serde_json::json;

use crate::errors::Error;
use crate::transcript::Transcript;

/// Longest filename stem produced by [sanitize_filename]; keeps paths inside
/// conservative platform limits.
const MAX_FILENAME_LENGTH: usize = 100;

/// Receives assembled transcripts for durable storage. Ownership of the
/// transcript transfers to the sink.
pub trait TranscriptSink {
    fn write_transcript(&mut self, transcript: &Transcript, memory: Option<&str>) -> Result<(), Error>;
}

/// Serializes a transcript to JSONL lines: metadata first, then entries.
/// When `memory` is present it is injected into the first entry's extras so
/// importing clients pick the summary up with the chat.
pub fn jsonl_lines(transcript: &Transcript, memory: Option<&str>) -> Result<Vec<String>, Error> {
    let metadata = json!({
        "chat_metadata": {
            "integrity": "",
            "chat_id_hash": transcript.chat_id,
            "note_prompt": "",
            "note_interval": 1,
            "note_position": 1,
            "note_depth": 4,
            "note_role": 0,
            "tainted": false,
            "timedWorldInfo": { "sticky": {}, "cooldown": {} },
            "lastInContextMessageId": 0,
        },
        "user_name": "unused",
        "character_name": transcript.character_name,
    });

    let mut lines = vec![serde_json::to_string(&metadata)?];

    let mut entries = transcript.entries.clone();
    if let (Some(memory), Some(first)) = (memory, entries.first_mut()) {
        first.extra.memory = Some(memory.to_string());
        debug!("injected chat memory into first entry");
    }

    for entry in &entries {
        lines.push(serde_json::to_string(entry)?);
    }

    Ok(lines)
}

/// Replaces characters that are invalid in filenames, truncates, and strips
/// trailing dots, spaces and underscores. Never returns an empty name.
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();

    if sanitized.len() > MAX_FILENAME_LENGTH {
        // Truncate on a char boundary at or below the limit.
        let mut end = MAX_FILENAME_LENGTH;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized.truncate(end);
    }

    let sanitized = sanitized.trim_end_matches(['.', ' ', '_']).to_string();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Appends `_+1`, `_+2`, … until the name no longer collides.
pub fn add_duplicate_suffix(base_name: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(base_name) {
        return base_name.to_string();
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base_name}_+{counter}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Writes one `.jsonl` file per transcript under a root directory.
pub struct JsonlWriter {
    root: PathBuf,
    used_names: HashSet<String>,
}

impl JsonlWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonlWriter {
            root: root.into(),
            used_names: HashSet::new(),
        }
    }
}

impl TranscriptSink for JsonlWriter {
    fn write_transcript(&mut self, transcript: &Transcript, memory: Option<&str>) -> Result<(), Error> {
        let base = sanitize_filename(&format!("{} - {}", transcript.character_name, transcript.chat_id));
        let stem = add_duplicate_suffix(&base, &self.used_names);
        self.used_names.insert(stem.clone());

        fs::create_dir_all(&self.root)?;
        let path = self.root.join(format!("{stem}.jsonl"));

        let lines = jsonl_lines(transcript, memory)?;
        let mut file = fs::File::create(&path)?;
        for line in &lines {
            writeln!(file, "{line}")?;
        }

        info!("saved {} entries to {}", transcript.entries.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    use super::*;
    use crate::domain::{MessageExtra, TranscriptEntry};

    fn entry(text: &str, date: &str) -> TranscriptEntry {
        TranscriptEntry {
            name: "Robot".to_string(),
            is_user: false,
            is_system: false,
            send_date: date.to_string(),
            mes: text.to_string(),
            swipes: None,
            swipe_id: None,
            swipe_info: None,
            extra: MessageExtra::default(),
            force_avatar: String::new(),
        }
    }

    fn transcript() -> Transcript {
        Transcript {
            character_name: "Robot".to_string(),
            chat_id: "chat1".to_string(),
            entries: vec![
                entry("hello", "2024-01-01T00:00:01Z"),
                entry("again", "2024-01-01T00:00:02Z"),
            ],
        }
    }

    #[test]
    fn export_is_metadata_line_then_entries() {
        let lines = jsonl_lines(&transcript(), None).unwrap();
        assert_eq!(lines.len(), 3);

        let metadata: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(metadata["character_name"], "Robot");
        assert_eq!(metadata["chat_metadata"]["chat_id_hash"], "chat1");

        let first: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(first["mes"], "hello");
        // Optional swipe fields are omitted, not null.
        assert!(first.get("swipes").is_none());
    }

    #[test]
    fn memory_lands_in_the_first_entry_only() {
        let lines = jsonl_lines(&transcript(), Some("the summary")).unwrap();

        let first: Value = serde_json::from_str(&lines[1]).unwrap();
        let second: Value = serde_json::from_str(&lines[2]).unwrap();
        assert_eq!(first["extra"]["memory"], "the summary");
        assert!(second["extra"].get("memory").is_none());
    }

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?"), "a_b_c_d_e");
        assert_eq!(sanitize_filename("trailing._ "), "trailing");
        assert_eq!(sanitize_filename("???"), "unnamed");
    }

    #[test]
    fn sanitize_truncates_long_names() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_filename(&long).len(), 100);
    }

    #[test]
    fn duplicate_names_get_counter_suffixes() {
        let mut existing = HashSet::new();
        assert_eq!(add_duplicate_suffix("chat", &existing), "chat");

        existing.insert("chat".to_string());
        assert_eq!(add_duplicate_suffix("chat", &existing), "chat_+1");

        existing.insert("chat_+1".to_string());
        assert_eq!(add_duplicate_suffix("chat", &existing), "chat_+2");
    }

    #[test]
    fn writer_persists_jsonl_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JsonlWriter::new(dir.path());

        writer.write_transcript(&transcript(), Some("memo")).unwrap();
        writer.write_transcript(&transcript(), None).unwrap();

        let first = dir.path().join("Robot - chat1.jsonl");
        let second = dir.path().join("Robot - chat1_+1.jsonl");
        assert!(first.exists());
        assert!(second.exists());

        let contents = fs::read_to_string(first).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }
}
