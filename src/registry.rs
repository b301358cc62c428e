//! Deduplicated registry built from paginated character-list responses.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::domain::{CharacterListPage, CharacterRecord};

/// Outcome of ingesting one page.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IngestOutcome {
    pub added: usize,
    pub skipped: usize,
}

/// Result of comparing the registry against the totals the service declared.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CountValidation {
    pub ok: bool,
    pub expected: u32,
    pub actual: u32,
}

/// Merges character-list pages into one registry keyed by character id.
///
/// First-seen wins: list pages carry complete records, so duplicate sightings
/// across pages are dropped, never merged. Deleted and private are tracked as
/// overlapping sets; a character may be in both.
#[derive(Default)]
pub struct CharacterRegistry {
    characters: HashMap<String, CharacterRecord>,
    insertion_order: Vec<String>,
    deleted: HashSet<String>,
    private: HashSet<String>,
    expected_characters: u32,
    expected_chats: u32,
}

impl CharacterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests one page. Records without an id are skipped with a warning;
    /// ids already present are skipped silently. Declared totals are latched
    /// from the first page reporting a nonzero total and never overwritten.
    pub fn ingest_page(&mut self, page: &CharacterListPage) -> IngestOutcome {
        if self.expected_characters == 0 && page.total_characters > 0 {
            self.expected_characters = page.total_characters;
            self.expected_chats = page.total_chats;
            info!(
                "service reports {} total characters, {} total chats",
                page.total_characters, page.total_chats
            );
        }

        let mut outcome = IngestOutcome::default();

        for record in &page.characters {
            if record.character_id.is_empty() {
                warn!("skipping character without id: {}", record.name);
                outcome.skipped += 1;
                continue;
            }
            if self.characters.contains_key(&record.character_id) {
                debug!("character already registered: {}", record.name);
                outcome.skipped += 1;
                continue;
            }

            if record.is_deleted {
                self.deleted.insert(record.character_id.clone());
            }
            if !record.is_public {
                self.private.insert(record.character_id.clone());
            }

            debug!("registered character: {} ({} chats)", record.name, record.chat_count);
            self.insertion_order.push(record.character_id.clone());
            self.characters.insert(record.character_id.clone(), record.clone());
            outcome.added += 1;
        }

        outcome
    }

    /// Compares registry size to the declared total. A mismatch is expected
    /// under pagination races and reported as a warning, never an error.
    pub fn validate(&self) -> CountValidation {
        let actual = self.characters.len() as u32;
        let ok = self.expected_characters == 0 || actual == self.expected_characters;

        if ok {
            info!("character count validation passed: {actual}/{}", self.expected_characters);
        } else {
            warn!(
                "character count mismatch: registered {actual} but service declared {}",
                self.expected_characters
            );
        }

        CountValidation {
            ok,
            expected: self.expected_characters,
            actual,
        }
    }

    pub fn get(&self, character_id: &str) -> Option<&CharacterRecord> {
        self.characters.get(character_id)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn expected_chats(&self) -> u32 {
        self.expected_chats
    }

    /// Characters that are neither deleted nor private, in first-seen order.
    pub fn all_valid(&self) -> Vec<&CharacterRecord> {
        self.in_order(|record| !record.is_deleted && record.is_public)
    }

    /// Deleted characters, in first-seen order.
    pub fn deleted(&self) -> Vec<&CharacterRecord> {
        self.in_order(|record| record.is_deleted)
    }

    /// Private characters, in first-seen order.
    pub fn private(&self) -> Vec<&CharacterRecord> {
        self.in_order(|record| !record.is_public)
    }

    fn in_order(&self, predicate: impl Fn(&CharacterRecord) -> bool) -> Vec<&CharacterRecord> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.characters.get(id))
            .filter(|record| predicate(record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(id: &str, name: &str, deleted: bool, public: bool) -> CharacterRecord {
        CharacterRecord {
            character_id: id.to_string(),
            name: name.to_string(),
            is_deleted: deleted,
            is_public: public,
            chat_count: 1,
            ..Default::default()
        }
    }

    fn page(characters: Vec<CharacterRecord>, total: u32) -> CharacterListPage {
        CharacterListPage {
            characters,
            total_characters: total,
            total_chats: total * 2,
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_ids_keep_the_first_record() {
        let mut registry = CharacterRegistry::new();

        registry.ingest_page(&page(vec![record("c1", "First sighting", false, true)], 2));
        let outcome = registry.ingest_page(&page(vec![record("c1", "Second sighting", false, true)], 2));

        assert_eq!(outcome, IngestOutcome { added: 0, skipped: 1 });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("c1").unwrap().name, "First sighting");
    }

    #[test]
    fn records_without_id_are_skipped() {
        let mut registry = CharacterRegistry::new();
        let outcome = registry.ingest_page(&page(vec![record("", "Nameless", false, true)], 0));

        assert_eq!(outcome, IngestOutcome { added: 0, skipped: 1 });
        assert!(registry.is_empty());
    }

    #[test]
    fn deleted_and_private_sets_may_overlap() {
        let mut registry = CharacterRegistry::new();
        registry.ingest_page(&page(
            vec![
                record("a", "Public", false, true),
                record("b", "Deleted", true, true),
                record("c", "Private", false, false),
                record("d", "Both", true, false),
            ],
            4,
        ));

        let valid: Vec<&str> = registry.all_valid().iter().map(|r| r.character_id.as_str()).collect();
        let deleted: Vec<&str> = registry.deleted().iter().map(|r| r.character_id.as_str()).collect();
        let private: Vec<&str> = registry.private().iter().map(|r| r.character_id.as_str()).collect();

        assert_eq!(valid, vec!["a"]);
        assert_eq!(deleted, vec!["b", "d"]);
        assert_eq!(private, vec!["c", "d"]);
    }

    #[test]
    fn declared_totals_latch_on_first_nonzero_report() {
        let mut registry = CharacterRegistry::new();

        registry.ingest_page(&page(vec![record("a", "A", false, true)], 0));
        registry.ingest_page(&page(vec![record("b", "B", false, true)], 10));
        registry.ingest_page(&page(vec![record("c", "C", false, true)], 99));

        assert_eq!(registry.validate().expected, 10);
        assert_eq!(registry.expected_chats(), 20);
    }

    #[test]
    fn undercount_fails_validation_but_never_stops_ingestion() {
        let mut registry = CharacterRegistry::new();

        registry.ingest_page(&page(vec![record("a", "A", false, true)], 3));
        let validation = registry.validate();
        assert_eq!(
            validation,
            CountValidation {
                ok: false,
                expected: 3,
                actual: 1
            }
        );

        // Ingestion keeps working after a failed validation.
        registry.ingest_page(&page(vec![record("b", "B", false, true)], 3));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn validation_passes_without_a_declared_total() {
        let mut registry = CharacterRegistry::new();
        registry.ingest_page(&page(vec![record("a", "A", false, true)], 0));
        assert!(registry.validate().ok);
    }
}
