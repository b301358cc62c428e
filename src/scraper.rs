//! The driving loop: trigger a UI action, wait for the network responses it
//! causes, hand payloads to the accumulator or assembler, and pass finished
//! transcripts to the persistence sink.
//!
//! Everything runs on one logical thread. Operations are strictly sequential
//! (one character expanded at a time, one chat fetched at a time) so that
//! URL-substring correlation against the single browser session stays
//! unambiguous.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::browser::{BrowserDriver, DebugChannel, SET_FOCUS_EMULATION};
use crate::capture::ResponseCapture;
use crate::config::ScrapeConfig;
use crate::correlator::{discriminate, Confidence, ResponseCorrelator};
use crate::domain::{AlternateGreeting, ChatPayload, ChatSummary};
use crate::errors::Error;
use crate::export::TranscriptSink;
use crate::limiter::RateLimiter;
use crate::persona;
use crate::registry::CharacterRegistry;
use crate::transcript::{self, Transcript};

/// URL substring of character-list pagination responses.
const LIST_PATTERN: &str = "chats/character-chats";

/// Path of the page listing the user's chats, relative to the base URL.
const LIST_PAGE_PATH: &str = "/my_chats";

/// Reload-and-retry attempts per chat fetch.
const MAX_NAVIGATION_ATTEMPTS: u32 = 2;

/// A chat fetch is expected to produce the framework bootstrap response plus
/// the data response.
const EXPECTED_CHAT_RESPONSES: usize = 2;

#[derive(Deserialize)]
struct ExpansionResponse {
    #[serde(default)]
    chats: Vec<ChatSummary>,
}

/// Everything extracted from one chat page.
#[derive(Debug)]
pub struct ChatExtract {
    pub transcript: Transcript,
    pub memory: Option<String>,
    /// Alternate opening lines found on the character. The JSONL export has
    /// no slot for these; they are surfaced for callers driving
    /// [fetch_chat](Scraper::fetch_chat) directly.
    pub alternates: Vec<AlternateGreeting>,
}

/// Counters reported at the end of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub characters_registered: usize,
    pub chats_saved: usize,
    pub chats_skipped: usize,
    pub cancelled: bool,
}

/// Drives one scraping run over a single browser session.
pub struct Scraper {
    driver: Arc<dyn BrowserDriver>,
    channel: Arc<dyn DebugChannel>,
    capture: ResponseCapture,
    correlator: ResponseCorrelator,
    registry: CharacterRegistry,
    limiter: RateLimiter,
    config: ScrapeConfig,
    stop: Arc<AtomicBool>,
    base_url: String,
}

impl Scraper {
    pub fn new(driver: Arc<dyn BrowserDriver>, channel: Arc<dyn DebugChannel>, config: ScrapeConfig, base_url: &str) -> Self {
        let targets = vec![
            LIST_PATTERN.to_string(),
            "chats/character/".to_string(),
            "/chats/".to_string(),
        ];
        let mut capture = ResponseCapture::new(Arc::clone(&channel), targets);
        if config.turbo_mode {
            capture = capture.with_backoff(std::time::Duration::from_millis(100));
        }

        Scraper {
            correlator: ResponseCorrelator::new(config.poll_interval()),
            limiter: RateLimiter::new(config.delay_between_requests),
            capture,
            registry: CharacterRegistry::new(),
            driver,
            channel,
            stop: Arc::new(AtomicBool::new(false)),
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    /// Handle for requesting a cooperative stop. The current unit of work
    /// finishes its bounded wait, then the run exits cleanly.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn registry(&self) -> &CharacterRegistry {
        &self.registry
    }

    /// Full run: register all characters, expand each valid one, fetch its
    /// chats, hand assembled transcripts to `sink`.
    pub fn run(&mut self, sink: &mut dyn TranscriptSink) -> Result<RunSummary, Error> {
        self.setup();

        self.driver.navigate_to(&self.list_page_url())?;
        thread::sleep(self.config.navigation_wait());

        self.collect_characters()?;

        let mut summary = RunSummary {
            characters_registered: self.registry.len(),
            ..RunSummary::default()
        };

        let character_ids: Vec<String> = self
            .registry
            .all_valid()
            .iter()
            .map(|record| record.character_id.clone())
            .collect();

        'characters: for character_id in character_ids {
            if self.stop_requested() {
                summary.cancelled = true;
                break;
            }

            let Some(chats) = self.expand_character(&character_id) else {
                continue;
            };
            info!("character {character_id}: {} chats", chats.len());

            for chat in chats {
                if self.stop_requested() {
                    summary.cancelled = true;
                    break 'characters;
                }
                if chat.id.is_empty() {
                    debug!("skipping chat without id for character {character_id}");
                    continue;
                }

                let Some(extract) = self.fetch_chat(&chat.id) else {
                    summary.chats_skipped += 1;
                    continue;
                };
                if !extract.alternates.is_empty() {
                    debug!("chat {}: {} alternate greetings (not exported)", chat.id, extract.alternates.len());
                }

                let entry_count = extract.transcript.entries.len();
                if entry_count >= self.config.message_limit || self.config.keep_partial_extracts {
                    sink.write_transcript(&extract.transcript, extract.memory.as_deref())?;
                    summary.chats_saved += 1;
                } else {
                    debug!(
                        "chat {} has {entry_count} entries (below limit {}), skipping",
                        chat.id, self.config.message_limit
                    );
                    summary.chats_skipped += 1;
                }
            }
        }

        self.capture.disable();

        if summary.cancelled {
            info!("stop requested, exiting cleanly");
        }
        info!(
            "run complete: {} characters, {} chats saved, {} skipped",
            summary.characters_registered, summary.chats_saved, summary.chats_skipped
        );
        Ok(summary)
    }

    /// Enables capture and focus emulation. Both are best effort; a browser
    /// without debug support degrades to an empty run, which
    /// [collect_characters](Self::collect_characters) turns into a hard error
    /// if truly nothing arrives.
    pub fn setup(&mut self) {
        if !self.capture.enable() {
            warn!("network capture unavailable, run will rely on nothing being captured");
        }
        if let Err(err) = self.channel.command(SET_FOCUS_EMULATION, json!({ "enabled": true })) {
            warn!("could not enable focus emulation: {err}");
        }
    }

    /// Scrolls through the character list, ingesting every pagination
    /// response the scrolling triggers, until the list stops growing or the
    /// iteration cap is reached.
    pub fn collect_characters(&mut self) -> Result<(), Error> {
        let scroll_increment = if self.config.turbo_mode { 3000 } else { 1000 };
        let mut scrolls = 0;
        let mut no_progress = 0;
        let mut last_count = 0;

        while scrolls < self.config.max_scroll_iterations && no_progress < self.config.scroll_no_growth_threshold {
            if let Err(err) = self.driver.execute_script(&format!("window.scrollBy(0, {scroll_increment});")) {
                warn!("scroll {} failed: {err}", scrolls + 1);
            }
            thread::sleep(self.config.scroll_pause());
            scrolls += 1;

            self.ingest_list_payloads();

            let count = self.registry.len();
            if count > last_count {
                info!("registered {count} characters (scroll {scrolls})");
                last_count = count;
                no_progress = 0;
            } else {
                no_progress += 1;
            }
        }

        if scrolls >= self.config.max_scroll_iterations {
            warn!("reached maximum scroll count ({scrolls})");
        } else {
            info!("list stopped growing after {scrolls} scrolls");
        }

        if let Err(err) = self.driver.execute_script("window.scrollTo(0, 0);") {
            warn!("could not scroll back to top: {err}");
        }

        self.registry.validate();

        // The one condition that fails the whole run: no debug channel and
        // nothing captured for the very first operation means every later
        // step would silently produce an empty result set.
        if !self.capture.is_enabled() && self.registry.is_empty() {
            return Err(Error::NothingCaptured(
                "debug channel unavailable and no character-list responses captured".into(),
            ));
        }

        Ok(())
    }

    /// Clicks a character's accordion row and waits for the chat-expansion
    /// response it triggers. Timing out is a per-character degradation, not
    /// a run failure.
    pub fn expand_character(&mut self, character_id: &str) -> Option<Vec<ChatSummary>> {
        if !self.ensure_on_list_page() {
            return None;
        }
        self.limiter.apply(None);

        let click = format!("document.getElementById('{character_id}').querySelector('button').click();");
        if let Err(err) = self.driver.execute_script(&click) {
            warn!("could not click accordion for {character_id}: {err}");
            return None;
        }

        let pattern = format!("chats/character/{character_id}/chats");
        let payload = self
            .correlator
            .wait_for_response(&mut self.capture, &pattern, self.config.expansion_timeout);

        // Collapse regardless of outcome so the next row is clickable.
        let _ = self.driver.execute_script(&click);

        let Some(payload) = payload else {
            warn!("timeout waiting for chats of character {character_id}");
            self.ensure_on_list_page();
            return None;
        };

        match serde_json::from_value::<ExpansionResponse>(payload) {
            Ok(response) => Some(response.chats),
            Err(err) => {
                warn!("malformed expansion response for {character_id}: {err}");
                None
            }
        }
    }

    /// Navigates to a chat page and captures the payload behind it, retrying
    /// once with a reload. Returns `None` when the chat yields nothing, and
    /// the run moves on.
    pub fn fetch_chat(&mut self, chat_id: &str) -> Option<ChatExtract> {
        self.limiter.apply(Some(self.config.delay_between_chats));
        let url = format!("{}/chats/{}", self.base_url, chat_id);

        for attempt in 1..=MAX_NAVIGATION_ATTEMPTS {
            if let Err(err) = self.capture.prepare_for_navigation() {
                warn!("could not prepare capture for chat {chat_id}: {err}");
                return None;
            }

            let navigation = if attempt == 1 {
                self.driver.navigate_to(&url)
            } else {
                self.driver.refresh()
            };
            if let Err(err) = navigation {
                warn!("navigation to chat {chat_id} failed: {err}");
                return None;
            }
            thread::sleep(self.config.navigation_wait());

            let candidates =
                self.correlator
                    .wait_for_any_of(&mut self.capture, chat_id, EXPECTED_CHAT_RESPONSES, self.config.chat_timeout);

            if let Some((payload, confidence)) = discriminate(candidates) {
                if confidence == Confidence::SoleCandidate {
                    debug!("chat {chat_id}: proceeding with unconfirmed payload structure");
                }

                let persona_name = self
                    .driver
                    .page_source()
                    .ok()
                    .and_then(|source| persona::from_page_source(&source))
                    .or_else(|| persona::from_payload(&payload));

                let parsed: ChatPayload = match serde_json::from_value(payload) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!("chat {chat_id}: payload did not parse: {err}");
                        return None;
                    }
                };

                let memory = transcript::chat_memory(&parsed.chat);
                let alternates = transcript::alternate_greetings(&parsed);
                let mut assembled = transcript::assemble(&parsed, persona_name.as_deref())?;
                if assembled.chat_id.is_empty() {
                    assembled.chat_id = chat_id.to_string();
                }

                return Some(ChatExtract {
                    transcript: assembled,
                    memory,
                    alternates,
                });
            }

            if attempt < MAX_NAVIGATION_ATTEMPTS {
                warn!("no usable payload for chat {chat_id} (attempt {attempt}), reloading");
            } else {
                warn!("no usable payload for chat {chat_id} after {MAX_NAVIGATION_ATTEMPTS} attempts");
            }
        }

        None
    }

    fn list_page_url(&self) -> String {
        format!("{}{LIST_PAGE_PATH}", self.base_url)
    }

    fn on_list_page(&self) -> bool {
        self.driver
            .current_url()
            .map(|url| url.contains(LIST_PAGE_PATH))
            .unwrap_or(false)
    }

    /// Navigates back to the list page when an expansion or fetch left the
    /// session elsewhere.
    fn ensure_on_list_page(&mut self) -> bool {
        if self.on_list_page() {
            return true;
        }

        info!("navigating back to the character list");
        if let Err(err) = self.driver.navigate_to(&self.list_page_url()) {
            warn!("could not return to the character list: {err}");
            return false;
        }
        thread::sleep(self.config.navigation_wait());
        self.capture.enable();
        self.on_list_page()
    }

    fn ingest_list_payloads(&mut self) {
        for payload in self.capture.new_payloads() {
            if !payload.url.contains(LIST_PATTERN) {
                continue;
            }
            match serde_json::from_value(payload.data) {
                Ok(page) => {
                    self.registry.ingest_page(&page);
                }
                Err(err) => {
                    warn!("malformed character-list response from {}: {err}", payload.url);
                }
            }
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}
