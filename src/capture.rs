//! Network response capture over the browser debug channel.
//!
//! Turns the cumulative performance log into a per-navigation-cycle map of
//! request id → captured response. Bodies are fetched through the debug
//! channel and cached the first time they are seen: the host browser discards
//! buffered bodies within seconds, so a fetch that succeeds once may return
//! empty ever after.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde_json::{json, Value};

use crate::browser::{DebugChannel, GET_RESPONSE_BODY, NETWORK_DISABLE, NETWORK_ENABLE};
use crate::errors::Error;

/// Maximum attempts when fetching a response body through the debug channel.
pub(crate) const BODY_FETCH_RETRIES: u32 = 3;

/// Base delay between body-fetch attempts; attempt `n` waits `n × base`.
const BODY_FETCH_BACKOFF: Duration = Duration::from_millis(500);

/// Metadata for one network response observed on the debug channel.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedResponse {
    pub request_id: String,
    pub url: String,
    pub status: u16,
    pub mime_type: String,
}

/// A captured response whose body parsed as JSON.
#[derive(Clone, Debug)]
pub struct CapturedPayload {
    pub url: String,
    pub data: Value,
}

/// Capture state for one navigation cycle.
///
/// Owned by the scraper for the duration of a run; callers only ever see
/// snapshots returned by [poll_new_responses](ResponseCapture::poll_new_responses)
/// and [new_payloads](ResponseCapture::new_payloads).
pub struct ResponseCapture {
    channel: Arc<dyn DebugChannel>,
    targets: Vec<String>,
    captured: HashMap<String, CapturedResponse>,
    body_cache: HashMap<String, String>,
    handed_out: HashSet<String>,
    backoff_base: Duration,
    enabled: bool,
}

impl ResponseCapture {
    /// Creates a capture instance filtering to URLs containing any of `targets`.
    pub fn new(channel: Arc<dyn DebugChannel>, targets: Vec<String>) -> Self {
        ResponseCapture {
            channel,
            targets,
            captured: HashMap::new(),
            body_cache: HashMap::new(),
            handed_out: HashSet::new(),
            backoff_base: BODY_FETCH_BACKOFF,
            enabled: false,
        }
    }

    /// Overrides the body-fetch backoff base. Turbo runs and tests shorten it.
    pub fn with_backoff(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Activates network event reporting. Refusal is non-fatal: the run
    /// degrades to "no data captured" and downstream waits simply time out.
    pub fn enable(&mut self) -> bool {
        match self.channel.command(NETWORK_ENABLE, json!({})) {
            Ok(_) => {
                debug!("network capture enabled");
                self.enabled = true;
                true
            }
            Err(err) => {
                warn!("could not enable network capture: {err}");
                self.enabled = false;
                false
            }
        }
    }

    /// Turns network event reporting back off. Best effort.
    pub fn disable(&mut self) {
        if let Err(err) = self.channel.command(NETWORK_DISABLE, json!({})) {
            debug!("could not disable network capture: {err}");
        }
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drains the debug log and records response-received events whose URL
    /// matches the allow-list. Returns metadata for responses first seen by
    /// this call. Bodies are early-cached immediately: waiting until a caller
    /// asks for them risks the browser having dropped them already.
    pub fn poll_new_responses(&mut self) -> Vec<CapturedResponse> {
        let entries = self.channel.drain_log();
        let mut fresh = Vec::new();

        for entry in entries {
            let Some(response) = self.parse_log_entry(&entry) else {
                continue;
            };
            if self.captured.contains_key(&response.request_id) {
                continue;
            }

            debug!("captured response: {} (status {})", response.url, response.status);

            if !self.body_cache.contains_key(&response.request_id) {
                if let Some(body) = self.fetch_body_once(&response.request_id) {
                    debug!("early-cached body for {} ({} chars)", response.request_id, body.len());
                    self.body_cache.insert(response.request_id.clone(), body);
                }
            }

            self.captured.insert(response.request_id.clone(), response.clone());
            fresh.push(response);
        }

        fresh
    }

    /// Returns the body for `request_id`, fetching it through the debug
    /// channel if the early cache missed. Fetches retry up to
    /// [BODY_FETCH_RETRIES] times with linearly increasing backoff; exhausted
    /// retries yield `None`, never an error.
    pub fn fetch_body(&mut self, request_id: &str) -> Option<String> {
        if let Some(body) = self.body_cache.get(request_id) {
            debug!("body for {request_id} served from early cache ({} chars)", body.len());
            return Some(body.clone());
        }

        for attempt in 1..=BODY_FETCH_RETRIES {
            if let Some(body) = self.fetch_body_once(request_id) {
                self.body_cache.insert(request_id.to_string(), body.clone());
                return Some(body);
            }
            if attempt < BODY_FETCH_RETRIES {
                debug!("empty body for {request_id}, retrying ({attempt}/{BODY_FETCH_RETRIES})");
                thread::sleep(self.backoff_base * attempt);
            }
        }

        debug!("body for {request_id} unavailable after {BODY_FETCH_RETRIES} attempts");
        None
    }

    /// Captured responses with JSON bodies that have not been handed out yet.
    /// Responses whose body is unavailable stay pending and are retried on
    /// the next call; non-JSON bodies are logged and retried likewise.
    pub fn new_payloads(&mut self) -> Vec<CapturedPayload> {
        self.poll_new_responses();

        let pending: Vec<CapturedResponse> = self
            .captured
            .values()
            .filter(|response| !self.handed_out.contains(&response.request_id))
            .cloned()
            .collect();

        let mut payloads = Vec::new();
        for response in pending {
            let Some(body) = self.fetch_body(&response.request_id) else {
                continue;
            };
            match serde_json::from_str::<Value>(&body) {
                Ok(data) => {
                    self.handed_out.insert(response.request_id.clone());
                    payloads.push(CapturedPayload { url: response.url, data });
                }
                Err(err) => {
                    debug!("non-JSON response from {}: {err}", response.url);
                }
            }
        }

        payloads
    }

    /// Hard barrier before a navigation: re-enables the event channel, resets
    /// all per-cycle state, and drains the cumulative log so subsequent polls
    /// only see events from the new navigation. Must run before the
    /// navigation is triggered, not after.
    pub fn prepare_for_navigation(&mut self) -> Result<(), Error> {
        self.channel
            .command(NETWORK_ENABLE, json!({}))
            .map_err(|err| Error::ChannelUnavailable(err.to_string()))?;
        self.enabled = true;

        self.clear();
        let discarded = self.channel.drain_log();
        debug!("prepared for navigation ({} stale log entries discarded)", discarded.len());

        Ok(())
    }

    /// Resets captured responses, the handed-out set, and the body cache.
    /// Idempotent.
    pub fn clear(&mut self) {
        self.captured.clear();
        self.handed_out.clear();
        self.body_cache.clear();
    }

    /// Number of responses captured in the current cycle.
    pub fn captured_count(&self) -> usize {
        self.captured.len()
    }

    fn fetch_body_once(&self, request_id: &str) -> Option<String> {
        let result = self
            .channel
            .command(GET_RESPONSE_BODY, json!({ "requestId": request_id }));
        match result {
            Ok(value) => match value.get("body").and_then(Value::as_str) {
                Some(body) if !body.is_empty() => Some(body.to_string()),
                _ => None,
            },
            Err(_) => None,
        }
    }

    /// Extracts a matching response-received event from one raw log record.
    fn parse_log_entry(&self, entry: &str) -> Option<CapturedResponse> {
        let record: Value = serde_json::from_str(entry).ok()?;
        let message = record.get("message")?;
        if message.get("method")?.as_str()? != "Network.responseReceived" {
            return None;
        }

        let params = message.get("params")?;
        let request_id = params.get("requestId")?.as_str()?.to_string();
        let response = params.get("response")?;
        let url = response.get("url")?.as_str()?.to_string();

        if !self.targets.iter().any(|target| url.contains(target)) {
            return None;
        }

        Some(CapturedResponse {
            request_id,
            url,
            status: response.get("status").and_then(Value::as_u64).unwrap_or(0) as u16,
            mime_type: response
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::stubs::{response_received_entry, DebugChannelStub};

    fn capture_with(stub: Arc<DebugChannelStub>) -> ResponseCapture {
        ResponseCapture::new(stub, vec!["api/chats".into()]).with_backoff(Duration::ZERO)
    }

    #[test]
    fn poll_filters_by_target_and_dedupes_across_polls() {
        let stub = Arc::new(DebugChannelStub::default());
        stub.push_log_batch(vec![
            response_received_entry("7.1", "https://example.com/api/chats/character-chats?page=1", 200),
            response_received_entry("7.2", "https://example.com/static/app.js", 200),
        ]);

        let mut capture = capture_with(Arc::clone(&stub));

        let first = capture.poll_new_responses();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].request_id, "7.1");

        // Same request id re-reported in a later drain is not new.
        stub.push_log_batch(vec![response_received_entry(
            "7.1",
            "https://example.com/api/chats/character-chats?page=1",
            200,
        )]);
        let second = capture.poll_new_responses();
        assert!(second.is_empty());
    }

    #[test]
    fn body_cached_on_first_success_even_when_channel_goes_empty() {
        let stub = Arc::new(DebugChannelStub::default());
        stub.script_body("9.4", json!({ "body": "{\"chats\":[]}" }));
        stub.script_body("9.4", json!({ "body": "" }));

        let mut capture = capture_with(Arc::clone(&stub));

        let first = capture.fetch_body("9.4");
        let second = capture.fetch_body("9.4");

        assert_eq!(first.as_deref(), Some("{\"chats\":[]}"));
        assert_eq!(second, first);
        // Second call never went back to the channel.
        assert_eq!(stub.body_requests("9.4"), 1);
    }

    #[test]
    fn body_fetch_gives_up_after_bounded_retries() {
        let stub = Arc::new(DebugChannelStub::default());
        // No scripted bodies: every attempt comes back empty.
        let mut capture = capture_with(Arc::clone(&stub));

        assert_eq!(capture.fetch_body("1.1"), None);
        assert_eq!(stub.body_requests("1.1"), BODY_FETCH_RETRIES as usize);
    }

    #[test]
    fn new_payloads_returns_parsed_bodies_once() {
        let stub = Arc::new(DebugChannelStub::default());
        stub.push_log_batch(vec![response_received_entry(
            "3.1",
            "https://example.com/api/chats/character-chats?page=1",
            200,
        )]);
        stub.script_body("3.1", json!({ "body": "{\"page\":1}" }));

        let mut capture = capture_with(stub);

        let payloads = capture.new_payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].data, json!({ "page": 1 }));

        // Already handed out; nothing new without new traffic.
        assert!(capture.new_payloads().is_empty());
    }

    #[test]
    fn prepare_for_navigation_clears_state_and_drains_log() {
        let stub = Arc::new(DebugChannelStub::default());
        stub.push_log_batch(vec![response_received_entry(
            "5.1",
            "https://example.com/api/chats/character-chats?page=1",
            200,
        )]);
        stub.script_body("5.1", json!({ "body": "{}" }));

        let mut capture = capture_with(Arc::clone(&stub));
        capture.poll_new_responses();
        assert_eq!(capture.captured_count(), 1);

        // Stale traffic lands in the log before the barrier runs.
        stub.push_log_batch(vec![response_received_entry(
            "5.2",
            "https://example.com/api/chats/character-chats?page=2",
            200,
        )]);

        capture.prepare_for_navigation().unwrap();
        assert_eq!(capture.captured_count(), 0);

        // The stale batch was discarded by the barrier, not replayed.
        assert!(capture.poll_new_responses().is_empty());
    }

    #[test]
    fn enable_refusal_is_non_fatal() {
        let stub = Arc::new(DebugChannelStub::refusing());
        let mut capture = capture_with(stub);

        assert!(!capture.enable());
        assert!(!capture.is_enabled());
        assert!(capture.poll_new_responses().is_empty());
    }

    #[test]
    fn clear_is_idempotent() {
        let stub = Arc::new(DebugChannelStub::default());
        let mut capture = capture_with(stub);
        capture.clear();
        capture.clear();
        assert_eq!(capture.captured_count(), 0);
    }
}
