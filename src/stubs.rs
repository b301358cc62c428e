//! Scripted collaborator stubs for tests.
//!
//! Kept public (but hidden from docs) so integration tests can drive the
//! scraper without a browser.
#![doc(hidden)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::browser::{BrowserDriver, DebugChannel, GET_RESPONSE_BODY};
use crate::errors::Error;

/// Builds the raw log record for one `Network.responseReceived` event.
pub fn response_received_entry(request_id: &str, url: &str, status: u16) -> String {
    json!({
        "message": {
            "method": "Network.responseReceived",
            "params": {
                "requestId": request_id,
                "response": {
                    "url": url,
                    "status": status,
                    "mimeType": "application/json",
                }
            }
        }
    })
    .to_string()
}

/// Debug channel whose log and body responses are scripted by the test.
#[derive(Default)]
pub struct DebugChannelStub {
    log: Mutex<VecDeque<String>>,
    scripted_bodies: Mutex<HashMap<String, VecDeque<Value>>>,
    fixed_bodies: Mutex<HashMap<String, String>>,
    body_request_counts: Mutex<HashMap<String, usize>>,
    commands: Mutex<Vec<String>>,
    refuse_commands: bool,
}

impl DebugChannelStub {
    /// A channel that refuses every command, as a browser without debug
    /// support would.
    pub fn refusing() -> Self {
        DebugChannelStub {
            refuse_commands: true,
            ..Default::default()
        }
    }

    /// Queues log entries to be handed out by the next drain.
    pub fn push_log_batch(&self, entries: Vec<String>) {
        self.log.lock().unwrap().extend(entries);
    }

    /// Scripts the result of one `Network.getResponseBody` call, consumed in
    /// FIFO order per request id.
    pub fn script_body(&self, request_id: &str, result: Value) {
        self.scripted_bodies
            .lock()
            .unwrap()
            .entry(request_id.to_string())
            .or_default()
            .push_back(result);
    }

    /// Sets a body returned for every `Network.getResponseBody` call on
    /// `request_id` that has no scripted result pending.
    pub fn set_body(&self, request_id: &str, body: &str) {
        self.fixed_bodies
            .lock()
            .unwrap()
            .insert(request_id.to_string(), body.to_string());
    }

    /// Number of body fetches issued for `request_id`.
    pub fn body_requests(&self, request_id: &str) -> usize {
        *self.body_request_counts.lock().unwrap().get(request_id).unwrap_or(&0)
    }

    /// Methods invoked on the channel, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl DebugChannel for DebugChannelStub {
    fn command(&self, method: &str, params: Value) -> Result<Value, Error> {
        self.commands.lock().unwrap().push(method.to_string());

        if self.refuse_commands {
            return Err(Error::ChannelUnavailable("stubbed refusal".into()));
        }

        if method == GET_RESPONSE_BODY {
            let request_id = params
                .get("requestId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            *self.body_request_counts.lock().unwrap().entry(request_id.clone()).or_insert(0) += 1;

            if let Some(scripted) = self.scripted_bodies.lock().unwrap().get_mut(&request_id) {
                if let Some(result) = scripted.pop_front() {
                    return Ok(result);
                }
            }
            if let Some(body) = self.fixed_bodies.lock().unwrap().get(&request_id) {
                return Ok(json!({ "body": body }));
            }
            return Ok(json!({ "body": "" }));
        }

        Ok(json!({}))
    }

    fn drain_log(&self) -> Vec<String> {
        self.log.lock().unwrap().drain(..).collect()
    }
}

/// Browser driver that records actions and can inject log traffic into a
/// [DebugChannelStub] when a navigation or script matches a staged pattern.
pub struct BrowserDriverStub {
    channel: Arc<DebugChannelStub>,
    navigations: Mutex<Vec<String>>,
    scripts: Mutex<Vec<String>>,
    refreshes: Mutex<usize>,
    current_url: Mutex<String>,
    page_source: Mutex<String>,
    on_navigate: Mutex<Vec<(String, Vec<String>)>>,
    on_script: Mutex<Vec<(String, Vec<String>)>>,
}

impl BrowserDriverStub {
    pub fn new(channel: Arc<DebugChannelStub>) -> Self {
        BrowserDriverStub {
            channel,
            navigations: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            refreshes: Mutex::new(0),
            current_url: Mutex::new(String::new()),
            page_source: Mutex::new(String::new()),
            on_navigate: Mutex::new(Vec::new()),
            on_script: Mutex::new(Vec::new()),
        }
    }

    /// Stages log entries injected once, when a navigation URL contains
    /// `pattern`.
    pub fn stage_on_navigate(&self, pattern: &str, entries: Vec<String>) {
        self.on_navigate.lock().unwrap().push((pattern.to_string(), entries));
    }

    /// Stages log entries injected once, when an executed script contains
    /// `pattern`.
    pub fn stage_on_script(&self, pattern: &str, entries: Vec<String>) {
        self.on_script.lock().unwrap().push((pattern.to_string(), entries));
    }

    pub fn set_page_source(&self, source: &str) {
        *self.page_source.lock().unwrap() = source.to_string();
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }

    fn inject_staged(staged: &Mutex<Vec<(String, Vec<String>)>>, needle: &str, channel: &DebugChannelStub) {
        let mut staged = staged.lock().unwrap();
        if let Some(position) = staged.iter().position(|(pattern, _)| needle.contains(pattern.as_str())) {
            let (_, entries) = staged.remove(position);
            channel.push_log_batch(entries);
        }
    }
}

impl BrowserDriver for BrowserDriverStub {
    fn navigate_to(&self, url: &str) -> Result<(), Error> {
        self.navigations.lock().unwrap().push(url.to_string());
        *self.current_url.lock().unwrap() = url.to_string();
        Self::inject_staged(&self.on_navigate, url, &self.channel);
        Ok(())
    }

    fn refresh(&self) -> Result<(), Error> {
        *self.refreshes.lock().unwrap() += 1;
        let url = self.current_url.lock().unwrap().clone();
        Self::inject_staged(&self.on_navigate, &url, &self.channel);
        Ok(())
    }

    fn execute_script(&self, script: &str) -> Result<Value, Error> {
        self.scripts.lock().unwrap().push(script.to_string());
        Self::inject_staged(&self.on_script, script, &self.channel);
        Ok(Value::Null)
    }

    fn page_source(&self) -> Result<String, Error> {
        Ok(self.page_source.lock().unwrap().clone())
    }

    fn current_url(&self) -> Result<String, Error> {
        Ok(self.current_url.lock().unwrap().clone())
    }
}
