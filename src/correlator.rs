//! Matches captured responses to the logical operation that triggered them.
//!
//! A caller performs a UI action known to produce one (or a bounded few)
//! network calls, then waits here with a deadline for a response whose URL
//! contains the expected pattern. Each wait resolves to matched or timed out;
//! retry-with-reload is composed by the caller, never inside a wait.

use std::cmp::min;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::Value;

use crate::capture::ResponseCapture;

/// How sure the correlator is that a returned payload is the one asked for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Confidence {
    /// Identified structurally by the presence of expected keys.
    Structural,
    /// The only candidate captured; structure unknown, best-effort.
    SoleCandidate,
}

/// A payload collected while waiting, before discrimination.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub url: String,
    pub data: Value,
}

/// Poll-with-deadline correlation over a [ResponseCapture].
pub struct ResponseCorrelator {
    poll_interval: Duration,
}

impl ResponseCorrelator {
    pub fn new(poll_interval: Duration) -> Self {
        ResponseCorrelator { poll_interval }
    }

    /// Waits until a captured response's URL contains `pattern` and its body
    /// parsed as JSON, or `timeout` elapses. At most one payload is returned;
    /// the capture source is always checked at least once, so a response that
    /// already arrived resolves immediately.
    pub fn wait_for_response(&self, capture: &mut ResponseCapture, pattern: &str, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;

        loop {
            for payload in capture.new_payloads() {
                if payload.url.contains(pattern) {
                    debug!("response matched: {}", payload.url);
                    return Some(payload.data);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("wait for '{pattern}' timed out after {timeout:?}");
                return None;
            }
            thread::sleep(min(self.poll_interval, deadline - now));
        }
    }

    /// Collects up to `count` distinct payloads matching `pattern` before the
    /// deadline. Used when one triggering action is known to produce several
    /// responses (a framework bootstrap blob plus the real data response).
    /// Stops early once a structurally recognizable chat payload is among the
    /// candidates; otherwise returns whatever arrived by the deadline.
    pub fn wait_for_any_of(&self, capture: &mut ResponseCapture, pattern: &str, count: usize, timeout: Duration) -> Vec<Candidate> {
        let deadline = Instant::now() + timeout;
        let mut candidates: Vec<Candidate> = Vec::new();

        loop {
            for payload in capture.new_payloads() {
                if payload.url.contains(pattern) {
                    debug!("candidate #{}: {}", candidates.len() + 1, payload.url);
                    candidates.push(Candidate {
                        url: payload.url,
                        data: payload.data,
                    });
                }
            }

            if candidates.len() >= count || candidates.iter().any(|c| is_chat_payload(&c.data)) {
                return candidates;
            }

            let now = Instant::now();
            if now >= deadline {
                if !candidates.is_empty() {
                    warn!("deadline reached with {} of {count} candidates for '{pattern}'", candidates.len());
                }
                return candidates;
            }
            thread::sleep(min(self.poll_interval, deadline - now));
        }
    }
}

/// Picks the real data payload out of the candidates for one logical
/// operation. Structural sniff first; if that fails and exactly one candidate
/// was captured, it is returned as a best-effort fallback with its reduced
/// confidence made explicit.
pub fn discriminate(candidates: Vec<Candidate>) -> Option<(Value, Confidence)> {
    let total = candidates.len();

    for candidate in &candidates {
        if is_chat_payload(&candidate.data) {
            info!("identified chat payload structurally: {}", candidate.url);
            return Some((candidate.data.clone(), Confidence::Structural));
        }
    }

    if total == 1 {
        let candidate = candidates.into_iter().next()?;
        warn!("returning sole candidate with structure unknown: {}", candidate.url);
        return Some((candidate.data, Confidence::SoleCandidate));
    }

    warn!("could not identify the data payload among {total} candidates");
    None
}

/// Structural marker for "the real chat payload" as opposed to a framework
/// bootstrap response.
pub(crate) fn is_chat_payload(data: &Value) -> bool {
    data.get("chatMessages").is_some() || data.get("character").is_some()
}
