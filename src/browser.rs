//! Collaborator traits at the browser boundary.
//!
//! The capture pipeline never talks to a real browser directly; it drives
//! these two seams. Production implementations wrap a WebDriver session with
//! debug-protocol access; tests use the scripted stubs in [crate::stubs].

use serde_json::Value;

use crate::errors::Error;

/// Debug-protocol method that turns on network event reporting.
pub const NETWORK_ENABLE: &str = "Network.enable";
/// Debug-protocol method that turns network event reporting back off.
pub const NETWORK_DISABLE: &str = "Network.disable";
/// Debug-protocol method that fetches a buffered response body by request id.
pub const GET_RESPONSE_BODY: &str = "Network.getResponseBody";
/// Debug-protocol method that keeps the page active without window focus.
pub const SET_FOCUS_EMULATION: &str = "Emulation.setFocusEmulationEnabled";

/// Out-of-band instrumentation channel into the browser.
///
/// `drain_log` hands back everything reported since the previous call; the
/// underlying log is cumulative, so entries are consumed, never re-read.
pub trait DebugChannel: Send + Sync {
    /// Issues a debug-protocol command and returns its JSON result.
    fn command(&self, method: &str, params: Value) -> Result<Value, Error>;

    /// Drains the performance/debug event log accumulated since the last call.
    /// Each entry is the raw JSON text of one log record.
    fn drain_log(&self) -> Vec<String>;
}

/// Navigation and script execution surface of the browser session.
pub trait BrowserDriver: Send + Sync {
    /// Navigates the session to `url`.
    fn navigate_to(&self, url: &str) -> Result<(), Error>;

    /// Reloads the current page.
    fn refresh(&self) -> Result<(), Error>;

    /// Executes a script in page context and returns its result.
    fn execute_script(&self, script: &str) -> Result<Value, Error>;

    /// Returns the serialized source of the current page.
    fn page_source(&self) -> Result<String, Error>;

    /// Returns the URL the session is currently on.
    fn current_url(&self) -> Result<String, Error>;
}
