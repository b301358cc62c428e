//! A network-capture scraper for browser-rendered chat services.
//!
//! Rather than parse the DOM, the crate listens on the browser's debug
//! channel for the JSON responses the page itself fetches, correlates each
//! response to the UI action that triggered it, and assembles the payloads
//! into canonical, time-ordered transcripts.
//!
//! The pipeline has four stages:
//!
//! 1. [capture] drains the browser performance log, filters responses by
//!    URL allow-list, and caches bodies the moment they are seen (the
//!    browser discards them within seconds).
//! 2. [correlator] runs bounded poll-waits that match captured responses to
//!    the operation that caused them, with structural discrimination when
//!    one action produces several responses.
//! 3. [registry] and [transcript] accumulate the character list across
//!    pagination and rebuild each chat's turn structure from its raw
//!    message array.
//! 4. [export] writes one JSONL file per chat in the downstream import
//!    format.
//!
//! [scraper::Scraper] composes the stages into a run over a single browser
//! session, behind the [browser::BrowserDriver] and [browser::DebugChannel]
//! traits so tests can script the whole session without a browser.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatharvest::{JsonlWriter, ScrapeConfig, Scraper};
//! # use chatharvest::stubs::{BrowserDriverStub, DebugChannelStub};
//!
//! # fn main() -> Result<(), chatharvest::Error> {
//! # let channel = Arc::new(DebugChannelStub::default());
//! # let driver = Arc::new(BrowserDriverStub::new(Arc::clone(&channel)));
//! let mut scraper = Scraper::new(driver, channel, ScrapeConfig::default(), "https://chat.example");
//! let mut sink = JsonlWriter::new("exports");
//! let summary = scraper.run(&mut sink)?;
//! println!("{} chats saved", summary.chats_saved);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod capture;
pub mod config;
pub mod correlator;
pub mod domain;
mod errors;
pub mod export;
pub mod limiter;
pub mod persona;
pub mod registry;
pub mod scraper;
pub mod stubs;
pub mod transcript;

pub use config::ScrapeConfig;
pub use errors::Error;
pub use export::{JsonlWriter, TranscriptSink};
pub use scraper::{RunSummary, Scraper};
pub use transcript::Transcript;
