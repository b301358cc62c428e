//! Run configuration and tuning constants.

use std::time::Duration;

/// Tuning knobs for a scraping run. Defaults mirror the pacing the target
/// service tolerates; turbo mode trades politeness for speed.
#[derive(Clone, Debug)]
pub struct ScrapeConfig {
    /// Minimum transcript length for a chat to be worth keeping.
    pub message_limit: usize,
    /// Pacing between triggering actions.
    pub delay_between_requests: Duration,
    /// Pacing between individual chat fetches.
    pub delay_between_chats: Duration,
    /// Settle time after each list scroll.
    pub scroll_wait: Duration,
    /// Consecutive no-growth scrolls before the list is considered complete.
    pub scroll_no_growth_threshold: u32,
    /// Hard cap on list scrolls.
    pub max_scroll_iterations: u32,
    /// Deadline for the expansion response after an accordion click.
    pub expansion_timeout: Duration,
    /// Deadline for the chat payload after navigating to a chat page.
    pub chat_timeout: Duration,
    /// Keep transcripts below `message_limit` instead of dropping them.
    pub keep_partial_extracts: bool,
    /// Shortens waits and backoff constants across the run.
    pub turbo_mode: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        ScrapeConfig {
            message_limit: 4,
            delay_between_requests: Duration::from_secs(2),
            delay_between_chats: Duration::from_secs(3),
            scroll_wait: Duration::from_millis(400),
            scroll_no_growth_threshold: 8,
            max_scroll_iterations: 500,
            expansion_timeout: Duration::from_secs(5),
            chat_timeout: Duration::from_secs(15),
            keep_partial_extracts: false,
            turbo_mode: false,
        }
    }
}

impl ScrapeConfig {
    /// Interval between capture polls inside a bounded wait.
    pub fn poll_interval(&self) -> Duration {
        if self.turbo_mode {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(500)
        }
    }

    /// Settle time after triggering a navigation.
    pub fn navigation_wait(&self) -> Duration {
        if self.turbo_mode {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(4)
        }
    }

    pub fn scroll_pause(&self) -> Duration {
        if self.turbo_mode {
            Duration::from_millis(100)
        } else {
            self.scroll_wait
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turbo_mode_shortens_waits() {
        let normal = ScrapeConfig::default();
        let turbo = ScrapeConfig {
            turbo_mode: true,
            ..ScrapeConfig::default()
        };

        assert!(turbo.poll_interval() < normal.poll_interval());
        assert!(turbo.navigation_wait() < normal.navigation_wait());
        assert!(turbo.scroll_pause() < normal.scroll_pause());
    }
}
