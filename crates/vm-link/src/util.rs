//! Timing utilities.

use std::time::Duration;

use tokio::time::Instant;

/// A wall-clock window that started at a fixed instant.
///
/// Uses tokio's clock so that paused-time tests drive it deterministically.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Create a new deadline from now.
    #[must_use]
    pub fn from_now(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// The configured length of the window.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    /// Time since the window opened.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Check if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Get the remaining time until the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }
}
