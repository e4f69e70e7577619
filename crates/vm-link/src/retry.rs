//! Reconnect retry strategies.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// How many connect attempts to make and how long to wait between them.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// A single attempt.
    None,
    /// Fixed delay between attempts.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
        /// Maximum attempts.
        max_attempts: u32,
    },
    /// Exponential backoff.
    Exponential {
        /// Delay after the first failed attempt.
        initial_delay: Duration,
        /// Maximum delay.
        max_delay: Duration,
        /// Multiplier for each attempt.
        multiplier: f64,
        /// Maximum attempts.
        max_attempts: u32,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for RetryStrategy {
    fn from(config: &ReconnectConfig) -> Self {
        Self::fixed(config.delay, config.retries)
    }
}

impl RetryStrategy {
    /// Create no retry strategy.
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// Create fixed delay strategy.
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self::Fixed {
            delay,
            max_attempts,
        }
    }

    /// Create exponential backoff strategy.
    #[must_use]
    pub const fn exponential(initial_delay: Duration, max_attempts: u32) -> Self {
        Self::Exponential {
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts,
        }
    }

    /// Delay after failed attempt `attempt` (0-indexed) before the next one;
    /// `None` when that was the last attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt.saturating_add(1) >= self.max_attempts() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                let delay = Duration::try_from_secs_f64(secs).map_or(*max_delay, |d| d.min(*max_delay));
                Some(delay)
            }
        }
    }

    /// Get max attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                *max_attempts
            }
        }
    }
}
