//! Boot time introspection and reboot detection.
//!
//! The host's boot time is estimated as `now - uptime`. Two estimates taken at
//! different moments differ slightly because the uptime is truncated to whole
//! seconds and the round trip takes time; the detector's tolerance absorbs
//! that drift. A larger jump means the host restarted in between.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RebootConfig;
use crate::error::{LinkError, Result};
use crate::exec::CommandExecutor;
use crate::exec::multiplexer::{StreamTag, parse_formatted};
use crate::session::Session;
use crate::transport::Transport;

/// Estimated moment the host last started, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BootTime(f64);

impl BootTime {
    /// Create from seconds since the Unix epoch.
    #[must_use]
    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Derive the boot time from an uptime reading taken now.
    #[must_use]
    pub fn from_uptime(uptime: Duration) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |since_epoch| since_epoch.as_secs_f64());
        Self(now - uptime.as_secs_f64())
    }

    /// Seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(self) -> f64 {
        self.0
    }

    /// Absolute distance to `other`, in seconds.
    #[must_use]
    pub fn drift(self, other: Self) -> f64 {
        (self.0 - other.0).abs()
    }
}

impl fmt::Display for BootTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}", self.0)
    }
}

/// Compares boot times against the session's baseline.
#[derive(Debug, Clone, Default)]
pub struct RebootDetector {
    config: RebootConfig,
}

impl RebootDetector {
    /// Create a detector.
    #[must_use]
    pub const fn new(config: RebootConfig) -> Self {
        Self { config }
    }

    /// Get configuration.
    #[must_use]
    pub const fn config(&self) -> &RebootConfig {
        &self.config
    }

    /// Compare `current` with the recorded baseline.
    ///
    /// Without a baseline, `current` becomes the baseline. If the two differ
    /// by more than the tolerance, `current` becomes the new baseline and
    /// [`LinkError::UnexpectedRebootDetected`] is returned. Within tolerance
    /// the baseline is kept.
    pub fn check_for_reboot<T: Transport>(
        &self,
        session: &mut Session<T>,
        current: BootTime,
    ) -> Result<()> {
        let Some(previous) = session.last_boot_time() else {
            tracing::debug!(host = %session.host(), boot_time = %current, "Recorded boot time baseline");
            session.set_last_boot_time(Some(current));
            return Ok(());
        };

        if previous.drift(current) > self.config.tolerance.as_secs_f64() {
            session.set_last_boot_time(Some(current));
            tracing::warn!(
                host = %session.host(),
                previous = %previous,
                current = %current,
                "Boot time changed; host rebooted"
            );
            return Err(LinkError::UnexpectedRebootDetected { previous, current });
        }

        Ok(())
    }

    /// Read the host's current boot time.
    ///
    /// Runs the configured uptime command and parses its first stdout line.
    /// A timeout, non-zero exit, missing output or unparsable output all
    /// yield [`LinkError::BootTimeUnavailable`]; a missing session stays
    /// [`LinkError::ConnectionFailed`].
    pub async fn boot_time<T: Transport>(
        &self,
        executor: &CommandExecutor,
        session: &mut Session<T>,
    ) -> Result<BootTime> {
        let mut first_line: Option<String> = None;
        let outcome = executor
            .execute(session, &self.config.command, Some(self.config.timeout), |line| {
                if first_line.is_some() {
                    return;
                }
                if let Some((StreamTag::Stdout, text)) = parse_formatted(line) {
                    first_line = Some(text.to_string());
                }
            })
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(e @ LinkError::CommandTimeout { .. }) => {
                return Err(LinkError::boot_time_unavailable(e));
            }
            Err(e) => return Err(e),
        };

        if !result.success() {
            return Err(LinkError::boot_time_unavailable(format!(
                "'{}' exited with status {}",
                self.config.command,
                result.exit_code()
            )));
        }

        let line = first_line
            .ok_or_else(|| LinkError::boot_time_unavailable("no output received for uptime"))?;
        let uptime = parse_uptime(&line)?;
        Ok(BootTime::from_uptime(uptime))
    }
}

/// Parse an uptime in (possibly fractional) seconds.
fn parse_uptime(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    let secs: f64 = trimmed
        .parse()
        .map_err(|e| LinkError::boot_time_unavailable(format!("invalid uptime {trimmed:?}: {e}")))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| LinkError::boot_time_unavailable(format!("invalid uptime {trimmed:?}: {e}")))
}
