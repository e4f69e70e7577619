//! Environment-based configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::LinkConfig;
use crate::error::{LinkError, Result};

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "VMLINK";

/// Variable names understood by [`EnvConfig::apply`], without prefix.
pub mod vars {
    /// Remote host.
    pub const HOST: &str = "HOST";
    /// Remote user.
    pub const USER: &str = "USER";
    /// Private key path.
    pub const KEY_PATH: &str = "KEY_PATH";
    /// SSH port.
    pub const PORT: &str = "PORT";
    /// Connect timeout in seconds.
    pub const CONNECT_TIMEOUT: &str = "CONNECT_TIMEOUT";
    /// Default command timeout in seconds.
    pub const COMMAND_TIMEOUT: &str = "COMMAND_TIMEOUT";
    /// Reconnect attempts.
    pub const RECONNECT_RETRIES: &str = "RECONNECT_RETRIES";
    /// Delay between reconnect attempts in seconds.
    pub const RECONNECT_DELAY: &str = "RECONNECT_DELAY";
}

/// Environment variable reader.
///
/// Values set with [`EnvConfig::with_var`] shadow the process environment,
/// which keeps tests independent of the real environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Explicit values consulted before the process environment.
    overrides: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: HashMap::new(),
        }
    }

    /// Shadow a variable (name without prefix).
    #[must_use]
    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        let var_name = self.var_name(name);
        self.overrides.insert(var_name, value.into());
        self
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        self.overrides
            .get(&var_name)
            .cloned()
            .or_else(|| std::env::var(&var_name).ok())
    }

    /// Get a parsed value; a present but malformed value is an error.
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.trim().parse().map_err(|e| {
                    LinkError::config(format!("{}={raw:?}: {e}", self.var_name(name)))
                })
            })
            .transpose()
    }

    /// Get a duration given in (possibly fractional) seconds.
    pub fn duration_secs(&self, name: &str) -> Result<Option<Duration>> {
        self.parse::<f64>(name)?
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|e| {
                    LinkError::config(format!("{}={secs}: {e}", self.var_name(name)))
                })
            })
            .transpose()
    }

    /// Overlay every variable that is set onto `config`.
    pub fn apply(&self, config: &mut LinkConfig) -> Result<()> {
        if let Some(host) = self.get(vars::HOST) {
            config.session.host = host;
        }
        if let Some(user) = self.get(vars::USER) {
            config.session.username = user;
        }
        if let Some(path) = self.get(vars::KEY_PATH) {
            config.session.key_path = PathBuf::from(path);
        }
        if let Some(port) = self.parse(vars::PORT)? {
            config.session.port = port;
        }
        if let Some(timeout) = self.duration_secs(vars::CONNECT_TIMEOUT)? {
            config.session.connect_timeout = timeout;
        }
        if let Some(timeout) = self.duration_secs(vars::COMMAND_TIMEOUT)? {
            config.exec.command_timeout = timeout;
        }
        if let Some(retries) = self.parse(vars::RECONNECT_RETRIES)? {
            config.reconnect.retries = retries;
        }
        if let Some(delay) = self.duration_secs(vars::RECONNECT_DELAY)? {
            config.reconnect.delay = delay;
        }
        Ok(())
    }
}

/// Get the current user.
#[must_use]
pub fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty())
}

/// Get the home directory.
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}
