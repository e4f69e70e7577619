//! File-based configuration loading.
//!
//! Files are TOML with one table per [`LinkConfig`] section; every key is
//! optional. Durations are seconds and may be fractional:
//!
//! ```toml
//! [session]
//! host = "vm-01.lab"
//! username = "ci"
//! key_path = "/home/ci/.ssh/id_ed25519"
//! connect_timeout = 5
//!
//! [exec]
//! command_timeout = 120
//! poll_interval = 0.5
//!
//! [reconnect]
//! retries = 5
//! delay = 3
//! ```

use std::path::{Path, PathBuf};

use super::LinkConfig;
use super::env::EnvConfig;
use crate::error::{LinkError, Result};

impl LinkConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LinkError::config(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LinkError::io_context(format!("reading {}", path.display()), e))?;
        Self::from_toml_str(&content)
            .map_err(|e| LinkError::config(format!("{}: {e}", path.display())))
    }
}

/// Configuration file loader.
///
/// Resolution order: defaults, then the first matching file in the search
/// paths, then environment variables. The result is validated.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Search paths.
    search_paths: Vec<PathBuf>,
    /// Environment overlay.
    env: EnvConfig,
}

impl ConfigLoader {
    /// Create a new loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a search path.
    #[must_use]
    pub fn add_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Use a specific environment reader.
    #[must_use]
    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = env;
        self
    }

    /// Find a config file named `name` or `name.toml`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.search_paths.iter().find_map(|dir| {
            [dir.join(name), dir.join(format!("{name}.toml"))]
                .into_iter()
                .find(|path| path.is_file())
        })
    }

    /// Load by name. A missing file is not an error; defaults are used.
    pub fn load(&self, name: &str) -> Result<LinkConfig> {
        let mut config = match self.find(name) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading configuration file");
                LinkConfig::from_file(&path)?
            }
            None => LinkConfig::default(),
        };
        self.env.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{HostKeyPolicy, env::vars};

    #[test]
    fn parses_sections_and_fractional_seconds() {
        let config = LinkConfig::from_toml_str(
            r#"
            [session]
            host = "vm-01.lab"
            username = "ci"
            port = 2222
            host_key_policy = "known-hosts"

            [exec]
            poll_interval = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.session.host, "vm-01.lab");
        assert_eq!(config.session.port, 2222);
        assert_eq!(config.session.host_key_policy, HostKeyPolicy::KnownHosts);
        assert_eq!(config.exec.poll_interval, Duration::from_millis(250));
        assert_eq!(config.exec.command_timeout, Duration::from_secs(60));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = LinkConfig::from_toml_str("[session]\nhostname = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(LinkConfig::from_toml_str("[reconnect]\ndelay = -2\n").is_err());
    }

    #[test]
    fn loader_applies_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vm-link.toml"),
            "[session]\nhost = \"from-file\"\nusername = \"ci\"\n",
        )
        .unwrap();

        let env = EnvConfig::new("VMLINK_LOADER_TEST").with_var(vars::PORT, "2022");
        let config = ConfigLoader::new()
            .add_path(dir.path())
            .with_env(env)
            .load("vm-link")
            .unwrap();

        assert_eq!(config.session.host, "from-file");
        assert_eq!(config.session.port, 2022);
    }

    #[test]
    fn loader_without_file_needs_host_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new()
            .add_path(dir.path())
            .with_env(EnvConfig::new("VMLINK_LOADER_EMPTY"));
        assert!(loader.load("vm-link").is_err());

        let loader = ConfigLoader::new().add_path(dir.path()).with_env(
            EnvConfig::new("VMLINK_LOADER_EMPTY")
                .with_var(vars::HOST, "vm-09")
                .with_var(vars::USER, "ci"),
        );
        assert_eq!(loader.load("vm-link").unwrap().session.host, "vm-09");
    }
}
