//! Configuration loading and persistence.
//!
//! Settings live in `config.json` inside the config directory and may be
//! overridden per invocation through `MESHLINK_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::Path, path::PathBuf};

use crate::broker::{Broker, SessionOptions};
use crate::connector::TcpConnector;
use crate::constants::{
    CONNECT_TIMEOUT, DEFAULT_COOLDOWN, DEFAULT_HOST, DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_RETRIES,
    DEFAULT_PORT, DEFAULT_RETRY_DELAY, IO_TIMEOUT, MAX_BACKOFF,
};
use crate::endpoint::Endpoint;

/// Broker and transport settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Daemon host.
    pub host: String,
    /// Daemon API port.
    pub port: u16,
    /// Quiet period after a close before reconnecting, in milliseconds.
    pub cooldown_ms: u64,
    /// Connect attempts per session.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub retry_delay_ms: u64,
    /// Retry delay ceiling in milliseconds.
    pub max_backoff_ms: u64,
    /// Seconds to wait for a concurrent session to finish.
    pub lock_timeout_secs: u64,
    /// Per-address connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Socket read/write timeout in milliseconds.
    pub io_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            max_backoff_ms: MAX_BACKOFF.as_millis() as u64,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT.as_secs(),
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            io_timeout_ms: IO_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `MESHLINK_CONFIG_DIR` wins; otherwise the platform config dir
    /// (`~/.config/meshlink` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("MESHLINK_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("meshlink")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the config file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("[config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parse config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MESHLINK_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("MESHLINK_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(e) => log::warn!("[config] ignoring MESHLINK_PORT={port:?}: {e}"),
            }
        }
        if let Ok(ms) = std::env::var("MESHLINK_COOLDOWN_MS") {
            match ms.parse::<u64>() {
                Ok(ms) => self.cooldown_ms = ms,
                Err(e) => log::warn!("[config] ignoring MESHLINK_COOLDOWN_MS={ms:?}: {e}"),
            }
        }
        if let Ok(secs) = std::env::var("MESHLINK_LOCK_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.lock_timeout_secs = secs,
                Err(e) => log::warn!("[config] ignoring MESHLINK_LOCK_TIMEOUT_SECS={secs:?}: {e}"),
            }
        }
        if let Ok(retries) = std::env::var("MESHLINK_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(retries) => self.max_retries = retries,
                Err(e) => log::warn!("[config] ignoring MESHLINK_MAX_RETRIES={retries:?}: {e}"),
            }
        }
    }

    /// Persists the current configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Persists the current configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("write config {}", path.display()))?;

        // Owner read/write only
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Daemon endpoint.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Session options derived from this config.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            lock_timeout: Duration::from_secs(self.lock_timeout_secs),
        }
    }

    /// TCP connector with this config's timeouts.
    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new()
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_io_timeout(Duration::from_millis(self.io_timeout_ms))
    }

    /// A broker for the configured endpoint.
    pub fn broker(&self) -> Broker<TcpConnector> {
        Broker::new(self.endpoint(), self.connector())
            .with_cooldown(Duration::from_millis(self.cooldown_ms))
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
            .with_session_options(self.session_options())
    }
}
