//! Framework configuration
//!
//! Tunables for channels and the module lifecycle. Every struct has a
//! usable `Default`, so a TOML file only needs the fields it overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::directory::ChannelKind;
use crate::types::{Module, ModuleId};
use crate::{ModlinkError, Result};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Configuration for one channel worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Period of the receive loop; zero runs it back to back
    pub task_period_ms: u64,
    /// Receive timeout; `None` blocks until data arrives or the channel stops
    pub recv_timeout_ms: Option<u64>,
    /// Receive buffer size, as a multiple of the request wire size
    pub buffer_multiplier: usize,
    /// Remember resolved peer addresses instead of resolving on every send
    pub cache_peer_addresses: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            task_period_ms: 0,
            recv_timeout_ms: None,
            buffer_multiplier: 10,
            cache_peer_addresses: false,
        }
    }
}

impl ChannelConfig {
    /// Defaults for the given channel
    pub fn for_kind(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Event => Self::default(),
            ChannelKind::State => Self::default().with_task_period(Duration::from_millis(10)),
        }
    }

    pub fn with_task_period(mut self, period: Duration) -> Self {
        self.task_period_ms = period.as_millis() as u64;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_buffer_multiplier(mut self, multiplier: usize) -> Self {
        self.buffer_multiplier = multiplier;
        self
    }

    pub fn with_cache_peer_addresses(mut self, enabled: bool) -> Self {
        self.cache_peer_addresses = enabled;
        self
    }

    pub fn task_period(&self) -> Duration {
        Duration::from_millis(self.task_period_ms)
    }

    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_multiplier == 0 {
            return Err(ModlinkError::bad_configuration(
                "buffer_multiplier must be at least 1",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Lifecycle Configuration
// ----------------------------------------------------------------------------

/// Configuration for a module's lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Module that issues state requests and receives announcements
    pub controller: ModuleId,
    /// Announce the initial Standby state to the controller on startup
    pub announce_on_start: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            controller: Module::SystemController.id(),
            announce_on_start: true,
        }
    }
}

impl LifecycleConfig {
    pub fn with_controller(mut self, controller: ModuleId) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_announce_on_start(mut self, enabled: bool) -> Self {
        self.announce_on_start = enabled;
        self
    }
}

// ----------------------------------------------------------------------------
// Top-Level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of one module process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModlinkConfig {
    pub event_channel: ChannelConfig,
    pub state_channel: ChannelConfig,
    pub lifecycle: LifecycleConfig,
    /// Directory file; the built-in table is used when unset
    pub directory_path: Option<PathBuf>,
}

impl Default for ModlinkConfig {
    fn default() -> Self {
        Self {
            event_channel: ChannelConfig::for_kind(ChannelKind::Event),
            state_channel: ChannelConfig::for_kind(ChannelKind::State),
            lifecycle: LifecycleConfig::default(),
            directory_path: None,
        }
    }
}

impl ModlinkConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn channel(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Event => &self.event_channel,
            ChannelKind::State => &self.state_channel,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.event_channel.validate()?;
        self.state_channel.validate()
    }
}
