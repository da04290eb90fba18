//! Layered TOML settings.
//!
//! Command-line flags beat `RWC5020X_*` environment variables, which beat
//! `./rwc5020x.toml`, which beats the per-user `config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use log::{debug, warn};
use rwc5020x::{PollPolicy, Timing};
use serde::{Deserialize, Serialize};

/// Local configuration file name.
pub const LOCAL_CONFIG: &str = "rwc5020x.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Tester address for UDP (e.g., "192.168.0.33:5001").
    pub udp: Option<String>,
    /// Local UDP port to bind.
    pub local_port: Option<u16>,
    /// Read timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Test sequence pacing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Pause after each link message poll.
    pub poll_interval_ms: Option<u64>,
    /// Pause before and after sending a MAC command.
    pub settle_ms: Option<u64>,
    /// Pause before re-checking an inactive link.
    pub link_retry_ms: Option<u64>,
    /// Give up waiting for a link message after this many polls.
    pub max_polls: Option<u32>,
}

impl SequenceConfig {
    /// Sequence timing with configured values applied over the defaults.
    pub fn timing(&self) -> Timing {
        let mut timing = Timing::default();
        if let Some(ms) = self.poll_interval_ms {
            timing.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.settle_ms {
            timing.settle_before_send = Duration::from_millis(ms);
            timing.after_send = Duration::from_millis(ms);
            timing.between_rounds = Duration::from_millis(ms);
        }
        if let Some(ms) = self.link_retry_ms {
            timing.link_retry = Duration::from_millis(ms);
        }
        timing
    }

    /// Link message poll policy.
    pub fn poll_policy(&self) -> PollPolicy {
        self.max_polls
            .map_or(PollPolicy::Unbounded, PollPolicy::Bounded)
    }

    /// Processing time awaited after a MAC command is sent.
    pub fn mac_settle(&self) -> Option<Duration> {
        self.settle_ms
            .map(Duration::from_millis)
    }
}

/// Settings file contents; every field is optional so files can be layered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// `[connection]` table.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// `[sequence]` table.
    #[serde(default)]
    pub sequence: SequenceConfig,
}

impl ConnectionConfig {
    fn overlay(&mut self, other: Self) {
        self.serial = other.serial.or(self.serial.take());
        self.udp = other.udp.or(self.udp.take());
        self.local_port = other.local_port.or(self.local_port);
        self.timeout_ms = other.timeout_ms.or(self.timeout_ms);
    }
}

impl SequenceConfig {
    fn overlay(&mut self, other: Self) {
        self.poll_interval_ms = other.poll_interval_ms.or(self.poll_interval_ms);
        self.settle_ms = other.settle_ms.or(self.settle_ms);
        self.link_retry_ms = other.link_retry_ms.or(self.link_retry_ms);
        self.max_polls = other.max_polls.or(self.max_polls);
    }
}

impl Config {
    /// Layer the user-wide file under `./rwc5020x.toml`.
    pub fn load() -> Self {
        let sources = Self::global_config_path()
            .into_iter()
            .chain(std::iter::once(PathBuf::from(LOCAL_CONFIG)));

        let mut config = Self::default();
        for path in sources {
            if !path.exists() {
                continue;
            }
            match Self::read(&path) {
                Ok(layer) => {
                    debug!("Applied config layer {}", path.display());
                    config.merge(layer);
                },
                Err(reason) => warn!("Ignoring {}: {reason}", path.display()),
            }
        }
        config
    }

    /// Load only `path`, as given by `--config`.
    pub fn load_from_path(path: &Path) -> Self {
        Self::read(path).unwrap_or_else(|reason| {
            warn!("Ignoring {}: {reason}; using defaults", path.display());
            Self::default()
        })
    }

    fn read(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
        toml::from_str(&text).map_err(|e| e.to_string())
    }

    /// Per-user configuration directory, e.g. `~/.config/rwc5020x`.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "rwc5020x").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// `config.toml` inside [`Config::global_config_dir`].
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Values set in `other` win; unset ones keep the current value.
    fn merge(&mut self, other: Self) {
        self.connection
            .overlay(other.connection);
        self.sequence
            .overlay(other.sequence);
    }
}
