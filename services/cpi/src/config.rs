//! CPI configuration file.
//!
//! ```json
//! {
//!   "warden": {"connect_network": "tcp", "connect_address": "127.0.0.1:7777"},
//!   "actions": {
//!     "stemcells_dir": "/var/vcap/data/warden_cpi/stemcells",
//!     "disks_dir": "/var/vcap/store/warden_cpi/disks",
//!     "host_persistent_bind_mounts_dir": "/var/vcap/data/warden_cpi/persistent_bind_mounts_dir",
//!     "guest_persistent_bind_mounts_dir": "/warden-cpi-dev",
//!     "agent": {"mbus": "nats://...", "ntp": [], "blobstore": {...}}
//!   },
//!   "log_level": "debug"
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::actions::AgentOptions;
use crate::backend::GardenConfig;

/// Default guest directory for persistent disk mounts.
const DEFAULT_GUEST_BIND_MOUNTS_DIR: &str = "/warden-cpi-dev";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub warden: WardenConfig,
    pub actions: ActionsConfig,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WardenConfig {
    /// `tcp` or `unix`.
    pub connect_network: String,
    pub connect_address: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionsConfig {
    pub stemcells_dir: PathBuf,
    pub disks_dir: PathBuf,
    pub host_persistent_bind_mounts_dir: PathBuf,

    #[serde(default = "default_guest_bind_mounts_dir")]
    pub guest_persistent_bind_mounts_dir: String,

    #[serde(default)]
    pub agent: AgentOptions,
}

fn default_guest_bind_mounts_dir() -> String {
    DEFAULT_GUEST_BIND_MOUNTS_DIR.to_string()
}

impl Config {
    /// Read, parse and validate the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.warden.connect_network.as_str() {
            "tcp" | "unix" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "warden.connect_network must be 'tcp' or 'unix', got '{other}'"
                )))
            }
        }
        if self.warden.connect_address.is_empty() {
            return Err(ConfigError::Invalid(
                "warden.connect_address must not be empty".to_string(),
            ));
        }

        let dirs = [
            ("actions.stemcells_dir", &self.actions.stemcells_dir),
            ("actions.disks_dir", &self.actions.disks_dir),
            (
                "actions.host_persistent_bind_mounts_dir",
                &self.actions.host_persistent_bind_mounts_dir,
            ),
        ];
        for (name, dir) in dirs {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be an absolute path, got '{}'",
                    dir.display()
                )));
            }
        }
        if !self.actions.guest_persistent_bind_mounts_dir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "actions.guest_persistent_bind_mounts_dir must be an absolute path, got '{}'",
                self.actions.guest_persistent_bind_mounts_dir
            )));
        }

        Ok(())
    }

    pub fn garden(&self) -> GardenConfig {
        GardenConfig {
            connect_network: self.warden.connect_network.clone(),
            connect_address: self.warden.connect_address.clone(),
            host_persistent_bind_mounts_dir: self.actions.host_persistent_bind_mounts_dir.clone(),
            guest_persistent_bind_mounts_dir: self.actions.guest_persistent_bind_mounts_dir.clone(),
        }
    }
}
