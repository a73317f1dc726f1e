//! Agent settings document stored inside each VM.
//!
//! The BOSH agent reads its settings from a JSON file at a fixed path in
//! the VM. The CPI keeps no local VM state: persistent disk bookkeeping
//! lives in this document and is read back through the backend.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use warden_cpi_id::{DiskCid, VmCid};

use crate::backend::{Backend, BackendError};
use crate::error::{Classify, ErrorKind};

/// Directory inside the VM holding the settings file.
pub const AGENT_ENV_DIR: &str = "/var/vcap/bosh";

/// Settings file name.
pub const AGENT_ENV_FILE: &str = "warden-cpi-agent-env.json";

/// Errors from reading or writing the agent settings.
#[derive(Debug, Error)]
pub enum AgentEnvError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("encoding agent env: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decoding agent env: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("agent env tar stream: {0}")]
    Archive(#[source] io::Error),

    #[error("agent env tar stream is empty")]
    Missing,
}

impl Classify for AgentEnvError {
    fn kind(&self) -> ErrorKind {
        match self {
            AgentEnvError::Backend(e) => e.kind(),
            _ => ErrorKind::Generic,
        }
    }
}

/// Agent settings shared by every VM, taken from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOptions {
    /// Message bus URL.
    #[serde(default)]
    pub mbus: String,

    #[serde(default)]
    pub ntp: Vec<String>,

    /// Blobstore settings, passed through verbatim.
    #[serde(default)]
    pub blobstore: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    pub name: String,
    pub id: VmCid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisksInfo {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub ephemeral: String,
    /// Attached persistent disks, keyed by disk id, valued by the path the
    /// disk is visible at inside the VM.
    #[serde(default)]
    pub persistent: BTreeMap<DiskCid, String>,
}

/// The settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEnv {
    pub agent_id: String,
    pub vm: VmInfo,
    pub mbus: String,
    pub ntp: Vec<String>,
    pub blobstore: Value,
    pub networks: Map<String, Value>,
    pub disks: DisksInfo,
    pub env: Value,
}

impl AgentEnv {
    pub fn new(
        agent_id: impl Into<String>,
        vm_id: &VmCid,
        options: &AgentOptions,
        networks: Map<String, Value>,
        env: Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            vm: VmInfo {
                name: vm_id.to_string(),
                id: vm_id.clone(),
            },
            mbus: options.mbus.clone(),
            ntp: options.ntp.clone(),
            blobstore: options.blobstore.clone(),
            networks,
            disks: DisksInfo::default(),
            env,
        }
    }

    pub fn attach_persistent_disk(&mut self, disk_id: DiskCid, guest_path: impl Into<String>) {
        self.disks.persistent.insert(disk_id, guest_path.into());
    }

    /// Returns whether the disk was recorded.
    pub fn detach_persistent_disk(&mut self, disk_id: &DiskCid) -> bool {
        self.disks.persistent.remove(disk_id).is_some()
    }

    /// Recorded persistent disk ids, sorted.
    pub fn persistent_disk_ids(&self) -> Vec<DiskCid> {
        self.disks.persistent.keys().cloned().collect()
    }
}

/// Reads and writes [`AgentEnv`] through the backend's file streaming.
#[derive(Clone)]
pub struct AgentEnvService {
    backend: Arc<dyn Backend>,
}

impl AgentEnvService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn fetch(&self, vm_id: &VmCid) -> Result<AgentEnv, AgentEnvError> {
        let src_path = format!("{AGENT_ENV_DIR}/{AGENT_ENV_FILE}");
        let tar = self.backend.stream_out(vm_id, &src_path).await?;
        let bytes = read_single_entry(&tar)?;
        serde_json::from_slice(&bytes).map_err(AgentEnvError::Decode)
    }

    pub async fn update(&self, vm_id: &VmCid, agent_env: &AgentEnv) -> Result<(), AgentEnvError> {
        let bytes = serde_json::to_vec(agent_env).map_err(AgentEnvError::Encode)?;
        let tar = single_entry_tar(AGENT_ENV_FILE, &bytes)?;

        debug!(vm_id = %vm_id, bytes = bytes.len(), "Writing agent env");
        self.backend.stream_in(vm_id, AGENT_ENV_DIR, tar).await?;
        Ok(())
    }
}

fn single_entry_tar(name: &str, data: &[u8]) -> Result<Vec<u8>, AgentEnvError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, name, data)
        .map_err(AgentEnvError::Archive)?;
    builder.into_inner().map_err(AgentEnvError::Archive)
}

fn read_single_entry(tar: &[u8]) -> Result<Vec<u8>, AgentEnvError> {
    let mut archive = tar::Archive::new(tar);
    let mut entries = archive.entries().map_err(AgentEnvError::Archive)?;
    let mut entry = entries
        .next()
        .ok_or(AgentEnvError::Missing)?
        .map_err(AgentEnvError::Archive)?;

    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(AgentEnvError::Archive)?;
    Ok(data)
}
