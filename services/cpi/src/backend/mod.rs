//! Container backend interface.
//!
//! The backend owns the sandboxed compute units that back BOSH VMs. The
//! CPI only ever talks to it through [`Backend`]:
//! - create/destroy a unit from an unpacked stemcell
//! - attach/detach persistent disk directories
//! - query existence and set properties
//! - stream files in and out (tar encoded)
//!
//! [`GardenBackend`] talks to a Garden server; [`MockBackend`] keeps
//! everything in memory for tests and local development.

mod garden;
mod mock;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use warden_cpi_id::{DiskCid, VmCid};

pub use garden::{GardenBackend, GardenConfig};
pub use mock::{MockBackend, MockUnit};

/// Errors from backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The named unit does not exist.
    #[error("unit '{0}' not found")]
    NotFound(VmCid),

    /// The backend rejected or failed the request.
    #[error("backend request failed: {0}")]
    Failed(String),
}

/// Host directory exposed inside a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    pub src_path: PathBuf,
    pub dst_path: String,
    pub read_only: bool,
}

/// Everything needed to create a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSpec {
    pub handle: VmCid,
    /// Unpacked stemcell directory used as the root filesystem.
    pub rootfs: PathBuf,
    /// Static IP, if the deployment asked for one.
    pub network: Option<String>,
    pub bind_mounts: Vec<BindMount>,
    pub properties: BTreeMap<String, String>,
}

/// A persistent disk to expose inside a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachment {
    pub volume_id: DiskCid,
    pub host_path: PathBuf,
}

/// Container backend client.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create a unit.
    async fn create_unit(&self, spec: &UnitSpec) -> Result<(), BackendError>;

    /// Destroy a unit. Fails with [`BackendError::NotFound`] if it is gone.
    async fn destroy_unit(&self, handle: &VmCid) -> Result<(), BackendError>;

    /// Whether a unit exists.
    async fn unit_exists(&self, handle: &VmCid) -> Result<bool, BackendError>;

    /// Set a single unit property.
    async fn set_property(
        &self,
        handle: &VmCid,
        key: &str,
        value: &str,
    ) -> Result<(), BackendError>;

    /// Expose a disk inside a unit. Returns the path it is visible at from
    /// inside the unit.
    async fn attach_volume(
        &self,
        handle: &VmCid,
        volume: &VolumeAttachment,
    ) -> Result<String, BackendError>;

    /// Stop exposing a disk. Detaching a disk that is not attached is not
    /// an error.
    async fn detach_volume(&self, handle: &VmCid, volume_id: &DiskCid)
        -> Result<(), BackendError>;

    /// Extract a tar stream into `dst_dir` inside the unit.
    async fn stream_in(
        &self,
        handle: &VmCid,
        dst_dir: &str,
        tar: Vec<u8>,
    ) -> Result<(), BackendError>;

    /// Read `src_path` from inside the unit as a tar stream.
    async fn stream_out(&self, handle: &VmCid, src_path: &str) -> Result<Vec<u8>, BackendError>;
}
