//! In-memory backend for testing and development.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};
use warden_cpi_id::{DiskCid, VmCid};

use super::{Backend, BackendError, UnitSpec, VolumeAttachment};

/// Guest directory the mock reports attached disks under.
const MOCK_GUEST_MOUNT_DIR: &str = "/warden-cpi-dev";

/// State of a unit held by [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockUnit {
    pub spec: UnitSpec,
    pub properties: BTreeMap<String, String>,
    pub volumes: BTreeMap<DiskCid, PathBuf>,
    /// Files streamed in, keyed by absolute path inside the unit.
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Backend that keeps units in memory.
pub struct MockBackend {
    units: Mutex<HashMap<VmCid, MockUnit>>,

    /// Number of backend calls made.
    calls: AtomicUsize,

    /// Whether every call should report the backend as unreachable.
    unavailable: bool,

    /// Whether stream_in should fail.
    fail_stream_in: bool,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self {
            units: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            unavailable: false,
            fail_stream_in: false,
        }
    }

    /// Create a mock backend that is never reachable.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    /// Create a mock backend whose file transfers fail.
    pub fn with_failing_stream_in() -> Self {
        Self {
            fail_stream_in: true,
            ..Self::new()
        }
    }

    /// Total number of backend calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn unit_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of a unit's state.
    pub fn unit(&self, handle: &VmCid) -> Option<MockUnit> {
        self.lock().get(handle).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<VmCid, MockUnit>> {
        self.units.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(BackendError::Unavailable(
                "mock backend configured as unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn with_unit<T>(
        &self,
        handle: &VmCid,
        f: impl FnOnce(&mut MockUnit) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut units = self.lock();
        let unit = units
            .get_mut(handle)
            .ok_or_else(|| BackendError::NotFound(handle.clone()))?;
        f(unit)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn create_unit(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.enter()?;
        info!(handle = %spec.handle, rootfs = %spec.rootfs.display(), "[MOCK] Creating unit");

        let mut units = self.lock();
        if units.contains_key(&spec.handle) {
            return Err(BackendError::Failed(format!(
                "unit '{}' already exists",
                spec.handle
            )));
        }
        units.insert(
            spec.handle.clone(),
            MockUnit {
                spec: spec.clone(),
                properties: spec.properties.clone(),
                volumes: BTreeMap::new(),
                files: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn destroy_unit(&self, handle: &VmCid) -> Result<(), BackendError> {
        self.enter()?;
        info!(handle = %handle, "[MOCK] Destroying unit");

        self.lock()
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(handle.clone()))
    }

    async fn unit_exists(&self, handle: &VmCid) -> Result<bool, BackendError> {
        self.enter()?;
        Ok(self.lock().contains_key(handle))
    }

    async fn set_property(
        &self,
        handle: &VmCid,
        key: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        self.enter()?;
        self.with_unit(handle, |unit| {
            unit.properties.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn attach_volume(
        &self,
        handle: &VmCid,
        volume: &VolumeAttachment,
    ) -> Result<String, BackendError> {
        self.enter()?;
        debug!(handle = %handle, volume = %volume.volume_id, "[MOCK] Attaching volume");

        self.with_unit(handle, |unit| {
            unit.volumes
                .insert(volume.volume_id.clone(), volume.host_path.clone());
            Ok(format!("{}/{}", MOCK_GUEST_MOUNT_DIR, volume.volume_id))
        })
    }

    async fn detach_volume(
        &self,
        handle: &VmCid,
        volume_id: &DiskCid,
    ) -> Result<(), BackendError> {
        self.enter()?;
        debug!(handle = %handle, volume = %volume_id, "[MOCK] Detaching volume");

        self.with_unit(handle, |unit| {
            unit.volumes.remove(volume_id);
            Ok(())
        })
    }

    async fn stream_in(
        &self,
        handle: &VmCid,
        dst_dir: &str,
        tar: Vec<u8>,
    ) -> Result<(), BackendError> {
        self.enter()?;
        if self.fail_stream_in {
            return Err(BackendError::Failed(
                "mock backend configured to fail stream in".to_string(),
            ));
        }

        let files = read_tar(&tar)?;
        self.with_unit(handle, |unit| {
            for (name, data) in files {
                let path = Path::new(dst_dir).join(name);
                unit.files.insert(path.to_string_lossy().into_owned(), data);
            }
            Ok(())
        })
    }

    async fn stream_out(&self, handle: &VmCid, src_path: &str) -> Result<Vec<u8>, BackendError> {
        self.enter()?;
        self.with_unit(handle, |unit| {
            let data = unit
                .files
                .get(src_path)
                .ok_or_else(|| BackendError::Failed(format!("no such file '{src_path}'")))?;
            let name = Path::new(src_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| src_path.to_string());
            write_tar(&name, data)
        })
    }
}

fn read_tar(bytes: &[u8]) -> Result<Vec<(PathBuf, Vec<u8>)>, BackendError> {
    let failed = |e: std::io::Error| BackendError::Failed(format!("reading tar stream: {e}"));

    let mut archive = tar::Archive::new(bytes);
    let mut files = Vec::new();
    for entry in archive.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let path = entry.path().map_err(failed)?.into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(failed)?;
        files.push((path, data));
    }
    Ok(files)
}

fn write_tar(name: &str, data: &[u8]) -> Result<Vec<u8>, BackendError> {
    let failed = |e: std::io::Error| BackendError::Failed(format!("writing tar stream: {e}"));

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, name, data).map_err(failed)?;
    builder.into_inner().map_err(failed)
}
