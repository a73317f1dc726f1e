//! Garden API client.
//!
//! Speaks the Garden REST protocol over a tcp address or a unix socket.
//! Persistent disks are exposed through a per-container host directory
//! that is bind mounted into the container when it is created; attaching a
//! disk bind mounts the disk directory underneath it on the host.
//!
//! Reference: https://github.com/cloudfoundry/garden/blob/main/routes/routes.go

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, Response, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use warden_cpi_id::{DiskCid, VmCid};

use super::{Backend, BackendError, UnitSpec, VolumeAttachment};
use crate::store_path::child_path;
use crate::system::{CommandRunner, FileSystem};

/// Mode for per-container host mount directories.
const MOUNT_DIR_MODE: u32 = 0o755;

/// Garden bind mount modes.
const BIND_MOUNT_MODE_RO: u8 = 0;
const BIND_MOUNT_MODE_RW: u8 = 1;

/// Garden bind mount origin: path is on the host.
const BIND_MOUNT_ORIGIN_HOST: u8 = 0;

/// Configuration for [`GardenBackend`].
#[derive(Debug, Clone)]
pub struct GardenConfig {
    /// `tcp` or `unix`.
    pub connect_network: String,
    /// `host:port` for tcp, socket path for unix.
    pub connect_address: String,
    /// Host directory holding one mount directory per container.
    pub host_persistent_bind_mounts_dir: PathBuf,
    /// Where the container's mount directory appears inside it.
    pub guest_persistent_bind_mounts_dir: String,
}

enum Transport {
    Tcp {
        client: Client<HttpConnector>,
        address: String,
    },
    Unix {
        client: Client<UnixConnector>,
        socket_path: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct GardenBindMount {
    src_path: String,
    dst_path: String,
    mode: u8,
    origin: u8,
}

#[derive(Debug, Serialize)]
struct GardenContainerSpec<'a> {
    handle: &'a str,
    rootfs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<&'a str>,
    bind_mounts: Vec<GardenBindMount>,
    properties: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct GardenHandles {
    #[serde(default)]
    handles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GardenErrorBody {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// [`super::Backend`] backed by a Garden server.
pub struct GardenBackend {
    transport: Transport,
    host_mounts_dir: PathBuf,
    guest_mounts_dir: String,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
}

impl GardenBackend {
    /// Create a client for the configured Garden server. No connection is
    /// made until the first request.
    pub fn new(
        config: GardenConfig,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, BackendError> {
        let transport = match config.connect_network.as_str() {
            "tcp" => Transport::Tcp {
                client: Client::new(),
                address: config.connect_address,
            },
            "unix" => Transport::Unix {
                client: Client::unix(),
                socket_path: PathBuf::from(config.connect_address),
            },
            other => {
                return Err(BackendError::Failed(format!(
                    "unsupported garden network '{other}'"
                )))
            }
        };

        Ok(Self {
            transport,
            host_mounts_dir: config.host_persistent_bind_mounts_dir,
            guest_mounts_dir: config.guest_persistent_bind_mounts_dir,
            fs,
            runner,
        })
    }

    fn unit_mounts_dir(&self, handle: &VmCid) -> Result<PathBuf, BackendError> {
        child_path(&self.host_mounts_dir, handle.as_str())
            .ok_or_else(|| BackendError::NotFound(handle.clone()))
    }

    fn volume_mount_point(
        &self,
        handle: &VmCid,
        volume_id: &DiskCid,
    ) -> Result<PathBuf, BackendError> {
        let unit_dir = self.unit_mounts_dir(handle)?;
        child_path(&unit_dir, volume_id.as_str()).ok_or_else(|| {
            BackendError::Failed(format!("invalid volume id '{volume_id}'"))
        })
    }

    /// Unmount and remove every volume mount point left under the unit's
    /// mount directory, then the directory itself.
    ///
    /// A directory that is still mounted cannot be removed, so a failed
    /// unmount surfaces as a removal error.
    async fn remove_unit_mounts(&self, handle: &VmCid) -> Result<(), BackendError> {
        let Ok(mounts_dir) = self.unit_mounts_dir(handle) else {
            return Ok(());
        };

        let mount_points = match self.fs.read_dir(&mounts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(BackendError::Failed(format!(
                    "listing mount directory '{}': {e}",
                    mounts_dir.display()
                )))
            }
        };

        for mount_point in &mount_points {
            info!(
                handle = %handle,
                mount_point = %mount_point.display(),
                "Unmounting volume of destroyed container"
            );
            if let Err(e) = self.run("umount", &[mount_point.as_os_str()]).await {
                warn!(mount_point = %mount_point.display(), error = %e, "Unmount failed");
            }
            self.remove_mount_dir(mount_point)?;
        }

        self.remove_mount_dir(&mounts_dir)
    }

    fn remove_mount_dir(&self, path: &Path) -> Result<(), BackendError> {
        self.fs.remove_dir(path).map_err(|e| {
            BackendError::Failed(format!("removing mount point '{}': {e}", path.display()))
        })
    }

    async fn run(&self, program: &str, args: &[&OsStr]) -> Result<(), BackendError> {
        self.runner
            .run(program, args)
            .await
            .map_err(|e| BackendError::Failed(e.to_string()))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Body,
        content_type: &str,
    ) -> Result<Response<Body>, BackendError> {
        debug!(method = %method, path = path, "Garden request");

        let uri: hyper::Uri = match &self.transport {
            Transport::Tcp { address, .. } => format!("http://{address}{path}")
                .parse()
                .map_err(|e| BackendError::Failed(format!("building garden uri: {e}")))?,
            Transport::Unix { socket_path, .. } => hyperlocal::Uri::new(socket_path, path).into(),
        };

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", content_type)
            .body(body)
            .map_err(|e| BackendError::Failed(format!("building garden request: {e}")))?;

        let result = match &self.transport {
            Transport::Tcp { client, .. } => client.request(request).await,
            Transport::Unix { client, .. } => client.request(request).await,
        };

        result.map_err(|e| {
            if e.is_connect() {
                BackendError::Unavailable(e.to_string())
            } else {
                BackendError::Failed(format!("garden request: {e}"))
            }
        })
    }

    /// Send a request and collect the body, turning non-2xx statuses into
    /// errors.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Body,
        content_type: &str,
        handle: Option<&VmCid>,
    ) -> Result<Vec<u8>, BackendError> {
        let response = self.send(method, path, body, content_type).await?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| BackendError::Failed(format!("reading garden response: {e}")))?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        let detail = match serde_json::from_slice::<GardenErrorBody>(&bytes) {
            Ok(body) if !body.message.is_empty() => format!("{}: {}", body.kind, body.message),
            _ => String::from_utf8_lossy(&bytes).trim().to_string(),
        };

        match (status, handle) {
            (StatusCode::NOT_FOUND, Some(handle)) => Err(BackendError::NotFound(handle.clone())),
            (StatusCode::SERVICE_UNAVAILABLE, _) => Err(BackendError::Unavailable(detail)),
            _ => {
                error!(status = %status, path = path, detail = %detail, "Garden API error");
                Err(BackendError::Failed(format!("garden {status}: {detail}")))
            }
        }
    }

    async fn call_json<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
        handle: Option<&VmCid>,
    ) -> Result<Vec<u8>, BackendError> {
        let body = serde_json::to_vec(body)
            .map_err(|e| BackendError::Failed(format!("encoding garden request: {e}")))?;
        self.call(method, path, Body::from(body), "application/json", handle)
            .await
    }
}

#[async_trait]
impl Backend for GardenBackend {
    async fn create_unit(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let mounts_dir = self.unit_mounts_dir(&spec.handle)?;
        self.fs
            .mkdir_all(&mounts_dir, MOUNT_DIR_MODE)
            .map_err(|e| {
                BackendError::Failed(format!(
                    "creating mount directory '{}': {e}",
                    mounts_dir.display()
                ))
            })?;

        let mut bind_mounts: Vec<GardenBindMount> = spec
            .bind_mounts
            .iter()
            .map(|mount| GardenBindMount {
                src_path: mount.src_path.to_string_lossy().into_owned(),
                dst_path: mount.dst_path.clone(),
                mode: if mount.read_only {
                    BIND_MOUNT_MODE_RO
                } else {
                    BIND_MOUNT_MODE_RW
                },
                origin: BIND_MOUNT_ORIGIN_HOST,
            })
            .collect();
        bind_mounts.push(GardenBindMount {
            src_path: mounts_dir.to_string_lossy().into_owned(),
            dst_path: self.guest_mounts_dir.clone(),
            mode: BIND_MOUNT_MODE_RW,
            origin: BIND_MOUNT_ORIGIN_HOST,
        });

        let body = GardenContainerSpec {
            handle: spec.handle.as_str(),
            rootfs: format!("raw://{}", spec.rootfs.display()),
            network: spec.network.as_deref(),
            bind_mounts,
            properties: &spec.properties,
        };

        info!(handle = %spec.handle, rootfs = %spec.rootfs.display(), "Creating container");
        self.call_json(Method::POST, "/containers", &body, None)
            .await?;
        Ok(())
    }

    async fn destroy_unit(&self, handle: &VmCid) -> Result<(), BackendError> {
        info!(handle = %handle, "Destroying container");
        let path = format!("/containers/{}", encode_path_segment(handle.as_str()));
        let destroyed = self
            .call(Method::DELETE, &path, Body::empty(), "application/json", Some(handle))
            .await;

        match destroyed {
            Ok(_) => self.remove_unit_mounts(handle).await,
            Err(BackendError::NotFound(gone)) => {
                self.remove_unit_mounts(handle).await?;
                Err(BackendError::NotFound(gone))
            }
            Err(e) => Err(e),
        }
    }

    async fn unit_exists(&self, handle: &VmCid) -> Result<bool, BackendError> {
        let bytes = self
            .call(Method::GET, "/containers", Body::empty(), "application/json", None)
            .await?;
        let listed: GardenHandles = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Failed(format!("decoding container list: {e}")))?;
        Ok(listed.handles.iter().any(|h| h == handle.as_str()))
    }

    async fn set_property(
        &self,
        handle: &VmCid,
        key: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        #[derive(Serialize)]
        struct Value<'a> {
            value: &'a str,
        }

        let path = format!(
            "/containers/{}/properties/{}",
            encode_path_segment(handle.as_str()),
            encode_path_segment(key)
        );
        self.call_json(Method::PUT, &path, &Value { value }, Some(handle))
            .await?;
        Ok(())
    }

    async fn attach_volume(
        &self,
        handle: &VmCid,
        volume: &VolumeAttachment,
    ) -> Result<String, BackendError> {
        let mount_point = self.volume_mount_point(handle, &volume.volume_id)?;
        self.fs
            .mkdir_all(&mount_point, MOUNT_DIR_MODE)
            .map_err(|e| {
                BackendError::Failed(format!(
                    "creating mount point '{}': {e}",
                    mount_point.display()
                ))
            })?;

        info!(
            handle = %handle,
            volume = %volume.volume_id,
            mount_point = %mount_point.display(),
            "Bind mounting volume"
        );
        self.run(
            "mount",
            &[
                OsStr::new("--bind"),
                volume.host_path.as_os_str(),
                mount_point.as_os_str(),
            ],
        )
        .await?;

        Ok(format!("{}/{}", self.guest_mounts_dir, volume.volume_id))
    }

    async fn detach_volume(
        &self,
        handle: &VmCid,
        volume_id: &DiskCid,
    ) -> Result<(), BackendError> {
        let mount_point = self.volume_mount_point(handle, volume_id)?;
        if !self.fs.exists(&mount_point) {
            debug!(handle = %handle, volume = %volume_id, "Volume not mounted");
            return Ok(());
        }

        info!(handle = %handle, volume = %volume_id, "Unmounting volume");
        self.run("umount", &[mount_point.as_os_str()]).await?;
        self.remove_mount_dir(&mount_point)
    }

    async fn stream_in(
        &self,
        handle: &VmCid,
        dst_dir: &str,
        tar: Vec<u8>,
    ) -> Result<(), BackendError> {
        let path = format!(
            "/containers/{}/files?user=root&destination={}",
            encode_path_segment(handle.as_str()),
            encode_query_value(dst_dir)
        );
        self.call(Method::PUT, &path, Body::from(tar), "application/x-tar", Some(handle))
            .await?;
        Ok(())
    }

    async fn stream_out(&self, handle: &VmCid, src_path: &str) -> Result<Vec<u8>, BackendError> {
        let path = format!(
            "/containers/{}/files?user=root&source={}",
            encode_path_segment(handle.as_str()),
            encode_query_value(src_path)
        );
        self.call(Method::GET, &path, Body::empty(), "application/json", Some(handle))
            .await
    }
}

fn percent_encode(value: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') || keep(byte)
        {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn encode_path_segment(value: &str) -> String {
    percent_encode(value, |_| false)
}

fn encode_query_value(value: &str) -> String {
    percent_encode(value, |b| b == b'/')
}
