//! Persistent disk actions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use warden_cpi_id::{DiskCid, VmCid};

use super::agent_env::AgentEnvService;
use crate::backend::{Backend, VolumeAttachment};
use crate::disk::DiskStore;
use crate::dispatch::Action;
use crate::error::{CpiError, ResultExt};

/// `create_disk(size_mb, cloud_properties, vm_locality) -> disk id`
pub struct CreateDisk {
    disks: Arc<DiskStore>,
}

impl CreateDisk {
    pub fn new(disks: Arc<DiskStore>) -> Self {
        Self { disks }
    }
}

#[async_trait]
impl Action for CreateDisk {
    type Args = (u64, Value, Option<VmCid>);
    type Output = DiskCid;

    async fn run(&self, args: Self::Args) -> Result<DiskCid, CpiError> {
        let (size_mb, _cloud_properties, vm_locality) = args;

        if let Some(vm_id) = &vm_locality {
            debug!(vm_id = %vm_id, "Ignoring VM locality");
        }

        let disk = self
            .disks
            .create(size_mb)
            .cloud_context(format!("Creating disk of size {size_mb} MB"))?;
        Ok(disk.id().clone())
    }
}

/// `delete_disk(disk_id)`; deleting an absent disk succeeds.
pub struct DeleteDisk {
    disks: Arc<DiskStore>,
}

impl DeleteDisk {
    pub fn new(disks: Arc<DiskStore>) -> Self {
        Self { disks }
    }
}

#[async_trait]
impl Action for DeleteDisk {
    type Args = (DiskCid,);
    type Output = ();

    async fn run(&self, args: Self::Args) -> Result<(), CpiError> {
        let (disk_id,) = args;
        self.disks
            .delete(&disk_id)
            .cloud_context(format!("Deleting disk '{disk_id}'"))
    }
}

/// `has_disk(disk_id) -> bool`
pub struct HasDisk {
    disks: Arc<DiskStore>,
}

impl HasDisk {
    pub fn new(disks: Arc<DiskStore>) -> Self {
        Self { disks }
    }
}

#[async_trait]
impl Action for HasDisk {
    type Args = (DiskCid,);
    type Output = bool;

    async fn run(&self, args: Self::Args) -> Result<bool, CpiError> {
        let (disk_id,) = args;
        Ok(self.disks.exists(&disk_id))
    }
}

/// `attach_disk(vm_id, disk_id)`
///
/// The disk is exposed by the backend before it is recorded in the agent
/// env.
pub struct AttachDisk {
    disks: Arc<DiskStore>,
    backend: Arc<dyn Backend>,
    agent_envs: AgentEnvService,
}

impl AttachDisk {
    pub fn new(disks: Arc<DiskStore>, backend: Arc<dyn Backend>, agent_envs: AgentEnvService) -> Self {
        Self {
            disks,
            backend,
            agent_envs,
        }
    }
}

#[async_trait]
impl Action for AttachDisk {
    type Args = (VmCid, DiskCid);
    type Output = ();

    async fn run(&self, args: Self::Args) -> Result<(), CpiError> {
        let (vm_id, disk_id) = args;

        let disk = self
            .disks
            .lookup(&disk_id)
            .cloud_context(format!("Finding disk '{disk_id}'"))?;

        let vm_found = self
            .backend
            .unit_exists(&vm_id)
            .await
            .cloud_context(format!("Finding VM '{vm_id}'"))?;
        if !vm_found {
            return Err(CpiError::generic(format!("Finding VM '{vm_id}': not found")));
        }

        let attachment = VolumeAttachment {
            volume_id: disk_id.clone(),
            host_path: disk.path().to_path_buf(),
        };
        let guest_path = self
            .backend
            .attach_volume(&vm_id, &attachment)
            .await
            .cloud_context(format!("Attaching disk '{disk_id}' to VM '{vm_id}'"))?;

        let mut agent_env = self
            .agent_envs
            .fetch(&vm_id)
            .await
            .cloud_context(format!("Fetching agent env for VM '{vm_id}'"))?;
        agent_env.attach_persistent_disk(disk_id.clone(), guest_path.as_str());
        self.agent_envs
            .update(&vm_id, &agent_env)
            .await
            .cloud_context(format!("Updating agent env for VM '{vm_id}'"))?;

        info!(vm_id = %vm_id, disk_id = %disk_id, guest_path = %guest_path, "Attached disk");
        Ok(())
    }
}

/// `detach_disk(vm_id, disk_id)`
pub struct DetachDisk {
    backend: Arc<dyn Backend>,
    agent_envs: AgentEnvService,
}

impl DetachDisk {
    pub fn new(backend: Arc<dyn Backend>, agent_envs: AgentEnvService) -> Self {
        Self {
            backend,
            agent_envs,
        }
    }
}

#[async_trait]
impl Action for DetachDisk {
    type Args = (VmCid, DiskCid);
    type Output = ();

    async fn run(&self, args: Self::Args) -> Result<(), CpiError> {
        let (vm_id, disk_id) = args;

        self.backend
            .detach_volume(&vm_id, &disk_id)
            .await
            .cloud_context(format!("Detaching disk '{disk_id}' from VM '{vm_id}'"))?;

        let mut agent_env = self
            .agent_envs
            .fetch(&vm_id)
            .await
            .cloud_context(format!("Fetching agent env for VM '{vm_id}'"))?;
        if agent_env.detach_persistent_disk(&disk_id) {
            self.agent_envs
                .update(&vm_id, &agent_env)
                .await
                .cloud_context(format!("Updating agent env for VM '{vm_id}'"))?;
        }

        info!(vm_id = %vm_id, disk_id = %disk_id, "Detached disk");
        Ok(())
    }
}

/// `get_disks(vm_id) -> [disk id]`
pub struct GetDisks {
    agent_envs: AgentEnvService,
}

impl GetDisks {
    pub fn new(agent_envs: AgentEnvService) -> Self {
        Self { agent_envs }
    }
}

#[async_trait]
impl Action for GetDisks {
    type Args = (VmCid,);
    type Output = Vec<DiskCid>;

    async fn run(&self, args: Self::Args) -> Result<Vec<DiskCid>, CpiError> {
        let (vm_id,) = args;
        let agent_env = self
            .agent_envs
            .fetch(&vm_id)
            .await
            .cloud_context(format!("Fetching agent env for VM '{vm_id}'"))?;
        Ok(agent_env.persistent_disk_ids())
    }
}
