//! CPI actions.
//!
//! One type per BOSH CPI verb. Actions hold their collaborators and no
//! other state; [`build_dispatcher`] wires them into the method table.
//!
//! | method            | action              |
//! |-------------------|---------------------|
//! | `info`            | [`Info`]            |
//! | `create_stemcell` | [`CreateStemcell`]  |
//! | `delete_stemcell` | [`DeleteStemcell`]  |
//! | `create_vm`       | [`CreateVm`]        |
//! | `delete_vm`       | [`DeleteVm`]        |
//! | `has_vm`          | [`HasVm`]           |
//! | `reboot_vm`       | [`RebootVm`]        |
//! | `set_vm_metadata` | [`SetVmMetadata`]   |
//! | `create_disk`     | [`CreateDisk`]      |
//! | `delete_disk`     | [`DeleteDisk`]      |
//! | `has_disk`        | [`HasDisk`]         |
//! | `attach_disk`     | [`AttachDisk`]      |
//! | `detach_disk`     | [`DetachDisk`]      |
//! | `get_disks`       | [`GetDisks`]        |

mod agent_env;
mod disk;
mod info;
mod stemcell;
mod vm;

#[cfg(test)]
pub(crate) mod fixture;

use std::sync::Arc;

use warden_cpi_id::IdGenerator;

pub use agent_env::{
    AgentEnv, AgentEnvError, AgentEnvService, AgentOptions, DisksInfo, VmInfo, AGENT_ENV_DIR,
    AGENT_ENV_FILE,
};
pub use disk::{AttachDisk, CreateDisk, DeleteDisk, DetachDisk, GetDisks, HasDisk};
pub use info::{Info, InfoResult};
pub use stemcell::{CreateStemcell, DeleteStemcell};
pub use vm::{CreateVm, DeleteVm, HasVm, RebootVm, SetVmMetadata};

use crate::backend::Backend;
use crate::disk::DiskStore;
use crate::dispatch::Dispatcher;
use crate::stemcell::StemcellStore;

/// Collaborators shared by the actions.
#[derive(Clone)]
pub struct ActionDeps {
    pub backend: Arc<dyn Backend>,
    pub stemcells: Arc<StemcellStore>,
    pub disks: Arc<DiskStore>,
    /// Source of VM ids.
    pub vm_ids: Arc<dyn IdGenerator>,
    pub agent: AgentOptions,
}

/// Build the method table with every supported verb.
pub fn build_dispatcher(deps: ActionDeps) -> Dispatcher {
    let agent_envs = AgentEnvService::new(deps.backend.clone());

    Dispatcher::new()
        .with("info", Info)
        .with("create_stemcell", CreateStemcell::new(deps.stemcells.clone()))
        .with("delete_stemcell", DeleteStemcell::new(deps.stemcells.clone()))
        .with(
            "create_vm",
            CreateVm::new(
                deps.stemcells,
                deps.backend.clone(),
                agent_envs.clone(),
                deps.vm_ids,
                deps.agent,
            ),
        )
        .with("delete_vm", DeleteVm::new(deps.backend.clone()))
        .with("has_vm", HasVm::new(deps.backend.clone()))
        .with("reboot_vm", RebootVm)
        .with("set_vm_metadata", SetVmMetadata::new(deps.backend.clone()))
        .with("create_disk", CreateDisk::new(deps.disks.clone()))
        .with("delete_disk", DeleteDisk::new(deps.disks.clone()))
        .with("has_disk", HasDisk::new(deps.disks.clone()))
        .with(
            "attach_disk",
            AttachDisk::new(deps.disks.clone(), deps.backend.clone(), agent_envs.clone()),
        )
        .with(
            "detach_disk",
            DetachDisk::new(deps.backend.clone(), agent_envs.clone()),
        )
        .with("get_disks", GetDisks::new(agent_envs))
}
