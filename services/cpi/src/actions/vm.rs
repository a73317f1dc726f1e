//! VM actions.
//!
//! A VM is a backend unit whose root filesystem is an unpacked stemcell.
//! Its agent settings are written into the unit right after creation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use warden_cpi_id::{DiskCid, IdGenerator, StemcellCid, VmCid};

use super::agent_env::{AgentEnv, AgentEnvService, AgentOptions};
use crate::backend::{Backend, BackendError, UnitSpec};
use crate::dispatch::Action;
use crate::error::{CpiError, ResultExt};
use crate::stemcell::StemcellStore;

/// `create_vm(agent_id, stemcell_id, cloud_properties, networks, disk_locality, env) -> vm id`
pub struct CreateVm {
    stemcells: Arc<StemcellStore>,
    backend: Arc<dyn Backend>,
    agent_envs: AgentEnvService,
    vm_ids: Arc<dyn IdGenerator>,
    agent: AgentOptions,
}

impl CreateVm {
    pub fn new(
        stemcells: Arc<StemcellStore>,
        backend: Arc<dyn Backend>,
        agent_envs: AgentEnvService,
        vm_ids: Arc<dyn IdGenerator>,
        agent: AgentOptions,
    ) -> Self {
        Self {
            stemcells,
            backend,
            agent_envs,
            vm_ids,
            agent,
        }
    }
}

#[async_trait]
impl Action for CreateVm {
    type Args = (
        String,
        StemcellCid,
        Value,
        Option<Map<String, Value>>,
        Option<Vec<DiskCid>>,
        Value,
    );
    type Output = VmCid;

    async fn run(&self, args: Self::Args) -> Result<VmCid, CpiError> {
        let (agent_id, stemcell_id, _cloud_properties, networks, disk_locality, env) = args;
        let networks = networks.unwrap_or_default();
        let disk_locality = disk_locality.unwrap_or_default();

        let stemcell = self
            .stemcells
            .lookup(&stemcell_id)
            .cloud_context(format!("Finding stemcell '{stemcell_id}'"))?;

        let vm_id = VmCid::new(
            self.vm_ids
                .generate()
                .cloud_context("Generating VM id")?,
        );

        if !disk_locality.is_empty() {
            debug!(vm_id = %vm_id, disks = disk_locality.len(), "Ignoring disk locality");
        }

        let spec = UnitSpec {
            handle: vm_id.clone(),
            rootfs: stemcell.path().to_path_buf(),
            network: static_ip(&networks),
            bind_mounts: Vec::new(),
            properties: BTreeMap::new(),
        };

        info!(
            vm_id = %vm_id,
            agent_id = %agent_id,
            stemcell_id = %stemcell_id,
            network = spec.network.as_deref().unwrap_or(""),
            "Creating VM"
        );
        self.backend
            .create_unit(&spec)
            .await
            .cloud_context(format!("Creating VM with agent ID '{agent_id}'"))?;

        let agent_env = AgentEnv::new(agent_id, &vm_id, &self.agent, networks, env);
        if let Err(e) = self.agent_envs.update(&vm_id, &agent_env).await {
            warn!(vm_id = %vm_id, error = %e, "Writing agent env failed, destroying VM");
            if let Err(cleanup) = self.backend.destroy_unit(&vm_id).await {
                warn!(vm_id = %vm_id, error = %cleanup, "Destroying half-created VM failed");
            }
            return Err(e).cloud_context(format!("Updating agent env for VM '{vm_id}'"));
        }

        Ok(vm_id)
    }
}

/// Static IP of the first network, if it has one.
fn static_ip(networks: &Map<String, Value>) -> Option<String> {
    networks
        .values()
        .next()
        .and_then(|network| network.get("ip"))
        .and_then(Value::as_str)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// `delete_vm(vm_id)`; deleting an absent VM succeeds.
pub struct DeleteVm {
    backend: Arc<dyn Backend>,
}

impl DeleteVm {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for DeleteVm {
    type Args = (VmCid,);
    type Output = ();

    async fn run(&self, args: Self::Args) -> Result<(), CpiError> {
        let (vm_id,) = args;

        match self.backend.destroy_unit(&vm_id).await {
            Ok(()) => info!(vm_id = %vm_id, "Deleted VM"),
            Err(BackendError::NotFound(_)) => debug!(vm_id = %vm_id, "VM already gone"),
            Err(e) => return Err(e).cloud_context(format!("Deleting VM '{vm_id}'")),
        }
        Ok(())
    }
}

/// `has_vm(vm_id) -> bool`
pub struct HasVm {
    backend: Arc<dyn Backend>,
}

impl HasVm {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for HasVm {
    type Args = (VmCid,);
    type Output = bool;

    async fn run(&self, args: Self::Args) -> Result<bool, CpiError> {
        let (vm_id,) = args;
        self.backend
            .unit_exists(&vm_id)
            .await
            .cloud_context(format!("Finding VM '{vm_id}'"))
    }
}

/// `reboot_vm(vm_id)`: containers cannot be rebooted in place.
pub struct RebootVm;

#[async_trait]
impl Action for RebootVm {
    type Args = (VmCid,);
    type Output = ();

    async fn run(&self, args: Self::Args) -> Result<(), CpiError> {
        let (vm_id,) = args;
        Err(CpiError::not_supported(format!(
            "Rebooting VM '{vm_id}' is not supported"
        )))
    }
}

/// `set_vm_metadata(vm_id, metadata)`: each entry becomes a unit property.
pub struct SetVmMetadata {
    backend: Arc<dyn Backend>,
}

impl SetVmMetadata {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for SetVmMetadata {
    type Args = (VmCid, BTreeMap<String, String>);
    type Output = ();

    async fn run(&self, args: Self::Args) -> Result<(), CpiError> {
        let (vm_id, metadata) = args;

        for (key, value) in &metadata {
            self.backend
                .set_property(&vm_id, key, value)
                .await
                .cloud_context(format!("Setting metadata '{key}' on VM '{vm_id}'"))?;
        }

        debug!(vm_id = %vm_id, entries = metadata.len(), "Set VM metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::fixture::{Fixture, SequenceGenerator};
    use crate::backend::MockBackend;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn create_vm(fixture: &Fixture) -> CreateVm {
        CreateVm::new(
            fixture.stemcells.clone(),
            fixture.backend.clone(),
            fixture.agent_envs(),
            Arc::new(SequenceGenerator::new("vm")),
            fixture.agent_options(),
        )
    }

    fn networks() -> Map<String, Value> {
        let mut networks = Map::new();
        networks.insert(
            "default".to_string(),
            json!({"type": "manual", "ip": "10.244.0.10", "netmask": "255.255.255.0"}),
        );
        networks
    }

    #[tokio::test]
    async fn test_create_vm() {
        let fixture = Fixture::new();
        let stemcell_id = fixture.seed_stemcell("sc-1");

        let vm_id = create_vm(&fixture)
            .run((
                "agent-1".to_string(),
                stemcell_id,
                json!({}),
                Some(networks()),
                None,
                json!({"bosh": {"password": "secret"}}),
            ))
            .await
            .unwrap();
        assert_eq!(vm_id, VmCid::new("vm-1"));

        let unit = fixture.backend.unit(&vm_id).unwrap();
        assert_eq!(unit.spec.network.as_deref(), Some("10.244.0.10"));
        assert_eq!(unit.spec.rootfs, fixture.stemcells.dir_path().join("sc-1"));

        let agent_env = fixture.agent_envs().fetch(&vm_id).await.unwrap();
        assert_eq!(agent_env.agent_id, "agent-1");
        assert_eq!(agent_env.vm.id, vm_id);
        assert_eq!(agent_env.env["bosh"]["password"], "secret");
    }

    #[tokio::test]
    async fn test_create_vm_unknown_stemcell_skips_backend() {
        let fixture = Fixture::new();

        let err = create_vm(&fixture)
            .run((
                "agent-1".to_string(),
                StemcellCid::new("missing"),
                json!({}),
                Some(networks()),
                None,
                json!({}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert_eq!(fixture.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_vm_destroys_unit_when_agent_env_fails() {
        let fixture = Fixture::with_backend(MockBackend::with_failing_stream_in());
        let stemcell_id = fixture.seed_stemcell("sc-1");

        let result = create_vm(&fixture)
            .run((
                "agent-1".to_string(),
                stemcell_id,
                json!({}),
                None,
                Some(vec![]),
                json!({}),
            ))
            .await;
        assert!(result.is_err());
        assert_eq!(fixture.backend.unit_count(), 0);
    }

    #[tokio::test]
    async fn test_create_vm_backend_unavailable() {
        let fixture = Fixture::with_backend(MockBackend::unavailable());
        let stemcell_id = fixture.seed_stemcell("sc-1");

        let err = create_vm(&fixture)
            .run((
                "agent-1".to_string(),
                stemcell_id,
                json!({}),
                Some(networks()),
                None,
                json!({}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CloudServiceUnavailable);
        assert!(err.ok_to_retry());
    }

    #[tokio::test]
    async fn test_delete_vm_is_idempotent() {
        let fixture = Fixture::new();
        let stemcell_id = fixture.seed_stemcell("sc-1");
        let vm_id = create_vm(&fixture)
            .run((
                "agent-1".to_string(),
                stemcell_id,
                json!({}),
                None,
                Some(vec![]),
                json!({}),
            ))
            .await
            .unwrap();

        let delete = DeleteVm::new(fixture.backend.clone());
        let has = HasVm::new(fixture.backend.clone());

        assert!(has.run((vm_id.clone(),)).await.unwrap());
        delete.run((vm_id.clone(),)).await.unwrap();
        delete.run((vm_id.clone(),)).await.unwrap();
        assert!(!has.run((vm_id,)).await.unwrap());
    }

    #[tokio::test]
    async fn test_reboot_vm_is_not_supported() {
        let err = RebootVm.run((VmCid::new("vm-1"),)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(!err.ok_to_retry());
    }

    #[tokio::test]
    async fn test_set_vm_metadata() {
        let fixture = Fixture::new();
        let stemcell_id = fixture.seed_stemcell("sc-1");
        let vm_id = create_vm(&fixture)
            .run((
                "agent-1".to_string(),
                stemcell_id,
                json!({}),
                None,
                Some(vec![]),
                json!({}),
            ))
            .await
            .unwrap();

        let metadata = BTreeMap::from([
            ("deployment".to_string(), "cf".to_string()),
            ("job".to_string(), "router".to_string()),
        ]);
        SetVmMetadata::new(fixture.backend.clone())
            .run((vm_id.clone(), metadata))
            .await
            .unwrap();

        let unit = fixture.backend.unit(&vm_id).unwrap();
        assert_eq!(unit.properties.get("job").map(String::as_str), Some("router"));
    }

    #[test]
    fn test_static_ip_uses_first_network() {
        let mut networks = networks();
        networks.insert("z-other".to_string(), json!({"ip": "10.0.0.99"}));
        assert_eq!(static_ip(&networks).as_deref(), Some("10.244.0.10"));

        let mut dynamic = Map::new();
        dynamic.insert("default".to_string(), json!({"type": "dynamic"}));
        assert_eq!(static_ip(&dynamic), None);
    }
}
