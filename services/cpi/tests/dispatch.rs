//! Integration tests for request dispatch over the full action table.

use std::sync::Arc;

use rstest::rstest;
use serde_json::{json, Value};

use warden_cpi::actions::{build_dispatcher, ActionDeps, AgentOptions};
use warden_cpi::backend::MockBackend;
use warden_cpi::disk::DiskStore;
use warden_cpi::dispatch::{ArgumentDecodeError, DispatchError, Dispatcher};
use warden_cpi::error::ErrorKind;
use warden_cpi::stemcell::StemcellStore;
use warden_cpi::system::{FileSystem, OsFileSystem, TarballCompressor};
use warden_cpi_id::{UuidGenerator, VmCid};

struct Harness {
    tmp: tempfile::TempDir,
    backend: Arc<MockBackend>,
    dispatcher: Dispatcher,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem::new());
    let ids = Arc::new(UuidGenerator::new());
    let backend = Arc::new(MockBackend::new());

    let dispatcher = build_dispatcher(ActionDeps {
        backend: backend.clone(),
        stemcells: Arc::new(StemcellStore::new(
            tmp.path().join("stemcells"),
            fs.clone(),
            ids.clone(),
            Arc::new(TarballCompressor::new()),
        )),
        disks: Arc::new(DiskStore::new(tmp.path().join("disks"), fs, ids.clone())),
        vm_ids: ids,
        agent: AgentOptions::default(),
    });

    Harness {
        tmp,
        backend,
        dispatcher,
    }
}

#[rstest]
#[case::snapshot_disk("snapshot_disk")]
#[case::calculate_vm_cloud_properties("calculate_vm_cloud_properties")]
#[case::wrong_case("CREATE_VM")]
#[case::empty("")]
#[tokio::test]
async fn test_unknown_method_is_unsupported(#[case] method: &str) {
    let harness = harness();

    let err = harness
        .dispatcher
        .dispatch(method, vec![json!("vm-1")])
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::UnsupportedAction(ref m) if m == method));
    assert_eq!(err.kind(), ErrorKind::NotSupported);
    assert_eq!(harness.backend.call_count(), 0);
}

#[rstest]
#[case::has_vm_none("has_vm", vec![], 1)]
#[case::has_vm_extra("has_vm", vec![json!("vm-1"), json!("vm-2")], 1)]
#[case::create_vm_short("create_vm", vec![json!("agent"), json!("sc")], 6)]
#[case::attach_disk_short("attach_disk", vec![json!("vm-1")], 2)]
#[case::info_extra("info", vec![json!({})], 0)]
#[tokio::test]
async fn test_wrong_arity_fails_before_backend(
    #[case] method: &str,
    #[case] args: Vec<Value>,
    #[case] expected: usize,
) {
    let harness = harness();
    let actual = args.len();

    let err = harness.dispatcher.dispatch(method, args).await.unwrap_err();

    match &err {
        DispatchError::ArgumentDecode { source, .. } => {
            assert_eq!(source, &ArgumentDecodeError::Arity { expected, actual });
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::NotSupported);
    assert_eq!(harness.backend.call_count(), 0);
}

#[tokio::test]
async fn test_wrong_argument_type_names_position() {
    let harness = harness();

    let err = harness
        .dispatcher
        .dispatch("attach_disk", vec![json!("vm-1"), json!(42)])
        .await
        .unwrap_err();

    match &err {
        DispatchError::ArgumentDecode {
            source: ArgumentDecodeError::Type { index, .. },
            ..
        } => assert_eq!(*index, 1),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.backend.call_count(), 0);
}

#[tokio::test]
async fn test_info() {
    let harness = harness();

    let result = harness.dispatcher.dispatch("info", vec![]).await.unwrap();

    assert_eq!(result, json!({"stemcell_formats": ["warden-tar", "general-tar"]}));
}

#[tokio::test]
async fn test_optional_vm_locality_accepts_null() {
    let harness = harness();

    let disk_id = harness
        .dispatcher
        .dispatch("create_disk", vec![json!(100), json!({}), Value::Null])
        .await
        .unwrap();

    let exists = harness
        .dispatcher
        .dispatch("has_disk", vec![disk_id])
        .await
        .unwrap();
    assert_eq!(exists, json!(true));
}

#[tokio::test]
async fn test_create_vm_accepts_null_networks_and_locality() {
    let harness = harness();
    std::fs::create_dir_all(harness.tmp.path().join("stemcells/sc-1")).unwrap();

    let vm_id = harness
        .dispatcher
        .dispatch(
            "create_vm",
            vec![
                json!("agent-1"),
                json!("sc-1"),
                json!({}),
                Value::Null,
                Value::Null,
                json!({}),
            ],
        )
        .await
        .unwrap();

    let unit = harness
        .backend
        .unit(&VmCid::new(vm_id.as_str().unwrap()))
        .unwrap();
    assert_eq!(unit.spec.network, None);

    let exists = harness
        .dispatcher
        .dispatch("has_vm", vec![vm_id])
        .await
        .unwrap();
    assert_eq!(exists, json!(true));
}

#[tokio::test]
async fn test_reboot_vm_is_registered_but_unsupported() {
    let harness = harness();

    let err = harness
        .dispatcher
        .dispatch("reboot_vm", vec![json!("vm-1")])
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Action(_)));
    assert_eq!(err.kind(), ErrorKind::NotSupported);
}
