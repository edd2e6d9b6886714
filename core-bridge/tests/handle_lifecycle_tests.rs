//! Handle lifecycle against the resource-accounting simulator
//!
//! Every foreign allocation the bridge receives must be freed exactly once,
//! whichever of explicit close and drop comes first.

use bridge_sim::{AllocKind, SimUplink};
use core_async::HostLoop;
use core_bridge::{Bridge, BridgeError, Handle, HandleKind, HostContext};
use core_runtime::BridgeConfig;
use std::sync::Arc;
use std::time::Duration;

fn sim_bridge(sim: &Arc<SimUplink>, workers: usize) -> (Bridge, HostLoop<HostContext>) {
    let config = BridgeConfig::builder().worker_threads(workers).build().unwrap();
    let (bridge, host) = Bridge::with_library(sim.clone(), &config).unwrap();
    bridge.init_error_classes(None);
    (bridge, host)
}

fn access(bridge: &Bridge, host: &mut HostLoop<HostContext>) -> Handle {
    host.block_on(bridge.parse_access(&SimUplink::grant("sat", "key")).unwrap())
        .unwrap()
        .unwrap()
}

#[test]
fn test_double_release_frees_once() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = access(&bridge, &mut host);
    assert_eq!(sim.ledger().live(AllocKind::Access), 1);

    assert!(access.close());
    assert!(!access.close());
    assert!(!bridge.release(&access));
    assert_eq!(sim.ledger().live(AllocKind::Access), 0);

    drop(access);
    assert_eq!(sim.ledger().frees(AllocKind::Access), 1);
    assert!(sim.ledger().is_balanced(), "{:?}", sim.ledger().violations());
    assert!(bridge.handles().is_empty());
}

#[test]
fn test_drop_without_close_frees() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = access(&bridge, &mut host);
    let project = host
        .block_on(bridge.open_project(&access).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(sim.ledger().live(AllocKind::Project), 1);

    drop(project);
    drop(access);

    assert!(sim.ledger().is_balanced(), "{:?}", sim.ledger().violations());
    assert_eq!(bridge.handles().releases(), 2);
}

#[test]
fn test_wrong_kind_is_rejected_synchronously() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = access(&bridge, &mut host);

    let err = bridge.stat_bucket(&access, "photos").unwrap_err();
    assert!(matches!(err, BridgeError::InvalidHandle(_)));
    assert!(err.is_type_error());
    assert_eq!(bridge.stats().submitted, 1);
    assert_eq!(sim.calls("stat_bucket"), 0);
}

#[test]
fn test_released_handle_is_rejected_synchronously() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = access(&bridge, &mut host);
    access.close();

    assert!(matches!(
        bridge.open_project(&access),
        Err(BridgeError::InvalidHandle(_))
    ));
    assert!(sim.ledger().violations().is_empty());
}

#[test]
fn test_handle_from_another_bridge_is_rejected() {
    let sim = Arc::new(SimUplink::new());
    let (first, mut host) = sim_bridge(&sim, 1);
    let (second, _other_host) = sim_bridge(&sim, 1);
    let access = access(&first, &mut host);

    assert!(matches!(
        second.open_project(&access),
        Err(BridgeError::InvalidHandle(_))
    ));
    assert!(!second.release(&access));
    assert!(!access.is_released());
}

#[test]
fn test_release_during_call_waits_for_the_call() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = access(&bridge, &mut host);
    let gate = sim.gate("access_serialize");

    let pending = bridge.access_serialize(&access).unwrap();
    assert!(gate.wait_entered(1, Duration::from_secs(5)));

    assert!(access.close());
    drop(access);
    assert_eq!(sim.ledger().live(AllocKind::Access), 1);

    gate.open();
    let serialized = host.block_on(pending).unwrap().unwrap();
    assert_eq!(serialized, SimUplink::grant("sat", "key"));

    assert!(sim.ledger().is_balanced(), "{:?}", sim.ledger().violations());
    assert!(bridge.handles().is_empty());
}

#[test]
fn test_iterator_freed_by_drop_when_never_freed_explicitly() {
    let sim = Arc::new(SimUplink::new());
    sim.seed_bucket("alpha");
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = access(&bridge, &mut host);
    let project = host
        .block_on(bridge.open_project(&access).unwrap())
        .unwrap()
        .unwrap();

    let iterator = host
        .block_on(bridge.list_buckets(&project, None).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(iterator.kind(), HandleKind::BucketIterator);
    assert_eq!(sim.ledger().live(AllocKind::BucketIterator), 1);

    drop(iterator);
    assert_eq!(sim.ledger().live(AllocKind::BucketIterator), 0);

    drop(project);
    drop(access);
    assert!(sim.ledger().is_balanced(), "{:?}", sim.ledger().violations());
}

#[test]
fn test_explicit_iterator_free_then_drop_frees_once() {
    let sim = Arc::new(SimUplink::new());
    sim.seed_bucket("alpha");
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = access(&bridge, &mut host);
    let project = host
        .block_on(bridge.open_project(&access).unwrap())
        .unwrap()
        .unwrap();
    let iterator = host
        .block_on(bridge.list_buckets(&project, None).unwrap())
        .unwrap()
        .unwrap();

    host.block_on(bridge.free_bucket_iterator(&iterator).unwrap())
        .unwrap()
        .unwrap();
    assert!(iterator.is_released());
    assert!(matches!(
        bridge.free_bucket_iterator(&iterator),
        Err(BridgeError::InvalidHandle(_))
    ));

    drop(iterator);
    assert_eq!(sim.ledger().frees(AllocKind::BucketIterator), 1);
    assert!(sim.ledger().violations().is_empty());
}
