//! Work bridge scheduling
//!
//! Completion runs once per task, cancellation only wins before the foreign
//! call starts, and a bridge without a library fails fast.

use bridge_native::{LibraryLoader, LibraryOpener, LoadError};
use bridge_sim::{AllocKind, SimUplink};
use bridge_traits::ffi::codes;
use bridge_traits::ForeignLibrary;
use core_async::HostLoop;
use core_bridge::{Bridge, BridgeError, HostContext, WorkStatsSnapshot};
use core_runtime::BridgeConfig;
use futures::future;
use mockall::mock;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mock! {
    Opener {}

    impl LibraryOpener for Opener {
        fn open(&self, path: &Path) -> bridge_native::Result<Arc<dyn ForeignLibrary>>;
    }
}

fn sim_bridge(sim: &Arc<SimUplink>, workers: usize) -> (Bridge, HostLoop<HostContext>) {
    let config = BridgeConfig::builder().worker_threads(workers).build().unwrap();
    let (bridge, host) = Bridge::with_library(sim.clone(), &config).unwrap();
    bridge.init_error_classes(None);
    (bridge, host)
}

fn grant() -> String {
    SimUplink::grant("sat", "key")
}

#[test]
fn test_each_task_completes_exactly_once() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 2);

    let access = host.block_on(bridge.parse_access(&grant()).unwrap()).unwrap().unwrap();
    let serialized = host
        .block_on(bridge.access_serialize(&access).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(serialized, grant());

    // Nothing else is queued for the host.
    assert_eq!(host.run_until_idle(), 0);
    assert_eq!(
        bridge.stats(),
        WorkStatsSnapshot {
            submitted: 2,
            executed: 2,
            completed: 2,
            cancelled: 0,
            failed: 0,
        }
    );
}

#[test]
fn test_task_ids_are_distinct() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 2);

    let first = bridge.parse_access(&grant()).unwrap();
    let second = bridge.parse_access(&grant()).unwrap();
    assert_ne!(first.task_id(), second.task_id());

    let (a, b) = host.block_on(future::join(first, second)).unwrap();
    assert!(a.is_ok() && b.is_ok());
}

#[test]
fn test_cancel_before_execute_skips_the_foreign_call() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let gate = sim.gate("parse_access");

    let running = bridge.parse_access(&grant()).unwrap();
    assert!(gate.wait_entered(1, Duration::from_secs(5)));
    let queued = bridge.parse_access(&grant()).unwrap();

    assert!(queued.cancel());
    assert!(!queued.cancel());
    assert!(!running.cancel());
    gate.open();

    let access = host.block_on(running).unwrap().unwrap();
    let cancelled = host.block_on(queued).unwrap();
    assert!(matches!(cancelled, Err(BridgeError::Cancelled)));
    assert!(cancelled.unwrap_err().is_cancelled());

    assert_eq!(sim.calls("parse_access"), 1);
    let stats = bridge.stats();
    assert_eq!((stats.submitted, stats.executed), (2, 1));
    assert_eq!((stats.cancelled, stats.completed), (1, 2));

    drop(access);
    assert!(sim.ledger().is_balanced(), "{:?}", sim.ledger().violations());
}

#[test]
fn test_cancelled_iterator_free_still_frees() {
    let sim = Arc::new(SimUplink::new());
    sim.seed_bucket("alpha");
    let (bridge, mut host) = sim_bridge(&sim, 1);
    let access = host.block_on(bridge.parse_access(&grant()).unwrap()).unwrap().unwrap();
    let project = host
        .block_on(bridge.open_project(&access).unwrap())
        .unwrap()
        .unwrap();
    let iterator = host
        .block_on(bridge.list_buckets(&project, None).unwrap())
        .unwrap()
        .unwrap();

    let gate = sim.gate("access_serialize");
    let blocker = bridge.access_serialize(&access).unwrap();
    assert!(gate.wait_entered(1, Duration::from_secs(5)));

    let free = bridge.free_bucket_iterator(&iterator).unwrap();
    assert!(iterator.is_released());
    assert!(free.cancel());
    assert_eq!(sim.ledger().frees(AllocKind::BucketIterator), 1);

    gate.open();
    host.block_on(blocker).unwrap().unwrap();
    assert!(host.block_on(free).unwrap().unwrap_err().is_cancelled());
    assert_eq!(sim.calls("free_bucket_iterator"), 1);

    drop((iterator, project, access));
    assert!(sim.ledger().is_balanced(), "{:?}", sim.ledger().violations());
}

#[test]
fn test_independent_tasks_settle_independently() {
    let sim = Arc::new(SimUplink::new());
    sim.seed_bucket("alpha");
    let (bridge, mut host) = sim_bridge(&sim, 2);
    let access = host.block_on(bridge.parse_access(&grant()).unwrap()).unwrap().unwrap();
    let project = host
        .block_on(bridge.open_project(&access).unwrap())
        .unwrap()
        .unwrap();

    sim.fail_next("create_bucket", codes::BUCKET_ALREADY_EXISTS, "bucket already exists");
    let failing = bridge.create_bucket(&project, "alpha").unwrap();
    let passing = bridge.stat_bucket(&project, "alpha").unwrap();

    let (failed, passed) = host.block_on(future::join(failing, passing)).unwrap();
    assert_eq!(failed.unwrap_err().code(), Some(codes::BUCKET_ALREADY_EXISTS));
    assert_eq!(passed.unwrap().name, "alpha");

    let stats = bridge.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, stats.submitted);
}

#[test]
fn test_missing_library_fails_every_operation() {
    let mut opener = MockOpener::new();
    opener.expect_open().returning(|path| {
        Err(LoadError::Open {
            path: path.to_path_buf(),
            reason: "cannot open shared object file".to_string(),
        })
    });
    let loader = LibraryLoader::with_opener(Some("/nonexistent/libuplink.so".into()), opener);
    let config = BridgeConfig::default();

    let (bridge, _host) = Bridge::from_loader(&loader, &config).unwrap();

    assert!(!bridge.is_available());
    assert!(bridge
        .unavailable_reason()
        .is_some_and(|reason| reason.contains("libuplink not found")));
    assert!(matches!(
        bridge.parse_access(&grant()),
        Err(BridgeError::LibraryUnavailable(_))
    ));
    assert_eq!(bridge.stats(), WorkStatsSnapshot::default());
}

#[test]
fn test_loaded_library_backs_the_bridge() {
    let sim = Arc::new(SimUplink::with_label("loaded"));
    let library: Arc<dyn ForeignLibrary> = sim.clone();
    let mut opener = MockOpener::new();
    opener
        .expect_open()
        .times(1)
        .returning(move |_| Ok(Arc::clone(&library)));
    let loader = LibraryLoader::with_opener(Some("/opt/libuplink.so".into()), opener);

    let (bridge, mut host) = Bridge::from_loader(&loader, &BridgeConfig::default()).unwrap();

    assert!(bridge.is_available());
    assert!(bridge.describe().contains("loaded"));
    let access = host.block_on(bridge.parse_access(&grant()).unwrap()).unwrap();
    assert!(access.is_ok());
}

#[test]
fn test_dropped_host_loop_rejects_new_work() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, host) = sim_bridge(&sim, 1);
    drop(host);

    assert!(matches!(
        bridge.parse_access(&grant()),
        Err(BridgeError::Shutdown)
    ));
    assert_eq!(sim.calls("parse_access"), 0);
}
