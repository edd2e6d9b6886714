//! Typed exception projection
//!
//! Identity checks across the class table, fallbacks for unmapped codes and
//! an uninitialised registry, realm isolation, and the end-to-end path from a
//! foreign failure to a rejected future.

use bridge_sim::SimUplink;
use bridge_traits::ffi::codes;
use core_async::HostLoop;
use core_bridge::{
    Bridge, BridgeError, ErrorKind, ErrorRegistry, HostContext, Lineage, Realm,
    GENERIC_CLASS, UMBRELLA_CLASS,
};
use core_runtime::BridgeConfig;
use std::sync::Arc;

fn sim_bridge(sim: &Arc<SimUplink>) -> (Bridge, HostLoop<HostContext>) {
    let config = BridgeConfig::builder().worker_threads(2).build().unwrap();
    Bridge::with_library(sim.clone(), &config).unwrap()
}

#[test]
fn test_every_code_is_its_own_class_and_nothing_else() {
    let registry = ErrorRegistry::new();
    let classes = registry.initialize(None);

    for kind in ErrorKind::ALL {
        let exception = registry.create_typed_exception(kind.code(), "details");

        assert!(exception.is_a(&classes.umbrella()), "{} is not a StorjError", kind);
        assert!(exception.is_a(&classes.of(kind)), "{} is not its own class", kind);
        for sibling in ErrorKind::ALL.iter().copied().filter(|k| *k != kind) {
            assert!(
                !exception.is_a(&classes.of(sibling)),
                "{} is also a {}",
                kind,
                sibling
            );
        }
        assert_eq!(exception.code(), kind.code());
        assert_eq!(exception.details(), Some("details"));
        assert_eq!(exception.name(), kind.class_name());
    }
}

#[test]
fn test_unmapped_code_falls_back_to_umbrella() {
    let registry = ErrorRegistry::new();
    let classes = registry.initialize(None);

    let exception = registry.create_typed_exception(0x7f, "something new");

    assert_eq!(exception.code(), 0x7f);
    assert_eq!(exception.message(), "something new");
    assert_eq!(exception.name(), UMBRELLA_CLASS);
    assert_eq!(exception.kind(), None);
    assert!(exception.is_a(&classes.umbrella()));
    assert!(!exception.is_a(&classes.of(ErrorKind::Internal)));
}

#[test]
fn test_uninitialised_registry_yields_generic_exception() {
    let registry = ErrorRegistry::new();
    let later = ErrorRegistry::new().initialize(None);

    let exception = registry.create_typed_exception(codes::BUCKET_NOT_FOUND, "");

    assert_eq!(exception.lineage(), Lineage::Generic);
    assert_eq!(exception.name(), GENERIC_CLASS);
    assert_eq!(exception.code(), codes::BUCKET_NOT_FOUND);
    assert_eq!(exception.message(), "Unknown error");
    assert!(!exception.is_a(&later.umbrella()));
}

#[test]
fn test_classes_from_another_realm_do_not_match() {
    let registry = ErrorRegistry::new();
    let global = registry.initialize(None);
    let from_global = registry.create_typed_exception(codes::OBJECT_NOT_FOUND, "gone");

    let sandbox = Realm::isolated();
    let isolated = registry.initialize(Some(sandbox));
    let from_sandbox = registry.create_typed_exception(codes::OBJECT_NOT_FOUND, "gone");

    assert!(global.realm().is_global());
    assert_eq!(isolated.realm(), sandbox);
    assert!(from_sandbox.is_a(&isolated.of(ErrorKind::ObjectNotFound)));
    assert!(!from_sandbox.is_a(&global.of(ErrorKind::ObjectNotFound)));
    assert!(!from_global.is_a(&isolated.umbrella()));
}

#[test]
fn test_reset_returns_to_generic_projection() {
    let registry = ErrorRegistry::new();
    registry.initialize(None);
    assert!(registry.is_initialized());

    registry.reset();
    assert!(!registry.is_initialized());
    assert_eq!(
        registry.create_typed_exception(codes::INTERNAL, "x").lineage(),
        Lineage::Generic
    );
}

#[test]
fn test_bucket_not_found_rejects_with_typed_exception() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim);
    let classes = bridge.init_error_classes(None);

    let access = host
        .block_on(bridge.parse_access(&SimUplink::grant("sat", "key")).unwrap())
        .unwrap()
        .unwrap();
    let project = host
        .block_on(bridge.open_project(&access).unwrap())
        .unwrap()
        .unwrap();

    sim.fail_next("stat_bucket", codes::BUCKET_NOT_FOUND, "bucket not found");
    let err = host
        .block_on(bridge.stat_bucket(&project, "photos").unwrap())
        .unwrap()
        .unwrap_err();

    let exception = err.exception().expect("typed exception");
    assert!(exception.is_a(&classes.of(ErrorKind::BucketNotFound)));
    assert!(exception.is_a(&classes.umbrella()));
    assert!(!exception.is_a(&classes.of(ErrorKind::BucketNotEmpty)));
    assert_eq!(err.code(), Some(0x13));
    assert!(exception.message().contains("bucket not found"));
    assert_eq!(bridge.stats().failed, 1);
}

#[test]
fn test_foreign_failure_before_initialisation_is_generic() {
    let sim = Arc::new(SimUplink::new());
    let (bridge, mut host) = sim_bridge(&sim);

    let err = host
        .block_on(bridge.parse_access("not a grant").unwrap())
        .unwrap()
        .unwrap_err();

    match err {
        BridgeError::Exception(exception) => {
            assert_eq!(exception.lineage(), Lineage::Generic);
            assert_eq!(exception.code(), codes::INTERNAL);
            assert!(exception.message().contains("invalid access grant"));
        }
        other => panic!("expected an exception, got {other:?}"),
    }
    drop(bridge);
    assert!(sim.ledger().is_balanced());
}

#[test]
fn test_exception_serializes_with_properties() {
    let registry = ErrorRegistry::new();
    registry.initialize(None);
    let exception = registry
        .create_typed_exception(codes::PERMISSION_DENIED, "no")
        .with_property("bytesRead", 12);

    let json = serde_json::to_value(&exception).unwrap();
    assert_eq!(json["name"], ErrorKind::PermissionDenied.class_name());
    assert_eq!(json["code"], codes::PERMISSION_DENIED);
    assert_eq!(json["details"], "no");
    assert_eq!(json["bytesRead"], 12);
}
