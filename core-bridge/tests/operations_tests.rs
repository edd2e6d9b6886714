//! Domain operations end to end against the simulator
//!
//! Each scenario walks a real call sequence and finishes by checking that
//! every foreign allocation was returned.

use bridge_sim::{AllocKind, SimUplink};
use bridge_traits::ffi::codes;
use chrono::{Duration as ChronoDuration, Utc};
use core_async::HostLoop;
use core_bridge::{
    Bridge, BridgeError, CustomMetadata, DownloadOptions, EdgeConfig, ErrorKind, Handle,
    HostContext, ListObjectsOptions, ListUploadsOptions, Permission, ProjectConfig, SharePrefix,
    ShareUrlOptions, BYTES_READ_PROPERTY,
};
use core_runtime::BridgeConfig;
use std::sync::Arc;
use std::time::Duration;

struct Session {
    sim: Arc<SimUplink>,
    bridge: Bridge,
    host: HostLoop<HostContext>,
    access: Option<Handle>,
    project: Option<Handle>,
}

impl Session {
    fn open(sim: SimUplink) -> Self {
        let sim = Arc::new(sim);
        let config = BridgeConfig::builder().worker_threads(2).build().unwrap();
        let (bridge, mut host) = Bridge::with_library(sim.clone(), &config).unwrap();
        bridge.init_error_classes(None);
        let access = host
            .block_on(bridge.parse_access(&SimUplink::grant("sat.example:7777", "key")).unwrap())
            .unwrap()
            .unwrap();
        let project = host
            .block_on(bridge.open_project(&access).unwrap())
            .unwrap()
            .unwrap();
        Self {
            sim,
            bridge,
            host,
            access: Some(access),
            project: Some(project),
        }
    }

    fn project(&self) -> &Handle {
        self.project.as_ref().unwrap()
    }

    fn access(&self) -> &Handle {
        self.access.as_ref().unwrap()
    }

    fn run<T>(&mut self, pending: core_bridge::Result<core_bridge::PendingFuture<T>>) -> core_bridge::Result<T> {
        self.host.block_on(pending.unwrap()).unwrap()
    }

    /// Drops the session handles and asserts nothing leaked.
    fn finish(mut self) {
        self.project.take();
        self.access.take();
        let ledger = self.sim.ledger();
        assert!(ledger.is_balanced(), "live: {}, violations: {:?}", ledger.total_live(), ledger.violations());
    }
}

#[test]
fn test_access_round_trip() {
    let mut session = Session::open(SimUplink::new());

    let serialized = session.run(session.bridge.access_serialize(session.access())).unwrap();
    assert_eq!(serialized, SimUplink::grant("sat.example:7777", "key"));

    let address = session
        .run(session.bridge.access_satellite_address(session.access()))
        .unwrap();
    assert_eq!(address, "sat.example:7777");

    let derived = session
        .run(session.bridge.request_access_with_passphrase("sat.example:7777", "key", "secret"))
        .unwrap();
    let reserialized = session.run(session.bridge.access_serialize(&derived)).unwrap();
    assert_eq!(reserialized, serialized);
    drop(derived);

    session.finish();
}

#[test]
fn test_interior_nul_is_rejected_synchronously() {
    let session = Session::open(SimUplink::new());

    let err = session.bridge.stat_bucket(session.project(), "pho\0tos").unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));
    assert_eq!(session.sim.calls("stat_bucket"), 0);

    session.finish();
}

#[test]
fn test_bucket_lifecycle() {
    let mut session = Session::open(SimUplink::new());
    let project = session.project.take().unwrap();

    let created = session.run(session.bridge.create_bucket(&project, "photos")).unwrap();
    assert_eq!(created.name, "photos");
    assert!(created.created.is_some());

    let ensured = session.run(session.bridge.ensure_bucket(&project, "photos")).unwrap();
    assert_eq!(ensured.name, "photos");

    let err = session
        .run(session.bridge.create_bucket(&project, "photos"))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::BucketAlreadyExists));

    let deleted = session.run(session.bridge.delete_bucket(&project, "photos")).unwrap();
    assert_eq!(deleted.name, "photos");
    assert!(!session.sim.has_bucket("photos"));

    let err = session.run(session.bridge.stat_bucket(&project, "photos")).unwrap_err();
    assert_eq!(err.code(), Some(codes::BUCKET_NOT_FOUND));

    session.project = Some(project);
    session.finish();
}

#[test]
fn test_delete_bucket_with_objects() {
    let sim = SimUplink::new();
    sim.seed_object("logs", "2024/01.txt", b"jan", &[]);
    let mut session = Session::open(sim);

    let err = session
        .run(session.bridge.delete_bucket(session.project(), "logs"))
        .unwrap_err();
    assert_eq!(err.code(), Some(codes::BUCKET_NOT_EMPTY));

    let deleted = session
        .run(session.bridge.delete_bucket_with_objects(session.project(), "logs"))
        .unwrap();
    assert_eq!(deleted.name, "logs");
    assert!(!session.sim.has_bucket("logs"));

    session.finish();
}

#[test]
fn test_bucket_listing_walk() {
    let sim = SimUplink::new();
    for name in ["charlie", "alpha", "bravo"] {
        sim.seed_bucket(name);
    }
    let mut session = Session::open(sim);

    let iterator = session.run(session.bridge.list_buckets(session.project(), None)).unwrap();
    let mut names = Vec::new();
    while session.run(session.bridge.bucket_iterator_next(&iterator)).unwrap() {
        let bucket = session.run(session.bridge.bucket_iterator_item(&iterator)).unwrap();
        names.push(bucket.name);
    }
    assert_eq!(names, ["alpha", "bravo", "charlie"]);

    let failure = session.run(session.bridge.bucket_iterator_err(&iterator)).unwrap();
    assert!(failure.is_none());
    session.run(session.bridge.free_bucket_iterator(&iterator)).unwrap();
    assert!(iterator.is_released());

    let after = session
        .run(session.bridge.list_buckets(session.project(), Some("alpha")))
        .unwrap();
    assert!(session.run(session.bridge.bucket_iterator_next(&after)).unwrap());
    let first = session.run(session.bridge.bucket_iterator_item(&after)).unwrap();
    assert_eq!(first.name, "bravo");
    drop(after);

    drop(iterator);
    session.finish();
}

#[test]
fn test_listing_failure_resolves_through_iterator_err() {
    let mut session = Session::open(SimUplink::new());

    let iterator = session
        .run(session.bridge.list_objects(session.project(), "missing", ListObjectsOptions::new()))
        .unwrap();
    assert!(!session.run(session.bridge.object_iterator_next(&iterator)).unwrap());

    let failure = session
        .run(session.bridge.object_iterator_err(&iterator))
        .unwrap()
        .expect("listing failure");
    assert_eq!(failure.kind(), Some(ErrorKind::BucketNotFound));
    assert!(failure.message().contains("missing"));

    drop(iterator);
    session.finish();
}

#[test]
fn test_object_listing_collapses_prefixes() {
    let sim = SimUplink::new();
    sim.seed_object("docs", "readme.md", b"# hi", &[(&b"lang"[..], &b"en"[..])]);
    sim.seed_object("docs", "guide/intro.md", b"intro", &[]);
    sim.seed_object("docs", "guide/usage.md", b"usage", &[]);
    let mut session = Session::open(sim);

    let options = ListObjectsOptions::new().with_system(true).with_custom(true);
    let iterator = session
        .run(session.bridge.list_objects(session.project(), "docs", options))
        .unwrap();
    let mut entries = Vec::new();
    while session.run(session.bridge.object_iterator_next(&iterator)).unwrap() {
        entries.push(session.run(session.bridge.object_iterator_item(&iterator)).unwrap());
    }
    session.run(session.bridge.free_object_iterator(&iterator)).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, "guide/");
    assert!(entries[0].is_prefix);
    assert_eq!(entries[1].key, "readme.md");
    assert!(!entries[1].is_prefix);
    assert_eq!(entries[1].system.content_length, 4);
    assert_eq!(entries[1].custom.get_str("lang"), Some("en"));

    let recursive = session
        .run(session.bridge.list_objects(
            session.project(),
            "docs",
            ListObjectsOptions::new().with_prefix("guide/").recursive(true),
        ))
        .unwrap();
    let mut keys = Vec::new();
    while session.run(session.bridge.object_iterator_next(&recursive)).unwrap() {
        keys.push(session.run(session.bridge.object_iterator_item(&recursive)).unwrap().key);
    }
    assert_eq!(keys, ["guide/intro.md", "guide/usage.md"]);
    drop(recursive);

    drop(iterator);
    session.finish();
}

#[test]
fn test_upload_then_download() {
    let sim = SimUplink::new();
    sim.seed_bucket("media");
    let mut session = Session::open(sim);
    let payload = b"hello, uplink".to_vec();
    let expires = Utc::now() + ChronoDuration::days(1);

    let upload = session
        .run(session.bridge.upload_object(session.project(), "media", "greeting.txt", Some(expires)))
        .unwrap();
    let written = session.run(session.bridge.upload_write(&upload, &payload[..5])).unwrap();
    assert_eq!(written, 5);
    let written = session.run(session.bridge.upload_write(&upload, &payload[5..])).unwrap();
    assert_eq!(written, payload.len() - 5);

    let pending = session.run(session.bridge.upload_info(&upload)).unwrap();
    assert_eq!(pending.key, "greeting.txt");

    session.run(session.bridge.upload_commit(&upload)).unwrap();
    let err = session.run(session.bridge.upload_commit(&upload)).unwrap_err();
    assert_eq!(err.code(), Some(codes::UPLOAD_DONE));
    drop(upload);
    assert_eq!(session.sim.object_data("media", "greeting.txt"), Some(payload.clone()));

    let download = session
        .run(session.bridge.download_object(
            session.project(),
            "media",
            "greeting.txt",
            DownloadOptions::default(),
        ))
        .unwrap();
    let info = session.run(session.bridge.download_info(&download)).unwrap();
    assert_eq!(info.system.content_length, payload.len() as i64);
    assert_eq!(info.system.expires.map(|t| t.timestamp()), Some(expires.timestamp()));

    let first = session.run(session.bridge.download_read(&download, 5)).unwrap();
    assert_eq!(&first[..], b"hello");

    // A short read at the end of the stream still rejects, with the tail attached.
    let err = session.run(session.bridge.download_read(&download, 64)).unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.code(), codes::EOF);
    assert_eq!(exception.property(BYTES_READ_PROPERTY), Some(&serde_json::json!(8)));
    assert_eq!(exception.partial_data().map(|data| &data[..]), Some(&b", uplink"[..]));

    session.run(session.bridge.close_download(&download)).unwrap();
    drop(download);
    session.finish();
}

#[test]
fn test_ranged_download() {
    let sim = SimUplink::new();
    sim.seed_object("media", "digits", b"0123456789", &[]);
    let mut session = Session::open(sim);

    let download = session
        .run(session.bridge.download_object(
            session.project(),
            "media",
            "digits",
            DownloadOptions::range(3, 4),
        ))
        .unwrap();
    let err = session.run(session.bridge.download_read(&download, 16)).unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.code(), codes::EOF);
    assert_eq!(exception.property(BYTES_READ_PROPERTY), Some(&serde_json::json!(4)));
    assert_eq!(exception.partial_data().map(|data| &data[..]), Some(&b"3456"[..]));

    assert!(matches!(
        session.bridge.download_object(session.project(), "media", "digits", DownloadOptions::range(-1, 4)),
        Err(BridgeError::InvalidArgument(_))
    ));

    drop(download);
    session.finish();
}

#[test]
fn test_failed_read_reports_bytes_read() {
    let sim = SimUplink::new();
    sim.seed_object("media", "clip", b"abcdefgh", &[]);
    let mut session = Session::open(sim);
    let download = session
        .run(session.bridge.download_object(session.project(), "media", "clip", DownloadOptions::default()))
        .unwrap();

    session.sim.fail_next("download_read", codes::INTERNAL, "connection reset");
    let err = session.run(session.bridge.download_read(&download, 3)).unwrap_err();

    let exception = err.exception().unwrap();
    assert_eq!(exception.kind(), Some(ErrorKind::Internal));
    assert_eq!(exception.property(BYTES_READ_PROPERTY), Some(&serde_json::json!(3)));
    assert_eq!(exception.partial_data().map(|data| &data[..]), Some(&b"abc"[..]));

    drop(download);
    session.finish();
}

#[test]
fn test_aborted_upload_stores_nothing() {
    let sim = SimUplink::new();
    sim.seed_bucket("media");
    let mut session = Session::open(sim);

    let upload = session
        .run(session.bridge.upload_object(session.project(), "media", "draft", None))
        .unwrap();
    session.run(session.bridge.upload_write(&upload, b"partial")).unwrap();
    session.run(session.bridge.upload_abort(&upload)).unwrap();
    drop(upload);

    assert_eq!(session.sim.object_data("media", "draft"), None);
    let stat = session
        .run(session.bridge.stat_object(session.project(), "media", "draft"))
        .unwrap_err();
    assert_eq!(stat.code(), Some(codes::OBJECT_NOT_FOUND));

    session.finish();
}

#[test]
fn test_binary_metadata_survives_the_boundary() {
    let sim = SimUplink::new();
    sim.seed_bucket("media");
    let mut session = Session::open(sim);
    let metadata = CustomMetadata::new()
        .with("content-type", "image/png")
        .with(b"raw\0key".to_vec(), vec![0xffu8, 0x00, 0xfe]);

    let upload = session
        .run(session.bridge.upload_object(session.project(), "media", "pixel.png", None))
        .unwrap();
    session.run(session.bridge.upload_write(&upload, &[0x89, b'P', b'N', b'G'])).unwrap();
    session
        .run(session.bridge.upload_set_custom_metadata(&upload, metadata.clone()))
        .unwrap();
    session.run(session.bridge.upload_commit(&upload)).unwrap();
    drop(upload);

    let info = session
        .run(session.bridge.stat_object(session.project(), "media", "pixel.png"))
        .unwrap()
        .expect("object info");
    assert_eq!(info.custom, metadata);
    assert_eq!(info.custom.get(b"raw\0key"), Some(&[0xff, 0x00, 0xfe][..]));

    let replaced = CustomMetadata::new().with("content-type", "image/webp");
    session
        .run(session.bridge.update_object_metadata(
            session.project(),
            "media",
            "pixel.png",
            replaced.clone(),
        ))
        .unwrap();
    let stored = session.sim.object_metadata("media", "pixel.png").unwrap();
    assert_eq!(stored, vec![(b"content-type".to_vec(), b"image/webp".to_vec())]);

    let deleted = session
        .run(session.bridge.delete_object(session.project(), "media", "pixel.png"))
        .unwrap()
        .expect("deleted object info");
    assert_eq!(deleted.custom, replaced);

    session.finish();
}

#[test]
fn test_project_settings_pass_through() {
    let sim = SimUplink::new();
    let sim = Arc::new(sim);
    let config = BridgeConfig::builder()
        .worker_threads(1)
        .user_agent("uplink-bridge-tests/1.0")
        .dial_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let (bridge, mut host) = Bridge::with_library(sim.clone(), &config).unwrap();
    let access = host
        .block_on(bridge.parse_access(&SimUplink::grant("sat", "key")).unwrap())
        .unwrap()
        .unwrap();

    let overrides = ProjectConfig::new().with_temp_directory("/tmp/uplink");
    let project = host
        .block_on(bridge.config_open_project(&overrides, &access).unwrap())
        .unwrap()
        .unwrap();

    let settings = sim.last_project_settings().expect("settings recorded");
    assert_eq!(settings.user_agent.as_deref(), Some("uplink-bridge-tests/1.0"));
    assert_eq!(settings.dial_timeout_milliseconds, 5_000);
    assert_eq!(settings.temp_directory.as_deref(), Some("/tmp/uplink"));

    host.block_on(bridge.close_project(&project).unwrap())
        .unwrap()
        .unwrap();
    drop(project);
    drop(access);
    assert_eq!(sim.ledger().live(AllocKind::Project), 0);
    assert!(sim.ledger().is_balanced(), "{:?}", sim.ledger().violations());
}

#[test]
fn test_oversized_dial_timeout_is_rejected() {
    let session = Session::open(SimUplink::new());
    let overrides = ProjectConfig::new().with_dial_timeout(Duration::from_secs(u64::from(u32::MAX)));

    let err = session
        .bridge
        .config_open_project(&overrides, session.access())
        .unwrap_err();
    assert!(err.is_type_error());
    assert_eq!(session.sim.calls("config_open_project"), 0);

    session.finish();
}

#[test]
fn test_config_request_access_records_dial_settings() {
    let mut session = Session::open(SimUplink::new());
    let overrides = ProjectConfig::new().with_user_agent("backup-agent/2.1");

    let access = session
        .run(session.bridge.config_request_access_with_passphrase(
            &overrides,
            "sat.example:7777",
            "key",
            "secret",
        ))
        .unwrap();
    let settings = session.sim.last_access_settings().expect("settings recorded");
    assert_eq!(settings.user_agent.as_deref(), Some("backup-agent/2.1"));

    let err = session
        .run(session.bridge.config_request_access_with_passphrase(&overrides, "sat.example:7777", "key", ""))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::Internal));

    drop(access);
    session.finish();
}

#[test]
fn test_shared_access_can_be_revoked() {
    let mut session = Session::open(SimUplink::new());

    let shared = session
        .run(session.bridge.access_share(
            session.access(),
            Permission::read_only(),
            &[SharePrefix::bucket("media").with_prefix("photos/"), SharePrefix::bucket("docs")],
        ))
        .unwrap();
    let grant = session.run(session.bridge.access_serialize(&shared)).unwrap();
    assert_eq!(
        grant,
        format!("{}+dl[media/photos/,docs/]", SimUplink::grant("sat.example:7777", "key"))
    );

    let project = session.run(session.bridge.open_project(&shared)).unwrap();
    drop(project);

    session.run(session.bridge.revoke_access(session.project(), &shared)).unwrap();
    let err = session.run(session.bridge.open_project(&shared)).unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::PermissionDenied));

    // The parent grant is untouched.
    let project = session.run(session.bridge.open_project(session.access())).unwrap();
    drop(project);

    let err = session
        .run(session.bridge.access_share(session.access(), Permission::default(), &[]))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::Internal));
    assert!(err.exception().unwrap().message().contains("permission is empty"));

    drop(shared);
    session.finish();
}

#[test]
fn test_derived_key_overrides_bucket_encryption() {
    let mut session = Session::open(SimUplink::new());

    let key = session
        .run(session.bridge.derive_encryption_key("correct horse", b"salt"))
        .unwrap();
    assert_eq!(session.sim.ledger().live(AllocKind::EncryptionKey), 1);
    session
        .run(session.bridge.access_override_encryption_key(session.access(), "media", "photos/", &key))
        .unwrap();

    let err = session
        .run(session.bridge.access_override_encryption_key(session.access(), "", "", &key))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::Internal));

    let err = session.run(session.bridge.derive_encryption_key("", b"salt")).unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::Internal));

    // An access handle is not a key.
    let err = session
        .bridge
        .access_override_encryption_key(session.access(), "media", "", session.access())
        .unwrap_err();
    assert!(err.is_type_error());

    drop(key);
    session.finish();
}

#[test]
fn test_copy_keeps_source_and_move_removes_it() {
    let sim = SimUplink::new();
    sim.seed_object("media", "a.txt", b"alpha", &[(&b"lang"[..], &b"en"[..])]);
    sim.seed_bucket("archive");
    let mut session = Session::open(sim);

    let copied = session
        .run(session.bridge.copy_object(session.project(), "media", "a.txt", "archive", "a-copy.txt"))
        .unwrap();
    assert_eq!(copied.key, "a-copy.txt");
    assert_eq!(copied.custom.get_str("lang"), Some("en"));
    assert_eq!(session.sim.object_data("media", "a.txt"), Some(b"alpha".to_vec()));
    assert_eq!(session.sim.object_data("archive", "a-copy.txt"), Some(b"alpha".to_vec()));

    session
        .run(session.bridge.move_object(session.project(), "media", "a.txt", "media", "b.txt"))
        .unwrap();
    assert_eq!(session.sim.object_data("media", "a.txt"), None);
    assert_eq!(session.sim.object_data("media", "b.txt"), Some(b"alpha".to_vec()));

    let err = session
        .run(session.bridge.move_object(session.project(), "media", "a.txt", "media", "c.txt"))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::ObjectNotFound));

    let err = session
        .run(session.bridge.copy_object(session.project(), "media", "b.txt", "missing", "b.txt"))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::BucketNotFound));

    session.finish();
}

#[test]
fn test_multipart_upload_walk() {
    let sim = SimUplink::new();
    sim.seed_bucket("media");
    let mut session = Session::open(sim);
    let project = session.project.take().unwrap();

    let upload = session
        .run(session.bridge.begin_upload(&project, "media", "video.mp4", None))
        .unwrap();
    assert_eq!(upload.key, "video.mp4");
    assert!(!upload.upload_id.is_empty());
    let other = session
        .run(session.bridge.begin_upload(&project, "media", "audio.ogg", None))
        .unwrap();

    // Parts arrive out of order; the object joins them by number.
    for (number, data, etag) in [(2, &b"-world"[..], "etag-2"), (1, &b"hello"[..], "etag-1")] {
        let part = session
            .run(session.bridge.upload_part(&project, "media", "video.mp4", &upload.upload_id, number))
            .unwrap();
        let written = session.run(session.bridge.part_upload_write(&part, data)).unwrap();
        assert_eq!(written, data.len());
        session.run(session.bridge.part_upload_set_etag(&part, etag)).unwrap();
        let info = session.run(session.bridge.part_upload_info(&part)).unwrap();
        assert_eq!((info.part_number, info.size, info.etag.as_str()), (number, data.len(), etag));
        session.run(session.bridge.part_upload_commit(&part)).unwrap();

        let err = session.run(session.bridge.part_upload_write(&part, b"late")).unwrap_err();
        assert_eq!(err.code(), Some(codes::UPLOAD_DONE));
    }

    let abandoned = session
        .run(session.bridge.upload_part(&project, "media", "video.mp4", &upload.upload_id, 3))
        .unwrap();
    session.run(session.bridge.part_upload_write(&abandoned, b"junk")).unwrap();
    session.run(session.bridge.part_upload_abort(&abandoned)).unwrap();
    drop(abandoned);
    assert_eq!(session.sim.ledger().live(AllocKind::PartUpload), 0);

    let parts = session
        .run(session.bridge.list_upload_parts(&project, "media", "video.mp4", &upload.upload_id, 0))
        .unwrap();
    let mut listed = Vec::new();
    while session.run(session.bridge.part_iterator_next(&parts)).unwrap() {
        let part = session.run(session.bridge.part_iterator_item(&parts)).unwrap();
        listed.push((part.part_number, part.etag));
    }
    assert!(session.run(session.bridge.part_iterator_err(&parts)).unwrap().is_none());
    session.run(session.bridge.free_part_iterator(&parts)).unwrap();
    assert!(parts.is_released());
    assert_eq!(listed, [(1, "etag-1".to_string()), (2, "etag-2".to_string())]);

    let uploads = session
        .run(session.bridge.list_uploads(&project, "media", ListUploadsOptions::new()))
        .unwrap();
    let mut pending = Vec::new();
    while session.run(session.bridge.upload_iterator_next(&uploads)).unwrap() {
        pending.push(session.run(session.bridge.upload_iterator_item(&uploads)).unwrap().key);
    }
    session.run(session.bridge.free_upload_iterator(&uploads)).unwrap();
    assert_eq!(pending, ["audio.ogg", "video.mp4"]);

    let committed = session
        .run(session.bridge.commit_upload(
            &project,
            "media",
            "video.mp4",
            &upload.upload_id,
            CustomMetadata::new().with("codec", "h264"),
        ))
        .unwrap();
    assert_eq!(committed.key, "video.mp4");
    assert_eq!(committed.custom.get_str("codec"), Some("h264"));
    assert_eq!(session.sim.object_data("media", "video.mp4"), Some(b"hello-world".to_vec()));

    session
        .run(session.bridge.abort_upload(&project, "media", "audio.ogg", &other.upload_id))
        .unwrap();
    assert_eq!(session.sim.pending_uploads(), 0);

    let err = session
        .run(session.bridge.upload_part(&project, "media", "video.mp4", &upload.upload_id, 4))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::Internal));

    drop(uploads);
    drop(parts);
    drop(project);
    session.finish();
}

#[test]
fn test_part_listing_failure_resolves_through_iterator_err() {
    let sim = SimUplink::new();
    sim.seed_bucket("media");
    let mut session = Session::open(sim);

    let parts = session
        .run(session.bridge.list_upload_parts(session.project(), "media", "clip", "upload-999999", 0))
        .unwrap();
    assert!(!session.run(session.bridge.part_iterator_next(&parts)).unwrap());
    let failure = session
        .run(session.bridge.part_iterator_err(&parts))
        .unwrap()
        .expect("listing failure");
    assert_eq!(failure.kind(), Some(ErrorKind::Internal));

    drop(parts);
    session.finish();
}

#[test]
fn test_edge_registration_and_share_url() {
    let mut session = Session::open(SimUplink::new());

    let err = session
        .run(session.bridge.edge_register_access(
            &EdgeConfig::new("auth.elsewhere:7777"),
            session.access(),
            true,
        ))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::EdgeAuthDialFailed));

    let config = EdgeConfig::new(SimUplink::AUTH_SERVICE);
    let credentials = session
        .run(session.bridge.edge_register_access(&config, session.access(), true))
        .unwrap();
    assert_eq!(credentials.endpoint, SimUplink::GATEWAY);
    assert!(!credentials.access_key_id.is_empty());
    assert!(!format!("{:?}", credentials).contains(&credentials.secret_key));
    assert_eq!(session.sim.ledger().live(AllocKind::Credentials), 0);

    session.sim.fail_next(
        "edge_register_access",
        codes::EDGE_REGISTER_ACCESS_FAILED,
        "registration rejected",
    );
    let err = session
        .run(session.bridge.edge_register_access(&config, session.access(), false))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::EdgeRegisterAccessFailed));

    let url = session
        .run(session.bridge.edge_join_share_url(
            "https://link.sim.test/",
            &credentials.access_key_id,
            "media",
            "a.txt",
            ShareUrlOptions::default(),
        ))
        .unwrap();
    assert_eq!(url, format!("https://link.sim.test/s/{}/media/a.txt", credentials.access_key_id));

    let raw = session
        .run(session.bridge.edge_join_share_url(
            "https://link.sim.test",
            &credentials.access_key_id,
            "media",
            "a.txt",
            ShareUrlOptions { raw: true },
        ))
        .unwrap();
    assert_eq!(raw, format!("https://link.sim.test/raw/{}/media/a.txt", credentials.access_key_id));

    let err = session
        .run(session.bridge.edge_join_share_url(
            "https://link.sim.test",
            &credentials.access_key_id,
            "",
            "a.txt",
            ShareUrlOptions::default(),
        ))
        .unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), Some(ErrorKind::Internal));

    session.finish();
}
