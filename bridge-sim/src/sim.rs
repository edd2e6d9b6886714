use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::ffi::{CStr, CString};
use std::hash::{Hash, Hasher};
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::slice;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bridge_traits::ffi::*;
use bridge_traits::ForeignLibrary;

use crate::gate::Gate;
use crate::ledger::{AllocKind, Ledger};
use crate::store::{
    validate_bucket_name, validate_object_key, AccessRecord, DownloadRecord, ObjectEntry,
    PartUploadRecord, ProjectRecord, ProjectSettings, Session, SimFailure, SimResult, Store,
    StoredBucket, StoredObject, StoredPart, UploadEntry, UploadRecord,
};

const GRANT_PREFIX: &str = "sim:";

type Metadata = Vec<(Vec<u8>, Vec<u8>)>;

trait HandleRecord: Sized {
    const KIND: AllocKind;
    fn id(&self) -> usize;
    fn with_id(id: usize) -> Self;
}

macro_rules! handle_records {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl HandleRecord for $ty {
                const KIND: AllocKind = AllocKind::$kind;

                fn id(&self) -> usize {
                    self._handle
                }

                fn with_id(id: usize) -> Self {
                    <$ty>::from_id(id)
                }
            }
        )*
    };
}

handle_records!(
    UplinkAccess => Access,
    UplinkProject => Project,
    UplinkUpload => Upload,
    UplinkDownload => Download,
    UplinkEncryptionKey => EncryptionKey,
    UplinkPartUpload => PartUpload,
);

struct SimBucketIterator {
    items: Vec<(String, i64)>,
    position: Option<usize>,
    error: Option<SimFailure>,
}

struct SimObjectIterator {
    items: Vec<ObjectEntry>,
    position: Option<usize>,
    error: Option<SimFailure>,
    system: bool,
    custom: bool,
}

struct SimPartIterator {
    items: Vec<(u32, StoredPart)>,
    position: Option<usize>,
    error: Option<SimFailure>,
}

struct SimUploadIterator {
    items: Vec<UploadEntry>,
    position: Option<usize>,
    error: Option<SimFailure>,
    system: bool,
}

/// Moves an iterator cursor forward; `false` once it runs past the end.
fn advance(position: &mut Option<usize>, len: usize) -> bool {
    let next = position.map_or(0, |p| p + 1);
    *position = Some(next.min(len));
    next < len
}

/// In-memory `libuplink` with resource accounting.
///
/// Every pointer it returns is recorded in a [`Ledger`]; frees are checked
/// against it so tests can assert that nothing leaked and nothing was freed
/// twice. Operations can be made to fail ([`fail_next`](Self::fail_next)) or
/// to block ([`gate`](Self::gate)) by name, where the name is the
/// [`ForeignLibrary`] method name.
pub struct SimUplink {
    label: String,
    store: Mutex<Store>,
    ledger: Mutex<Ledger>,
    faults: Mutex<HashMap<&'static str, VecDeque<SimFailure>>>,
    gates: Mutex<HashMap<&'static str, Gate>>,
    calls: Mutex<HashMap<&'static str, u64>>,
}

impl Default for SimUplink {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimUplink {
    /// The only auth service address `edge_register_access` can reach.
    pub const AUTH_SERVICE: &'static str = "auth.sim.test:7777";

    /// Endpoint handed out with registered edge credentials.
    pub const GATEWAY: &'static str = "https://gateway.sim.test";

    pub fn new() -> Self {
        Self::with_label("sim")
    }

    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            store: Mutex::new(Store::default()),
            ledger: Mutex::new(Ledger::default()),
            faults: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// A serialized grant that [`parse_access`](ForeignLibrary::parse_access) accepts.
    pub fn grant(satellite: &str, api_key: &str) -> String {
        format!("{}{}/{}", GRANT_PREFIX, satellite, api_key)
    }

    /// The next call to `op` fails with `code` and `message`.
    pub fn fail_next(&self, op: &'static str, code: i32, message: impl Into<String>) {
        lock(&self.faults)
            .entry(op)
            .or_default()
            .push_back(SimFailure::new(code, message));
    }

    /// Calls to `op` block until the returned gate is opened.
    pub fn gate(&self, op: &'static str) -> Gate {
        lock(&self.gates).entry(op).or_default().clone()
    }

    pub fn clear_gate(&self, op: &'static str) {
        if let Some(gate) = lock(&self.gates).remove(op) {
            gate.open();
        }
    }

    /// Number of times `op` was entered.
    pub fn calls(&self, op: &str) -> u64 {
        lock(&self.calls).get(op).copied().unwrap_or(0)
    }

    pub fn ledger(&self) -> MutexGuard<'_, Ledger> {
        lock(&self.ledger)
    }

    pub fn seed_bucket(&self, name: &str) {
        lock(&self.store)
            .buckets
            .entry(name.to_string())
            .or_insert_with(|| StoredBucket {
                created: now(),
                objects: Default::default(),
            });
    }

    pub fn seed_object(&self, bucket: &str, key: &str, data: &[u8], custom: &[(&[u8], &[u8])]) {
        self.seed_bucket(bucket);
        let mut store = lock(&self.store);
        if let Some(stored) = store.buckets.get_mut(bucket) {
            stored.objects.insert(
                key.to_string(),
                StoredObject {
                    data: data.to_vec(),
                    created: now(),
                    expires: 0,
                    custom: custom
                        .iter()
                        .map(|(k, v)| (k.to_vec(), v.to_vec()))
                        .collect(),
                },
            );
        }
    }

    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let store = lock(&self.store);
        store.object(bucket, key).ok().map(|o| o.data.clone())
    }

    pub fn object_metadata(&self, bucket: &str, key: &str) -> Option<Metadata> {
        let store = lock(&self.store);
        store.object(bucket, key).ok().map(|o| o.custom.clone())
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        lock(&self.store).buckets.contains_key(name)
    }

    pub fn last_project_settings(&self) -> Option<ProjectSettings> {
        lock(&self.store).last_project_settings.clone()
    }

    pub fn last_access_settings(&self) -> Option<ProjectSettings> {
        lock(&self.store).last_access_settings.clone()
    }

    /// Multipart uploads begun and neither committed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        lock(&self.store).pending.len()
    }

    fn enter(&self, op: &'static str) -> Option<SimFailure> {
        *lock(&self.calls).entry(op).or_default() += 1;
        let gate = lock(&self.gates).get(op).cloned();
        if let Some(gate) = gate {
            gate.pass();
        }
        let failure = lock(&self.faults).get_mut(op).and_then(VecDeque::pop_front);
        if failure.is_some() {
            tracing::debug!(op, "injected failure");
        }
        failure
    }

    // ---- allocation -------------------------------------------------------

    fn track<T>(&self, value: T, kind: AllocKind) -> *mut T {
        let raw = Box::into_raw(Box::new(value));
        self.ledger().track(raw as usize, kind);
        raw
    }

    fn alloc_error(&self, failure: SimFailure) -> *mut UplinkError {
        let message = c_string(&failure.message).into_raw();
        self.track(
            UplinkError {
                code: failure.code,
                message,
            },
            AllocKind::Error,
        )
    }

    fn alloc_error_opt(&self, failure: Option<SimFailure>) -> *mut UplinkError {
        failure.map_or(ptr::null_mut(), |f| self.alloc_error(f))
    }

    fn alloc_string(&self, value: &str) -> *mut c_char {
        let raw = c_string(value).into_raw();
        self.ledger().track(raw as usize, AllocKind::String);
        raw
    }

    fn alloc_handle<T: HandleRecord>(&self, id: usize) -> *mut T {
        self.track(T::with_id(id), T::KIND)
    }

    fn alloc_bucket(&self, name: &str, created: i64) -> *mut UplinkBucket {
        self.track(
            UplinkBucket {
                name: c_string(name).into_raw(),
                created,
            },
            AllocKind::Bucket,
        )
    }

    fn alloc_object(
        &self,
        key: &str,
        is_prefix: bool,
        object: Option<&StoredObject>,
        system: bool,
        custom: bool,
    ) -> *mut UplinkObject {
        let system = match object {
            Some(o) if system => UplinkSystemMetadata {
                created: o.created,
                expires: o.expires,
                content_length: o.data.len() as i64,
            },
            _ => UplinkSystemMetadata::default(),
        };
        let custom = match object {
            Some(o) if custom => build_metadata(&o.custom),
            _ => UplinkCustomMetadata::empty(),
        };
        self.track(
            UplinkObject {
                key: c_string(key).into_raw(),
                is_prefix,
                system,
                custom,
            },
            AllocKind::Object,
        )
    }

    fn alloc_upload_info(&self, entry: &UploadEntry, system: bool) -> *mut UplinkUploadInfo {
        let system = if system {
            UplinkSystemMetadata {
                created: entry.created,
                expires: entry.expires,
                content_length: 0,
            }
        } else {
            UplinkSystemMetadata::default()
        };
        self.track(
            UplinkUploadInfo {
                upload_id: c_string(&entry.upload_id).into_raw(),
                key: c_string(&entry.key).into_raw(),
                is_prefix: false,
                system,
                custom: UplinkCustomMetadata::empty(),
            },
            AllocKind::UploadInfo,
        )
    }

    fn alloc_part(&self, part_number: u32, part: &StoredPart) -> *mut UplinkPart {
        let (etag, etag_length) = leak_bytes(&part.etag);
        self.track(
            UplinkPart {
                part_number,
                size: part.data.len(),
                modified: part.modified,
                etag,
                etag_length,
            },
            AllocKind::Part,
        )
    }

    fn handle_result<T: HandleRecord>(
        &self,
        result: SimResult<usize>,
    ) -> (*mut T, *mut UplinkError) {
        match result {
            Ok(id) => (self.alloc_handle::<T>(id), ptr::null_mut()),
            Err(failure) => (ptr::null_mut(), self.alloc_error(failure)),
        }
    }

    fn bucket_result(&self, result: SimResult<(String, i64)>) -> UplinkBucketResult {
        match result {
            Ok((name, created)) => UplinkBucketResult {
                bucket: self.alloc_bucket(&name, created),
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkBucketResult {
                bucket: ptr::null_mut(),
                error: self.alloc_error(failure),
            },
        }
    }

    fn object_result(&self, result: SimResult<Option<(String, StoredObject)>>) -> UplinkObjectResult {
        match result {
            Ok(Some((key, object))) => UplinkObjectResult {
                object: self.alloc_object(&key, false, Some(&object), true, true),
                error: ptr::null_mut(),
            },
            Ok(None) => UplinkObjectResult {
                object: ptr::null_mut(),
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkObjectResult {
                object: ptr::null_mut(),
                error: self.alloc_error(failure),
            },
        }
    }

    fn string_result(&self, result: SimResult<String>) -> UplinkStringResult {
        match result {
            Ok(value) => UplinkStringResult {
                string: self.alloc_string(&value),
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkStringResult {
                string: ptr::null_mut(),
                error: self.alloc_error(failure),
            },
        }
    }

    fn request_access(&self, satellite: String, api_key: String, passphrase: String) -> SimResult<usize> {
        if satellite.is_empty() || api_key.is_empty() {
            return Err(SimFailure::new(
                codes::INTERNAL,
                "uplink: satellite address and API key are required",
            ));
        }
        if passphrase.is_empty() {
            return Err(SimFailure::new(codes::INTERNAL, "uplink: passphrase is required"));
        }
        let record = AccessRecord {
            serialized: Self::grant(&satellite, &api_key),
            satellite,
        };
        Ok(lock(&self.store).insert_session(Session::Access(record)))
    }

    // ---- input validation -------------------------------------------------

    unsafe fn handle_id<T: HandleRecord>(&self, handle: *mut T) -> SimResult<usize> {
        if handle.is_null() {
            return Err(SimFailure::new(codes::INVALID_HANDLE, "handle is null"));
        }
        let mut ledger = self.ledger();
        if !ledger.is_live(handle as usize, T::KIND) {
            ledger.violation(format!("use of released {} {:#x}", T::KIND, handle as usize));
            return Err(SimFailure::new(codes::INVALID_HANDLE, "handle was released"));
        }
        Ok((*handle).id())
    }

    unsafe fn live_iterator<T>(&self, iterator: *mut T, kind: AllocKind) -> Option<&mut T> {
        if iterator.is_null() {
            return None;
        }
        let mut ledger = self.ledger();
        if !ledger.is_live(iterator as usize, kind) {
            ledger.violation(format!("use of released {} {:#x}", kind, iterator as usize));
            return None;
        }
        Some(&mut *iterator)
    }

    fn bucket_op<F>(
        &self,
        op: &'static str,
        project: *mut UplinkProject,
        bucket: *const c_char,
        f: F,
    ) -> UplinkBucketResult
    where
        F: FnOnce(&mut Store, &str) -> SimResult<(String, i64)>,
    {
        let result = match self.enter(op) {
            Some(failure) => Err(failure),
            None => (|| {
                let id = unsafe { self.handle_id(project) }?;
                let name = unsafe { read_str(bucket) };
                let mut store = lock(&self.store);
                store.open_project(id)?;
                f(&mut store, &name)
            })(),
        };
        self.bucket_result(result)
    }

    // ---- release ------------------------------------------------------------

    unsafe fn release_box<T>(&self, raw: *mut T, kind: AllocKind) -> Option<Box<T>> {
        if raw.is_null() {
            return None;
        }
        if self.ledger().release(raw as usize, kind) {
            Some(Box::from_raw(raw))
        } else {
            None
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn fingerprint(parts: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish()
}

unsafe fn read_settings(config: &UplinkConfig) -> ProjectSettings {
    ProjectSettings {
        user_agent: (!config.user_agent.is_null()).then(|| read_str(config.user_agent)),
        dial_timeout_milliseconds: config.dial_timeout_milliseconds,
        temp_directory: (!config.temp_directory.is_null()).then(|| read_str(config.temp_directory)),
    }
}

fn c_string(value: &str) -> CString {
    CString::new(value.replace('\0', "\u{fffd}")).unwrap_or_default()
}

unsafe fn read_str(value: *const c_char) -> String {
    if value.is_null() {
        return String::new();
    }
    CStr::from_ptr(value).to_string_lossy().into_owned()
}

unsafe fn read_bytes<'a>(data: *const c_char, length: usize) -> &'a [u8] {
    if data.is_null() || length == 0 {
        return &[];
    }
    slice::from_raw_parts(data as *const u8, length)
}

unsafe fn read_metadata(metadata: &UplinkCustomMetadata) -> Metadata {
    if metadata.entries.is_null() {
        return Vec::new();
    }
    slice::from_raw_parts(metadata.entries, metadata.count)
        .iter()
        .map(|entry| {
            (
                read_bytes(entry.key, entry.key_length).to_vec(),
                read_bytes(entry.value, entry.value_length).to_vec(),
            )
        })
        .collect()
}

fn leak_bytes(bytes: &[u8]) -> (*mut c_char, usize) {
    let boxed: Box<[u8]> = bytes.into();
    let length = boxed.len();
    (Box::into_raw(boxed) as *mut u8 as *mut c_char, length)
}

unsafe fn reclaim_bytes(data: *mut c_char, length: usize) {
    if !data.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(data as *mut u8, length)));
    }
}

fn build_metadata(pairs: &[(Vec<u8>, Vec<u8>)]) -> UplinkCustomMetadata {
    if pairs.is_empty() {
        return UplinkCustomMetadata::empty();
    }
    let entries: Box<[UplinkCustomMetadataEntry]> = pairs
        .iter()
        .map(|(key, value)| {
            let (key, key_length) = leak_bytes(key);
            let (value, value_length) = leak_bytes(value);
            UplinkCustomMetadataEntry {
                key,
                key_length,
                value,
                value_length,
            }
        })
        .collect();
    let count = entries.len();
    UplinkCustomMetadata {
        entries: Box::into_raw(entries) as *mut UplinkCustomMetadataEntry,
        count,
    }
}

unsafe fn reclaim_metadata(metadata: &UplinkCustomMetadata) {
    if metadata.entries.is_null() {
        return;
    }
    let entries = Box::from_raw(ptr::slice_from_raw_parts_mut(
        metadata.entries,
        metadata.count,
    ));
    for entry in entries.iter() {
        reclaim_bytes(entry.key, entry.key_length);
        reclaim_bytes(entry.value, entry.value_length);
    }
}

impl ForeignLibrary for SimUplink {
    fn describe(&self) -> String {
        format!("simulated libuplink ({})", self.label)
    }

    // ---- access ----------------------------------------------------------

    unsafe fn parse_access(&self, access: *const c_char) -> UplinkAccessResult {
        let result = match self.enter("parse_access") {
            Some(failure) => Err(failure),
            None => {
                let serialized = read_str(access);
                match serialized
                    .strip_prefix(GRANT_PREFIX)
                    .and_then(|rest| rest.split_once('/'))
                {
                    Some((satellite, api_key)) if !satellite.is_empty() && !api_key.is_empty() => {
                        let record = AccessRecord {
                            satellite: satellite.to_string(),
                            serialized: serialized.clone(),
                        };
                        Ok(lock(&self.store).insert_session(Session::Access(record)))
                    }
                    _ => Err(SimFailure::new(
                        codes::INTERNAL,
                        "uplink: invalid access grant format",
                    )),
                }
            }
        };
        let (access, error) = self.handle_result::<UplinkAccess>(result);
        UplinkAccessResult { access, error }
    }

    unsafe fn request_access_with_passphrase(
        &self,
        satellite_address: *const c_char,
        api_key: *const c_char,
        passphrase: *const c_char,
    ) -> UplinkAccessResult {
        let result = match self.enter("request_access_with_passphrase") {
            Some(failure) => Err(failure),
            None => self.request_access(
                read_str(satellite_address),
                read_str(api_key),
                read_str(passphrase),
            ),
        };
        let (access, error) = self.handle_result::<UplinkAccess>(result);
        UplinkAccessResult { access, error }
    }

    unsafe fn access_serialize(&self, access: *mut UplinkAccess) -> UplinkStringResult {
        let result = match self.enter("access_serialize") {
            Some(failure) => Err(failure),
            None => self
                .handle_id(access)
                .and_then(|id| lock(&self.store).access(id).map(|a| a.serialized.clone())),
        };
        self.string_result(result)
    }

    unsafe fn access_satellite_address(&self, access: *mut UplinkAccess) -> UplinkStringResult {
        let result = match self.enter("access_satellite_address") {
            Some(failure) => Err(failure),
            None => self
                .handle_id(access)
                .and_then(|id| lock(&self.store).access(id).map(|a| a.satellite.clone())),
        };
        self.string_result(result)
    }

    unsafe fn config_request_access_with_passphrase(
        &self,
        config: UplinkConfig,
        satellite_address: *const c_char,
        api_key: *const c_char,
        passphrase: *const c_char,
    ) -> UplinkAccessResult {
        let result = match self.enter("config_request_access_with_passphrase") {
            Some(failure) => Err(failure),
            None => {
                lock(&self.store).last_access_settings = Some(read_settings(&config));
                self.request_access(
                    read_str(satellite_address),
                    read_str(api_key),
                    read_str(passphrase),
                )
            }
        };
        let (access, error) = self.handle_result::<UplinkAccess>(result);
        UplinkAccessResult { access, error }
    }

    unsafe fn access_share(
        &self,
        access: *mut UplinkAccess,
        permission: UplinkPermission,
        prefixes: *mut UplinkSharePrefix,
        prefix_count: i64,
    ) -> UplinkAccessResult {
        let result = match self.enter("access_share") {
            Some(failure) => Err(failure),
            None => self.handle_id(access).and_then(|id| {
                let flags: String = [
                    (permission.allow_download, 'd'),
                    (permission.allow_upload, 'u'),
                    (permission.allow_list, 'l'),
                    (permission.allow_delete, 'x'),
                ]
                .iter()
                .filter(|(allowed, _)| *allowed)
                .map(|(_, flag)| *flag)
                .collect();
                if flags.is_empty() {
                    return Err(SimFailure::new(codes::INTERNAL, "uplink: permission is empty"));
                }
                let prefixes = match usize::try_from(prefix_count) {
                    Ok(count) if count > 0 && !prefixes.is_null() => slice::from_raw_parts(prefixes, count),
                    _ => &[],
                };
                let mut scopes = Vec::with_capacity(prefixes.len());
                for prefix in prefixes {
                    let bucket = read_str(prefix.bucket);
                    if bucket.is_empty() {
                        return Err(SimFailure::new(
                            codes::INTERNAL,
                            "uplink: shared prefix requires a bucket",
                        ));
                    }
                    scopes.push(format!("{}/{}", bucket, read_str(prefix.prefix)));
                }
                let mut store = lock(&self.store);
                let parent = store.access(id)?.clone();
                let record = AccessRecord {
                    serialized: format!("{}+{}[{}]", parent.serialized, flags, scopes.join(",")),
                    satellite: parent.satellite,
                };
                Ok(store.insert_session(Session::Access(record)))
            }),
        };
        let (access, error) = self.handle_result::<UplinkAccess>(result);
        UplinkAccessResult { access, error }
    }

    unsafe fn access_override_encryption_key(
        &self,
        access: *mut UplinkAccess,
        bucket: *const c_char,
        prefix: *const c_char,
        key: *mut UplinkEncryptionKey,
    ) -> ErrorPtr {
        let result = match self.enter("access_override_encryption_key") {
            Some(failure) => Err(failure),
            None => self.handle_id(access).and_then(|access_id| {
                let key_id = self.handle_id(key)?;
                let (bucket, _prefix) = (read_str(bucket), read_str(prefix));
                if bucket.is_empty() {
                    return Err(SimFailure::new(codes::INTERNAL, "uplink: bucket is required"));
                }
                let store = lock(&self.store);
                store.access(access_id)?;
                store.encryption_key(key_id)?;
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn derive_encryption_key(
        &self,
        passphrase: *const c_char,
        salt: *mut c_void,
        length: usize,
    ) -> UplinkEncryptionKeyResult {
        let result = match self.enter("derive_encryption_key") {
            Some(failure) => Err(failure),
            None => {
                let passphrase = read_str(passphrase);
                if passphrase.is_empty() {
                    Err(SimFailure::new(codes::INTERNAL, "uplink: passphrase is empty"))
                } else {
                    let mut key = passphrase.into_bytes();
                    key.extend_from_slice(read_bytes(salt as *const c_char, length));
                    Ok(lock(&self.store).insert_session(Session::EncryptionKey(key)))
                }
            }
        };
        let (encryption_key, error) = self.handle_result::<UplinkEncryptionKey>(result);
        UplinkEncryptionKeyResult {
            encryption_key,
            error,
        }
    }

    // ---- project ---------------------------------------------------------

    unsafe fn open_project(&self, access: *mut UplinkAccess) -> UplinkProjectResult {
        let result = match self.enter("open_project") {
            Some(failure) => Err(failure),
            None => self.handle_id(access).and_then(|id| {
                let mut store = lock(&self.store);
                store.usable_access(id)?;
                Ok(store.insert_session(Session::Project(ProjectRecord { closed: false })))
            }),
        };
        let (project, error) = self.handle_result::<UplinkProject>(result);
        UplinkProjectResult { project, error }
    }

    unsafe fn config_open_project(
        &self,
        config: UplinkConfig,
        access: *mut UplinkAccess,
    ) -> UplinkProjectResult {
        let result = match self.enter("config_open_project") {
            Some(failure) => Err(failure),
            None => self.handle_id(access).and_then(|id| {
                let settings = read_settings(&config);
                let mut store = lock(&self.store);
                store.usable_access(id)?;
                store.last_project_settings = Some(settings);
                Ok(store.insert_session(Session::Project(ProjectRecord { closed: false })))
            }),
        };
        let (project, error) = self.handle_result::<UplinkProject>(result);
        UplinkProjectResult { project, error }
    }

    unsafe fn close_project(&self, project: *mut UplinkProject) -> ErrorPtr {
        let result = match self.enter("close_project") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                lock(&self.store).project_mut(id)?.closed = true;
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn revoke_access(
        &self,
        project: *mut UplinkProject,
        access: *mut UplinkAccess,
    ) -> ErrorPtr {
        let result = match self.enter("revoke_access") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|project_id| {
                let access_id = self.handle_id(access)?;
                let mut store = lock(&self.store);
                store.open_project(project_id)?;
                let serialized = store.access(access_id)?.serialized.clone();
                store.revoked.insert(serialized);
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    // ---- buckets ---------------------------------------------------------

    unsafe fn create_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult {
        self.bucket_op("create_bucket", project, bucket, |store, name| {
            validate_bucket_name(name)?;
            if store.buckets.contains_key(name) {
                return Err(SimFailure::new(
                    codes::BUCKET_ALREADY_EXISTS,
                    format!("bucket already exists: {}", name),
                ));
            }
            let created = now();
            store.buckets.insert(
                name.to_string(),
                StoredBucket {
                    created,
                    objects: Default::default(),
                },
            );
            Ok((name.to_string(), created))
        })
    }

    unsafe fn ensure_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult {
        self.bucket_op("ensure_bucket", project, bucket, |store, name| {
            validate_bucket_name(name)?;
            let stored = store
                .buckets
                .entry(name.to_string())
                .or_insert_with(|| StoredBucket {
                    created: now(),
                    objects: Default::default(),
                });
            Ok((name.to_string(), stored.created))
        })
    }

    unsafe fn stat_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult {
        self.bucket_op("stat_bucket", project, bucket, |store, name| {
            store.bucket(name).map(|b| (name.to_string(), b.created))
        })
    }

    unsafe fn delete_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult {
        self.bucket_op("delete_bucket", project, bucket, |store, name| {
            let stored = store.bucket(name)?;
            if !stored.objects.is_empty() {
                return Err(SimFailure::new(
                    codes::BUCKET_NOT_EMPTY,
                    format!("bucket not empty: {}", name),
                ));
            }
            let created = stored.created;
            store.buckets.remove(name);
            Ok((name.to_string(), created))
        })
    }

    unsafe fn delete_bucket_with_objects(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult {
        self.bucket_op("delete_bucket_with_objects", project, bucket, |store, name| {
            let created = store.bucket(name)?.created;
            store.buckets.remove(name);
            Ok((name.to_string(), created))
        })
    }

    unsafe fn list_buckets(
        &self,
        project: *mut UplinkProject,
        options: *mut UplinkListBucketsOptions,
    ) -> *mut UplinkBucketIterator {
        let listing = match self.enter("list_buckets") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let cursor = if options.is_null() {
                    String::new()
                } else {
                    read_str((*options).cursor)
                };
                let store = lock(&self.store);
                store.open_project(id)?;
                Ok(store.list_buckets(&cursor))
            }),
        };
        let (items, error) = match listing {
            Ok(items) => (items, None),
            Err(failure) => (Vec::new(), Some(failure)),
        };
        let iterator = SimBucketIterator {
            items,
            position: None,
            error,
        };
        self.track(iterator, AllocKind::BucketIterator) as *mut UplinkBucketIterator
    }

    unsafe fn bucket_iterator_next(&self, iterator: *mut UplinkBucketIterator) -> bool {
        self.enter("bucket_iterator_next");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimBucketIterator, AllocKind::BucketIterator)
        else {
            return false;
        };
        if iterator.error.is_some() {
            return false;
        }
        advance(&mut iterator.position, iterator.items.len())
    }

    unsafe fn bucket_iterator_item(&self, iterator: *mut UplinkBucketIterator) -> *mut UplinkBucket {
        self.enter("bucket_iterator_item");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimBucketIterator, AllocKind::BucketIterator)
        else {
            return ptr::null_mut();
        };
        match iterator.position.and_then(|p| iterator.items.get(p)) {
            Some((name, created)) => self.alloc_bucket(name, *created),
            None => ptr::null_mut(),
        }
    }

    unsafe fn bucket_iterator_err(&self, iterator: *mut UplinkBucketIterator) -> ErrorPtr {
        let injected = self.enter("bucket_iterator_err");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimBucketIterator, AllocKind::BucketIterator)
        else {
            return self.alloc_error(SimFailure::new(codes::INVALID_HANDLE, "iterator was released"));
        };
        self.alloc_error_opt(injected.or_else(|| iterator.error.clone()))
    }

    unsafe fn free_bucket_iterator(&self, iterator: *mut UplinkBucketIterator) {
        self.enter("free_bucket_iterator");
        drop(self.release_box(iterator as *mut SimBucketIterator, AllocKind::BucketIterator));
    }

    // ---- objects ---------------------------------------------------------

    unsafe fn stat_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
    ) -> UplinkObjectResult {
        let result = match self.enter("stat_object") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key) = (read_str(bucket), read_str(key));
                let store = lock(&self.store);
                store.open_project(id)?;
                let object = store.object(&bucket, &key)?.clone();
                Ok(Some((key, object)))
            }),
        };
        self.object_result(result)
    }

    unsafe fn delete_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
    ) -> UplinkObjectResult {
        let result = match self.enter("delete_object") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key) = (read_str(bucket), read_str(key));
                let mut store = lock(&self.store);
                store.open_project(id)?;
                validate_object_key(&key)?;
                let removed = store.bucket_mut(&bucket)?.objects.remove(&key);
                Ok(removed.map(|object| (key, object)))
            }),
        };
        self.object_result(result)
    }

    unsafe fn update_object_metadata(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        metadata: UplinkCustomMetadata,
        _options: *mut UplinkUploadObjectMetadataOptions,
    ) -> ErrorPtr {
        let result = match self.enter("update_object_metadata") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key) = (read_str(bucket), read_str(key));
                let custom = read_metadata(&metadata);
                let mut store = lock(&self.store);
                store.open_project(id)?;
                store.object(&bucket, &key)?;
                if let Some(object) = store.bucket_mut(&bucket)?.objects.get_mut(&key) {
                    object.custom = custom;
                }
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn list_objects(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        options: *mut UplinkListObjectsOptions,
    ) -> *mut UplinkObjectIterator {
        let options = if options.is_null() {
            None
        } else {
            Some(*options)
        };
        let listing = match self.enter("list_objects") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let bucket = read_str(bucket);
                let (prefix, cursor, recursive) = match &options {
                    Some(o) => (read_str(o.prefix), read_str(o.cursor), o.recursive),
                    None => (String::new(), String::new(), false),
                };
                let store = lock(&self.store);
                store.open_project(id)?;
                store.list_objects(&bucket, &prefix, &cursor, recursive)
            }),
        };
        let (items, error) = match listing {
            Ok(items) => (items, None),
            Err(failure) => (Vec::new(), Some(failure)),
        };
        let iterator = SimObjectIterator {
            items,
            position: None,
            error,
            system: options.map_or(false, |o| o.system),
            custom: options.map_or(false, |o| o.custom),
        };
        self.track(iterator, AllocKind::ObjectIterator) as *mut UplinkObjectIterator
    }

    unsafe fn object_iterator_next(&self, iterator: *mut UplinkObjectIterator) -> bool {
        self.enter("object_iterator_next");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimObjectIterator, AllocKind::ObjectIterator)
        else {
            return false;
        };
        if iterator.error.is_some() {
            return false;
        }
        advance(&mut iterator.position, iterator.items.len())
    }

    unsafe fn object_iterator_item(&self, iterator: *mut UplinkObjectIterator) -> *mut UplinkObject {
        self.enter("object_iterator_item");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimObjectIterator, AllocKind::ObjectIterator)
        else {
            return ptr::null_mut();
        };
        match iterator.position.and_then(|p| iterator.items.get(p)) {
            Some(entry) => self.alloc_object(
                &entry.key,
                entry.is_prefix,
                entry.object.as_ref(),
                iterator.system,
                iterator.custom,
            ),
            None => ptr::null_mut(),
        }
    }

    unsafe fn object_iterator_err(&self, iterator: *mut UplinkObjectIterator) -> ErrorPtr {
        let injected = self.enter("object_iterator_err");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimObjectIterator, AllocKind::ObjectIterator)
        else {
            return self.alloc_error(SimFailure::new(codes::INVALID_HANDLE, "iterator was released"));
        };
        self.alloc_error_opt(injected.or_else(|| iterator.error.clone()))
    }

    unsafe fn free_object_iterator(&self, iterator: *mut UplinkObjectIterator) {
        self.enter("free_object_iterator");
        drop(self.release_box(iterator as *mut SimObjectIterator, AllocKind::ObjectIterator));
    }

    unsafe fn copy_object(
        &self,
        project: *mut UplinkProject,
        old_bucket: *const c_char,
        old_key: *const c_char,
        new_bucket: *const c_char,
        new_key: *const c_char,
        _options: *mut UplinkCopyObjectOptions,
    ) -> UplinkObjectResult {
        let result = match self.enter("copy_object") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (old_bucket, old_key) = (read_str(old_bucket), read_str(old_key));
                let (new_bucket, new_key) = (read_str(new_bucket), read_str(new_key));
                let mut store = lock(&self.store);
                store.open_project(id)?;
                let object = store.relocate(&old_bucket, &old_key, &new_bucket, &new_key, true)?;
                Ok(Some((new_key, object)))
            }),
        };
        self.object_result(result)
    }

    unsafe fn move_object(
        &self,
        project: *mut UplinkProject,
        old_bucket: *const c_char,
        old_key: *const c_char,
        new_bucket: *const c_char,
        new_key: *const c_char,
        _options: *mut UplinkMoveObjectOptions,
    ) -> ErrorPtr {
        let result = match self.enter("move_object") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (old_bucket, old_key) = (read_str(old_bucket), read_str(old_key));
                let (new_bucket, new_key) = (read_str(new_bucket), read_str(new_key));
                let mut store = lock(&self.store);
                store.open_project(id)?;
                store.relocate(&old_bucket, &old_key, &new_bucket, &new_key, false)?;
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    // ---- uploads ---------------------------------------------------------

    unsafe fn upload_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkUploadOptions,
    ) -> UplinkUploadResult {
        let result = match self.enter("upload_object") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key) = (read_str(bucket), read_str(key));
                let expires = if options.is_null() { 0 } else { (*options).expires };
                let mut store = lock(&self.store);
                store.open_project(id)?;
                store.bucket(&bucket)?;
                validate_object_key(&key)?;
                Ok(store.insert_session(Session::Upload(UploadRecord {
                    bucket,
                    key,
                    buffer: Vec::new(),
                    custom: Vec::new(),
                    expires,
                    done: false,
                })))
            }),
        };
        let (upload, error) = self.handle_result::<UplinkUpload>(result);
        UplinkUploadResult { upload, error }
    }

    unsafe fn upload_write(
        &self,
        upload: *mut UplinkUpload,
        bytes: *mut c_void,
        length: usize,
    ) -> UplinkWriteResult {
        let result = match self.enter("upload_write") {
            Some(failure) => Err(failure),
            None => self.handle_id(upload).and_then(|id| {
                let data = read_bytes(bytes as *const c_char, length);
                let mut store = lock(&self.store);
                let record = store.upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "upload already done"));
                }
                record.buffer.extend_from_slice(data);
                Ok(data.len())
            }),
        };
        match result {
            Ok(bytes_written) => UplinkWriteResult {
                bytes_written,
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkWriteResult {
                bytes_written: 0,
                error: self.alloc_error(failure),
            },
        }
    }

    unsafe fn upload_set_custom_metadata(
        &self,
        upload: *mut UplinkUpload,
        metadata: UplinkCustomMetadata,
    ) -> ErrorPtr {
        let result = match self.enter("upload_set_custom_metadata") {
            Some(failure) => Err(failure),
            None => self.handle_id(upload).and_then(|id| {
                let custom = read_metadata(&metadata);
                let mut store = lock(&self.store);
                let record = store.upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "upload already done"));
                }
                record.custom = custom;
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn upload_commit(&self, upload: *mut UplinkUpload) -> ErrorPtr {
        let result = match self.enter("upload_commit") {
            Some(failure) => Err(failure),
            None => self.handle_id(upload).and_then(|id| {
                let mut store = lock(&self.store);
                let record = store.upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "upload already done"));
                }
                record.done = true;
                let record = record.clone();
                let object = StoredObject {
                    data: record.buffer,
                    created: now(),
                    expires: record.expires,
                    custom: record.custom,
                };
                store
                    .bucket_mut(&record.bucket)?
                    .objects
                    .insert(record.key, object);
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn upload_abort(&self, upload: *mut UplinkUpload) -> ErrorPtr {
        let result = match self.enter("upload_abort") {
            Some(failure) => Err(failure),
            None => self.handle_id(upload).and_then(|id| {
                let mut store = lock(&self.store);
                let record = store.upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "upload already done"));
                }
                record.done = true;
                record.buffer.clear();
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn upload_info(&self, upload: *mut UplinkUpload) -> UplinkObjectResult {
        let result = match self.enter("upload_info") {
            Some(failure) => Err(failure),
            None => self.handle_id(upload).and_then(|id| {
                let mut store = lock(&self.store);
                let record = store.upload_mut(id)?;
                let object = StoredObject {
                    data: record.buffer.clone(),
                    created: 0,
                    expires: record.expires,
                    custom: record.custom.clone(),
                };
                Ok(Some((record.key.clone(), object)))
            }),
        };
        self.object_result(result)
    }

    // ---- downloads -------------------------------------------------------

    unsafe fn download_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkDownloadOptions,
    ) -> UplinkDownloadResult {
        let result = match self.enter("download_object") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key) = (read_str(bucket), read_str(key));
                let (offset, length) = if options.is_null() {
                    (0, -1)
                } else {
                    ((*options).offset, (*options).length)
                };
                let mut store = lock(&self.store);
                store.open_project(id)?;
                let object = store.object(&bucket, &key)?.clone();
                let size = object.data.len();
                let start = usize::try_from(offset.max(0)).unwrap_or(size).min(size);
                let end = if length < 0 {
                    size
                } else {
                    start
                        .saturating_add(usize::try_from(length).unwrap_or(usize::MAX))
                        .min(size)
                };
                Ok(store.insert_session(Session::Download(DownloadRecord {
                    key,
                    object,
                    position: start,
                    end,
                    closed: false,
                })))
            }),
        };
        let (download, error) = self.handle_result::<UplinkDownload>(result);
        UplinkDownloadResult { download, error }
    }

    unsafe fn download_read(
        &self,
        download: *mut UplinkDownload,
        buffer: *mut c_void,
        length: usize,
    ) -> UplinkReadResult {
        let injected = self.enter("download_read");
        let result = self.handle_id(download).and_then(|id| {
            let mut store = lock(&self.store);
            let record = store.download_mut(id)?;
            if record.closed {
                return Err(SimFailure::new(codes::INTERNAL, "download closed"));
            }
            let available = record.end - record.position;
            let count = available.min(length);
            if count > 0 && !buffer.is_null() {
                let source = &record.object.data[record.position..record.position + count];
                slice::from_raw_parts_mut(buffer as *mut u8, count).copy_from_slice(source);
                record.position += count;
            }
            let eof = count < length && record.position == record.end;
            Ok((count, eof))
        });
        match result {
            Ok((bytes_read, eof)) => {
                let failure = injected.or_else(|| eof.then(|| SimFailure::new(codes::EOF, "EOF")));
                UplinkReadResult {
                    bytes_read,
                    error: self.alloc_error_opt(failure),
                }
            }
            Err(failure) => UplinkReadResult {
                bytes_read: 0,
                error: self.alloc_error(failure),
            },
        }
    }

    unsafe fn download_info(&self, download: *mut UplinkDownload) -> UplinkObjectResult {
        let result = match self.enter("download_info") {
            Some(failure) => Err(failure),
            None => self.handle_id(download).and_then(|id| {
                let mut store = lock(&self.store);
                let record = store.download_mut(id)?;
                Ok(Some((record.key.clone(), record.object.clone())))
            }),
        };
        self.object_result(result)
    }

    unsafe fn close_download(&self, download: *mut UplinkDownload) -> ErrorPtr {
        let result = match self.enter("close_download") {
            Some(failure) => Err(failure),
            None => self.handle_id(download).and_then(|id| {
                lock(&self.store).download_mut(id)?.closed = true;
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    // ---- multipart -------------------------------------------------------

    unsafe fn begin_upload(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkUploadOptions,
    ) -> UplinkUploadInfoResult {
        let result = match self.enter("begin_upload") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key) = (read_str(bucket), read_str(key));
                let expires = if options.is_null() { 0 } else { (*options).expires };
                let mut store = lock(&self.store);
                store.open_project(id)?;
                store.begin_upload(&bucket, &key, expires)
            }),
        };
        match result {
            Ok(entry) => UplinkUploadInfoResult {
                info: self.alloc_upload_info(&entry, true),
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkUploadInfoResult {
                info: ptr::null_mut(),
                error: self.alloc_error(failure),
            },
        }
    }

    unsafe fn commit_upload(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        options: *mut UplinkCommitUploadOptions,
    ) -> UplinkCommitUploadResult {
        let result = match self.enter("commit_upload") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key, upload_id) = (read_str(bucket), read_str(key), read_str(upload_id));
                let custom = if options.is_null() {
                    Vec::new()
                } else {
                    read_metadata(&(*options).custom_metadata)
                };
                let mut store = lock(&self.store);
                store.open_project(id)?;
                let pending = store.pending_mut(&bucket, &key, &upload_id)?.clone();
                store.pending.remove(&upload_id);
                let object = StoredObject {
                    data: pending.parts.values().flat_map(|p| p.data.iter().copied()).collect(),
                    created: now(),
                    expires: pending.expires,
                    custom,
                };
                store
                    .bucket_mut(&bucket)?
                    .objects
                    .insert(key.clone(), object.clone());
                Ok((key, object))
            }),
        };
        match result {
            Ok((key, object)) => UplinkCommitUploadResult {
                object: self.alloc_object(&key, false, Some(&object), true, true),
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkCommitUploadResult {
                object: ptr::null_mut(),
                error: self.alloc_error(failure),
            },
        }
    }

    unsafe fn abort_upload(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
    ) -> ErrorPtr {
        let result = match self.enter("abort_upload") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key, upload_id) = (read_str(bucket), read_str(key), read_str(upload_id));
                let mut store = lock(&self.store);
                store.open_project(id)?;
                store.pending_mut(&bucket, &key, &upload_id)?;
                store.pending.remove(&upload_id);
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn upload_part(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        part_number: u32,
    ) -> UplinkPartUploadResult {
        let result = match self.enter("upload_part") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key, upload_id) = (read_str(bucket), read_str(key), read_str(upload_id));
                let mut store = lock(&self.store);
                store.open_project(id)?;
                store.pending_mut(&bucket, &key, &upload_id)?;
                Ok(store.insert_session(Session::PartUpload(PartUploadRecord {
                    upload_id,
                    part_number,
                    buffer: Vec::new(),
                    etag: Vec::new(),
                    done: false,
                })))
            }),
        };
        let (part_upload, error) = self.handle_result::<UplinkPartUpload>(result);
        UplinkPartUploadResult { part_upload, error }
    }

    unsafe fn part_upload_write(
        &self,
        part_upload: *mut UplinkPartUpload,
        bytes: *mut c_void,
        length: usize,
    ) -> UplinkWriteResult {
        let result = match self.enter("part_upload_write") {
            Some(failure) => Err(failure),
            None => self.handle_id(part_upload).and_then(|id| {
                let data = read_bytes(bytes as *const c_char, length);
                let mut store = lock(&self.store);
                let record = store.part_upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "part upload already done"));
                }
                record.buffer.extend_from_slice(data);
                Ok(data.len())
            }),
        };
        match result {
            Ok(bytes_written) => UplinkWriteResult {
                bytes_written,
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkWriteResult {
                bytes_written: 0,
                error: self.alloc_error(failure),
            },
        }
    }

    unsafe fn part_upload_commit(&self, part_upload: *mut UplinkPartUpload) -> ErrorPtr {
        let result = match self.enter("part_upload_commit") {
            Some(failure) => Err(failure),
            None => self.handle_id(part_upload).and_then(|id| {
                let mut store = lock(&self.store);
                let record = store.part_upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "part upload already done"));
                }
                record.done = true;
                let record = record.clone();
                let pending = store.pending.get_mut(&record.upload_id).ok_or_else(|| {
                    SimFailure::new(codes::INTERNAL, "uplink: upload ID invalid")
                })?;
                pending.parts.insert(
                    record.part_number,
                    StoredPart {
                        data: record.buffer,
                        etag: record.etag,
                        modified: now(),
                    },
                );
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn part_upload_abort(&self, part_upload: *mut UplinkPartUpload) -> ErrorPtr {
        let result = match self.enter("part_upload_abort") {
            Some(failure) => Err(failure),
            None => self.handle_id(part_upload).and_then(|id| {
                let mut store = lock(&self.store);
                let record = store.part_upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "part upload already done"));
                }
                record.done = true;
                record.buffer.clear();
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn part_upload_set_etag(
        &self,
        part_upload: *mut UplinkPartUpload,
        etag: *const c_char,
    ) -> ErrorPtr {
        let result = match self.enter("part_upload_set_etag") {
            Some(failure) => Err(failure),
            None => self.handle_id(part_upload).and_then(|id| {
                let etag = read_str(etag);
                let mut store = lock(&self.store);
                let record = store.part_upload_mut(id)?;
                if record.done {
                    return Err(SimFailure::new(codes::UPLOAD_DONE, "part upload already done"));
                }
                record.etag = etag.into_bytes();
                Ok(())
            }),
        };
        self.alloc_error_opt(result.err())
    }

    unsafe fn part_upload_info(&self, part_upload: *mut UplinkPartUpload) -> UplinkPartResult {
        let result = match self.enter("part_upload_info") {
            Some(failure) => Err(failure),
            None => self.handle_id(part_upload).and_then(|id| {
                let mut store = lock(&self.store);
                let record = store.part_upload_mut(id)?;
                let part = StoredPart {
                    data: record.buffer.clone(),
                    etag: record.etag.clone(),
                    modified: now(),
                };
                Ok((record.part_number, part))
            }),
        };
        match result {
            Ok((part_number, part)) => UplinkPartResult {
                part: self.alloc_part(part_number, &part),
                error: ptr::null_mut(),
            },
            Err(failure) => UplinkPartResult {
                part: ptr::null_mut(),
                error: self.alloc_error(failure),
            },
        }
    }

    unsafe fn list_upload_parts(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        options: *mut UplinkListUploadPartsOptions,
    ) -> *mut UplinkPartIterator {
        let cursor = if options.is_null() { 0 } else { (*options).cursor };
        let listing = match self.enter("list_upload_parts") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let (bucket, key, upload_id) = (read_str(bucket), read_str(key), read_str(upload_id));
                let mut store = lock(&self.store);
                store.open_project(id)?;
                let pending = store.pending_mut(&bucket, &key, &upload_id)?;
                Ok(pending
                    .parts
                    .iter()
                    .filter(|(number, _)| cursor == 0 || **number > cursor)
                    .map(|(number, part)| (*number, part.clone()))
                    .collect())
            }),
        };
        let (items, error) = match listing {
            Ok(items) => (items, None),
            Err(failure) => (Vec::new(), Some(failure)),
        };
        let iterator = SimPartIterator {
            items,
            position: None,
            error,
        };
        self.track(iterator, AllocKind::PartIterator) as *mut UplinkPartIterator
    }

    unsafe fn part_iterator_next(&self, iterator: *mut UplinkPartIterator) -> bool {
        self.enter("part_iterator_next");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimPartIterator, AllocKind::PartIterator)
        else {
            return false;
        };
        if iterator.error.is_some() {
            return false;
        }
        advance(&mut iterator.position, iterator.items.len())
    }

    unsafe fn part_iterator_item(&self, iterator: *mut UplinkPartIterator) -> *mut UplinkPart {
        self.enter("part_iterator_item");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimPartIterator, AllocKind::PartIterator)
        else {
            return ptr::null_mut();
        };
        match iterator.position.and_then(|p| iterator.items.get(p)) {
            Some((number, part)) => self.alloc_part(*number, part),
            None => ptr::null_mut(),
        }
    }

    unsafe fn part_iterator_err(&self, iterator: *mut UplinkPartIterator) -> ErrorPtr {
        let injected = self.enter("part_iterator_err");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimPartIterator, AllocKind::PartIterator)
        else {
            return self.alloc_error(SimFailure::new(codes::INVALID_HANDLE, "iterator was released"));
        };
        self.alloc_error_opt(injected.or_else(|| iterator.error.clone()))
    }

    unsafe fn free_part_iterator(&self, iterator: *mut UplinkPartIterator) {
        self.enter("free_part_iterator");
        drop(self.release_box(iterator as *mut SimPartIterator, AllocKind::PartIterator));
    }

    unsafe fn list_uploads(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        options: *mut UplinkListUploadsOptions,
    ) -> *mut UplinkUploadIterator {
        let options = if options.is_null() {
            None
        } else {
            Some(*options)
        };
        let listing = match self.enter("list_uploads") {
            Some(failure) => Err(failure),
            None => self.handle_id(project).and_then(|id| {
                let bucket = read_str(bucket);
                let (prefix, cursor) = match &options {
                    Some(o) => (read_str(o.prefix), read_str(o.cursor)),
                    None => (String::new(), String::new()),
                };
                let store = lock(&self.store);
                store.open_project(id)?;
                store.list_uploads(&bucket, &prefix, &cursor)
            }),
        };
        let (items, error) = match listing {
            Ok(items) => (items, None),
            Err(failure) => (Vec::new(), Some(failure)),
        };
        let iterator = SimUploadIterator {
            items,
            position: None,
            error,
            system: options.map_or(false, |o| o.system),
        };
        self.track(iterator, AllocKind::UploadIterator) as *mut UplinkUploadIterator
    }

    unsafe fn upload_iterator_next(&self, iterator: *mut UplinkUploadIterator) -> bool {
        self.enter("upload_iterator_next");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimUploadIterator, AllocKind::UploadIterator)
        else {
            return false;
        };
        if iterator.error.is_some() {
            return false;
        }
        advance(&mut iterator.position, iterator.items.len())
    }

    unsafe fn upload_iterator_item(
        &self,
        iterator: *mut UplinkUploadIterator,
    ) -> *mut UplinkUploadInfo {
        self.enter("upload_iterator_item");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimUploadIterator, AllocKind::UploadIterator)
        else {
            return ptr::null_mut();
        };
        match iterator.position.and_then(|p| iterator.items.get(p)) {
            Some(entry) => self.alloc_upload_info(entry, iterator.system),
            None => ptr::null_mut(),
        }
    }

    unsafe fn upload_iterator_err(&self, iterator: *mut UplinkUploadIterator) -> ErrorPtr {
        let injected = self.enter("upload_iterator_err");
        let Some(iterator) =
            self.live_iterator(iterator as *mut SimUploadIterator, AllocKind::UploadIterator)
        else {
            return self.alloc_error(SimFailure::new(codes::INVALID_HANDLE, "iterator was released"));
        };
        self.alloc_error_opt(injected.or_else(|| iterator.error.clone()))
    }

    unsafe fn free_upload_iterator(&self, iterator: *mut UplinkUploadIterator) {
        self.enter("free_upload_iterator");
        drop(self.release_box(iterator as *mut SimUploadIterator, AllocKind::UploadIterator));
    }

    // ---- edge ------------------------------------------------------------

    unsafe fn edge_register_access(
        &self,
        config: EdgeConfig,
        access: *mut UplinkAccess,
        options: *mut EdgeRegisterAccessOptions,
    ) -> EdgeCredentialsResult {
        let result = match self.enter("edge_register_access") {
            Some(failure) => Err(failure),
            None => self.handle_id(access).and_then(|id| {
                let address = read_str(config.auth_service_address);
                if address != Self::AUTH_SERVICE {
                    return Err(SimFailure::new(
                        codes::EDGE_AUTH_DIAL_FAILED,
                        format!("dial tcp {}: connection refused", address),
                    ));
                }
                let visibility = if !options.is_null() && (*options).is_public {
                    "public"
                } else {
                    "private"
                };
                let store = lock(&self.store);
                let serialized = store.access(id)?.serialized.as_str();
                if store.revoked.contains(serialized) {
                    return Err(SimFailure::new(
                        codes::EDGE_REGISTER_ACCESS_FAILED,
                        "access grant was revoked",
                    ));
                }
                Ok((
                    format!("{:016x}", fingerprint(&[serialized, visibility])),
                    format!(
                        "{:016x}{:016x}",
                        fingerprint(&[serialized, "secret"]),
                        fingerprint(&[visibility, serialized])
                    ),
                ))
            }),
        };
        match result {
            Ok((access_key_id, secret_key)) => EdgeCredentialsResult {
                credentials: self.track(
                    EdgeCredentials {
                        access_key_id: c_string(&access_key_id).into_raw(),
                        secret_key: c_string(&secret_key).into_raw(),
                        endpoint: c_string(Self::GATEWAY).into_raw(),
                    },
                    AllocKind::Credentials,
                ),
                error: ptr::null_mut(),
            },
            Err(failure) => EdgeCredentialsResult {
                credentials: ptr::null_mut(),
                error: self.alloc_error(failure),
            },
        }
    }

    unsafe fn edge_join_share_url(
        &self,
        base_url: *const c_char,
        access_key_id: *const c_char,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut EdgeShareUrlOptions,
    ) -> UplinkStringResult {
        let result = match self.enter("edge_join_share_url") {
            Some(failure) => Err(failure),
            None => {
                let (base_url, access_key_id) = (read_str(base_url), read_str(access_key_id));
                let (bucket, key) = (read_str(bucket), read_str(key));
                let raw = !options.is_null() && (*options).raw;
                if base_url.is_empty() || access_key_id.is_empty() {
                    Err(SimFailure::new(
                        codes::INTERNAL,
                        "base URL and access key ID are required",
                    ))
                } else if bucket.is_empty() && !key.is_empty() {
                    Err(SimFailure::new(codes::INTERNAL, "bucket is required if key is specified"))
                } else if raw && key.is_empty() {
                    Err(SimFailure::new(codes::INTERNAL, "key is required for a raw download link"))
                } else {
                    let mut url = format!(
                        "{}/{}/{}",
                        base_url.trim_end_matches('/'),
                        if raw { "raw" } else { "s" },
                        access_key_id
                    );
                    for segment in [&bucket, &key] {
                        if !segment.is_empty() {
                            url.push('/');
                            url.push_str(segment);
                        }
                    }
                    Ok(url)
                }
            }
        };
        self.string_result(result)
    }

    // ---- release ---------------------------------------------------------

    unsafe fn free_error(&self, error: ErrorPtr) {
        if let Some(error) = self.release_box(error, AllocKind::Error) {
            if !error.message.is_null() {
                drop(CString::from_raw(error.message));
            }
        }
    }

    unsafe fn free_access_result(&self, result: UplinkAccessResult) {
        if let Some(access) = self.release_box(result.access, AllocKind::Access) {
            lock(&self.store).sessions.remove(&access.id());
        }
        self.free_error(result.error);
    }

    unsafe fn free_project_result(&self, result: UplinkProjectResult) {
        if let Some(project) = self.release_box(result.project, AllocKind::Project) {
            lock(&self.store).sessions.remove(&project.id());
        }
        self.free_error(result.error);
    }

    unsafe fn free_bucket_result(&self, result: UplinkBucketResult) {
        self.free_bucket(result.bucket);
        self.free_error(result.error);
    }

    unsafe fn free_bucket(&self, bucket: *mut UplinkBucket) {
        if let Some(bucket) = self.release_box(bucket, AllocKind::Bucket) {
            if !bucket.name.is_null() {
                drop(CString::from_raw(bucket.name));
            }
        }
    }

    unsafe fn free_object_result(&self, result: UplinkObjectResult) {
        self.free_object(result.object);
        self.free_error(result.error);
    }

    unsafe fn free_object(&self, object: *mut UplinkObject) {
        if let Some(object) = self.release_box(object, AllocKind::Object) {
            if !object.key.is_null() {
                drop(CString::from_raw(object.key));
            }
            reclaim_metadata(&object.custom);
        }
    }

    unsafe fn free_upload_result(&self, result: UplinkUploadResult) {
        if let Some(upload) = self.release_box(result.upload, AllocKind::Upload) {
            lock(&self.store).sessions.remove(&upload.id());
        }
        self.free_error(result.error);
    }

    unsafe fn free_download_result(&self, result: UplinkDownloadResult) {
        if let Some(download) = self.release_box(result.download, AllocKind::Download) {
            lock(&self.store).sessions.remove(&download.id());
        }
        self.free_error(result.error);
    }

    unsafe fn free_string_result(&self, result: UplinkStringResult) {
        if !result.string.is_null() && self.ledger().release(result.string as usize, AllocKind::String) {
            drop(CString::from_raw(result.string));
        }
        self.free_error(result.error);
    }

    unsafe fn free_encryption_key_result(&self, result: UplinkEncryptionKeyResult) {
        if let Some(key) = self.release_box(result.encryption_key, AllocKind::EncryptionKey) {
            lock(&self.store).sessions.remove(&key.id());
        }
        self.free_error(result.error);
    }

    unsafe fn free_upload_info_result(&self, result: UplinkUploadInfoResult) {
        self.free_upload_info(result.info);
        self.free_error(result.error);
    }

    unsafe fn free_upload_info(&self, info: *mut UplinkUploadInfo) {
        if let Some(info) = self.release_box(info, AllocKind::UploadInfo) {
            for raw in [info.upload_id, info.key] {
                if !raw.is_null() {
                    drop(CString::from_raw(raw));
                }
            }
            reclaim_metadata(&info.custom);
        }
    }

    unsafe fn free_commit_upload_result(&self, result: UplinkCommitUploadResult) {
        self.free_object(result.object);
        self.free_error(result.error);
    }

    unsafe fn free_part_upload_result(&self, result: UplinkPartUploadResult) {
        if let Some(part_upload) = self.release_box(result.part_upload, AllocKind::PartUpload) {
            lock(&self.store).sessions.remove(&part_upload.id());
        }
        self.free_error(result.error);
    }

    unsafe fn free_part_result(&self, result: UplinkPartResult) {
        self.free_part(result.part);
        self.free_error(result.error);
    }

    unsafe fn free_part(&self, part: *mut UplinkPart) {
        if let Some(part) = self.release_box(part, AllocKind::Part) {
            reclaim_bytes(part.etag, part.etag_length);
        }
    }

    unsafe fn edge_free_credentials_result(&self, result: EdgeCredentialsResult) {
        if let Some(credentials) = self.release_box(result.credentials, AllocKind::Credentials) {
            for raw in [credentials.access_key_id, credentials.secret_key, credentials.endpoint] {
                if !raw.is_null() {
                    drop(CString::from_raw(raw));
                }
            }
        }
        self.free_error(result.error);
    }
}
