//! The simulated satellite: buckets, objects and open sessions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bridge_traits::ffi::codes;

/// A failure the simulator reports through an `UplinkError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFailure {
    pub code: i32,
    pub message: String,
}

impl SimFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub(crate) type SimResult<T> = Result<T, SimFailure>;

#[derive(Debug, Clone)]
pub(crate) struct StoredObject {
    pub data: Vec<u8>,
    pub created: i64,
    pub expires: i64,
    pub custom: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StoredBucket {
    pub created: i64,
    pub objects: BTreeMap<String, StoredObject>,
}

/// Settings as received through an `UplinkConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSettings {
    pub user_agent: Option<String>,
    pub dial_timeout_milliseconds: i32,
    pub temp_directory: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct AccessRecord {
    pub satellite: String,
    pub serialized: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ProjectRecord {
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct UploadRecord {
    pub bucket: String,
    pub key: String,
    pub buffer: Vec<u8>,
    pub custom: Vec<(Vec<u8>, Vec<u8>)>,
    pub expires: i64,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct DownloadRecord {
    pub key: String,
    pub object: StoredObject,
    pub position: usize,
    pub end: usize,
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PartUploadRecord {
    pub upload_id: String,
    pub part_number: u32,
    pub buffer: Vec<u8>,
    pub etag: Vec<u8>,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredPart {
    pub data: Vec<u8>,
    pub etag: Vec<u8>,
    pub modified: i64,
}

/// A multipart upload between `begin_upload` and commit or abort.
#[derive(Debug, Clone)]
pub(crate) struct PendingUpload {
    pub bucket: String,
    pub key: String,
    pub created: i64,
    pub expires: i64,
    pub parts: BTreeMap<u32, StoredPart>,
}

#[derive(Debug, Clone)]
pub(crate) struct UploadEntry {
    pub upload_id: String,
    pub key: String,
    pub created: i64,
    pub expires: i64,
}

#[derive(Debug, Clone)]
pub(crate) enum Session {
    Access(AccessRecord),
    Project(ProjectRecord),
    Upload(UploadRecord),
    Download(DownloadRecord),
    EncryptionKey(Vec<u8>),
    PartUpload(PartUploadRecord),
}

/// One listing entry, computed eagerly when an iterator is created.
#[derive(Debug, Clone)]
pub(crate) struct ObjectEntry {
    pub key: String,
    pub is_prefix: bool,
    pub object: Option<StoredObject>,
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    pub buckets: BTreeMap<String, StoredBucket>,
    pub sessions: HashMap<usize, Session>,
    pub next_id: usize,
    pub last_project_settings: Option<ProjectSettings>,
    /// Settings received by `config_request_access_with_passphrase`.
    pub last_access_settings: Option<ProjectSettings>,
    /// Multipart uploads keyed by upload id.
    pub pending: BTreeMap<String, PendingUpload>,
    pub uploads_started: u64,
    /// Serialized grants revoked through `revoke_access`.
    pub revoked: BTreeSet<String>,
}

impl Store {
    pub fn insert_session(&mut self, session: Session) -> usize {
        self.next_id += 1;
        self.sessions.insert(self.next_id, session);
        self.next_id
    }

    pub fn access(&self, id: usize) -> SimResult<&AccessRecord> {
        match self.sessions.get(&id) {
            Some(Session::Access(record)) => Ok(record),
            _ => Err(invalid_handle("access")),
        }
    }

    /// An access that may still open projects.
    pub fn usable_access(&self, id: usize) -> SimResult<&AccessRecord> {
        let record = self.access(id)?;
        if self.revoked.contains(&record.serialized) {
            return Err(SimFailure::new(codes::PERMISSION_DENIED, "uplink: access revoked"));
        }
        Ok(record)
    }

    pub fn encryption_key(&self, id: usize) -> SimResult<&[u8]> {
        match self.sessions.get(&id) {
            Some(Session::EncryptionKey(key)) => Ok(key),
            _ => Err(invalid_handle("encryption key")),
        }
    }

    pub fn part_upload_mut(&mut self, id: usize) -> SimResult<&mut PartUploadRecord> {
        match self.sessions.get_mut(&id) {
            Some(Session::PartUpload(record)) => Ok(record),
            _ => Err(invalid_handle("part upload")),
        }
    }

    pub fn open_project(&self, id: usize) -> SimResult<()> {
        match self.sessions.get(&id) {
            Some(Session::Project(record)) if !record.closed => Ok(()),
            Some(Session::Project(_)) => Err(SimFailure::new(codes::INTERNAL, "project closed")),
            _ => Err(invalid_handle("project")),
        }
    }

    pub fn project_mut(&mut self, id: usize) -> SimResult<&mut ProjectRecord> {
        match self.sessions.get_mut(&id) {
            Some(Session::Project(record)) => Ok(record),
            _ => Err(invalid_handle("project")),
        }
    }

    pub fn upload_mut(&mut self, id: usize) -> SimResult<&mut UploadRecord> {
        match self.sessions.get_mut(&id) {
            Some(Session::Upload(record)) => Ok(record),
            _ => Err(invalid_handle("upload")),
        }
    }

    pub fn download_mut(&mut self, id: usize) -> SimResult<&mut DownloadRecord> {
        match self.sessions.get_mut(&id) {
            Some(Session::Download(record)) => Ok(record),
            _ => Err(invalid_handle("download")),
        }
    }

    pub fn bucket(&self, name: &str) -> SimResult<&StoredBucket> {
        validate_bucket_name(name)?;
        self.buckets
            .get(name)
            .ok_or_else(|| SimFailure::new(codes::BUCKET_NOT_FOUND, format!("bucket not found: {}", name)))
    }

    pub fn bucket_mut(&mut self, name: &str) -> SimResult<&mut StoredBucket> {
        validate_bucket_name(name)?;
        self.buckets
            .get_mut(name)
            .ok_or_else(|| SimFailure::new(codes::BUCKET_NOT_FOUND, format!("bucket not found: {}", name)))
    }

    pub fn object(&self, bucket: &str, key: &str) -> SimResult<&StoredObject> {
        let bucket = self.bucket(bucket)?;
        validate_object_key(key)?;
        bucket
            .objects
            .get(key)
            .ok_or_else(|| SimFailure::new(codes::OBJECT_NOT_FOUND, format!("object not found: {}", key)))
    }

    pub fn begin_upload(&mut self, bucket: &str, key: &str, expires: i64) -> SimResult<UploadEntry> {
        self.bucket(bucket)?;
        validate_object_key(key)?;
        self.uploads_started += 1;
        let entry = UploadEntry {
            upload_id: format!("upload-{:06}", self.uploads_started),
            key: key.to_string(),
            created: chrono::Utc::now().timestamp(),
            expires,
        };
        self.pending.insert(
            entry.upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                created: entry.created,
                expires,
                parts: BTreeMap::new(),
            },
        );
        Ok(entry)
    }

    /// The pending upload `upload_id`, which must belong to `bucket`/`key`.
    pub fn pending_mut(
        &mut self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> SimResult<&mut PendingUpload> {
        self.bucket(bucket)?;
        validate_object_key(key)?;
        match self.pending.get_mut(upload_id) {
            Some(pending) if pending.bucket == bucket && pending.key == key => Ok(pending),
            _ => Err(SimFailure::new(
                codes::INTERNAL,
                format!("uplink: upload ID invalid: {:?}", upload_id),
            )),
        }
    }

    pub fn list_uploads(&self, bucket: &str, prefix: &str, cursor: &str) -> SimResult<Vec<UploadEntry>> {
        self.bucket(bucket)?;
        let mut entries: Vec<UploadEntry> = self
            .pending
            .iter()
            .filter(|(_, p)| p.bucket == bucket && p.key.starts_with(prefix) && p.key.as_str() > cursor)
            .map(|(upload_id, p)| UploadEntry {
                upload_id: upload_id.clone(),
                key: p.key.clone(),
                created: p.created,
                expires: p.expires,
            })
            .collect();
        entries.sort_by(|a, b| (&a.key, &a.upload_id).cmp(&(&b.key, &b.upload_id)));
        Ok(entries)
    }

    /// Copies (or moves) an object; the target bucket must exist.
    pub fn relocate(
        &mut self,
        old_bucket: &str,
        old_key: &str,
        new_bucket: &str,
        new_key: &str,
        keep_source: bool,
    ) -> SimResult<StoredObject> {
        let mut object = self.object(old_bucket, old_key)?.clone();
        self.bucket(new_bucket)?;
        validate_object_key(new_key)?;
        if keep_source {
            object.created = chrono::Utc::now().timestamp();
        } else {
            self.bucket_mut(old_bucket)?.objects.remove(old_key);
        }
        self.bucket_mut(new_bucket)?
            .objects
            .insert(new_key.to_string(), object.clone());
        Ok(object)
    }

    pub fn list_buckets(&self, cursor: &str) -> Vec<(String, i64)> {
        self.buckets
            .iter()
            .filter(|(name, _)| name.as_str() > cursor)
            .map(|(name, bucket)| (name.clone(), bucket.created))
            .collect()
    }

    pub fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: &str,
        recursive: bool,
    ) -> SimResult<Vec<ObjectEntry>> {
        let bucket = self.bucket(bucket)?;
        let mut entries: Vec<ObjectEntry> = Vec::new();

        for (key, object) in bucket.objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if key.as_str() <= cursor {
                continue;
            }

            let rest = &key[prefix.len()..];
            match rest.find('/') {
                Some(slash) if !recursive => {
                    let collapsed = format!("{}{}", prefix, &rest[..=slash]);
                    if entries.last().map(|e| e.key.as_str()) != Some(collapsed.as_str()) {
                        entries.push(ObjectEntry {
                            key: collapsed,
                            is_prefix: true,
                            object: None,
                        });
                    }
                }
                _ => entries.push(ObjectEntry {
                    key: key.clone(),
                    is_prefix: false,
                    object: Some(object.clone()),
                }),
            }
        }

        Ok(entries)
    }
}

fn invalid_handle(kind: &str) -> SimFailure {
    SimFailure::new(codes::INVALID_HANDLE, format!("invalid {} handle", kind))
}

pub(crate) fn validate_bucket_name(name: &str) -> SimResult<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if name.len() < 3 || name.len() > 63 || !valid_chars {
        return Err(SimFailure::new(
            codes::BUCKET_NAME_INVALID,
            format!("invalid bucket name: {:?}", name),
        ));
    }
    Ok(())
}

pub(crate) fn validate_object_key(key: &str) -> SimResult<()> {
    if key.is_empty() {
        return Err(SimFailure::new(codes::OBJECT_KEY_INVALID, "object key is empty"));
    }
    Ok(())
}
