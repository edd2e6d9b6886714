//! Conversion between foreign records and owned Rust values.
//!
//! Everything crossing the boundary is copied; no value produced here
//! borrows foreign memory.

use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_char;
use std::slice;

use bridge_traits::ffi::{
    EdgeCredentials as ForeignCredentials, UplinkBucket, UplinkCustomMetadata,
    UplinkCustomMetadataEntry, UplinkObject, UplinkPart, UplinkSystemMetadata, UplinkUploadInfo,
};
use chrono::serde::ts_seconds_option;
use chrono::{DateTime, TimeZone, Utc};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{BridgeError, Result};

/// A foreign timestamp in Unix seconds; zero means "not set".
pub fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    Utc.timestamp_opt(seconds, 0).single()
}

pub(crate) fn timestamp_seconds(value: Option<DateTime<Utc>>) -> i64 {
    value.map_or(0, |t| t.timestamp())
}

/// Copies a NUL-terminated foreign string. Null becomes the empty string.
///
/// # Safety
///
/// `value` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn string_from_foreign(value: *const c_char) -> String {
    if value.is_null() {
        return String::new();
    }
    CStr::from_ptr(value).to_string_lossy().into_owned()
}

/// Copies `length` bytes; the buffer is not scanned for a terminator.
///
/// # Safety
///
/// `data` must be null or valid for `length` bytes.
pub(crate) unsafe fn bytes_from_foreign(data: *const c_char, length: usize) -> Vec<u8> {
    if data.is_null() || length == 0 {
        return Vec::new();
    }
    slice::from_raw_parts(data as *const u8, length).to_vec()
}

/// Validates a string argument for the foreign side.
pub(crate) fn c_string(field: &str, value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| BridgeError::InvalidArgument(format!("{} must not contain NUL bytes", field)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(with = "ts_seconds_option")]
    pub created: Option<DateTime<Utc>>,
}

impl Bucket {
    /// # Safety
    ///
    /// `bucket` must be a live record produced by the foreign library.
    pub(crate) unsafe fn from_foreign(bucket: &UplinkBucket) -> Self {
        Self {
            name: string_from_foreign(bucket.name),
            created: timestamp(bucket.created),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    #[serde(with = "ts_seconds_option")]
    pub created: Option<DateTime<Utc>>,
    #[serde(with = "ts_seconds_option")]
    pub expires: Option<DateTime<Utc>>,
    pub content_length: i64,
}

impl From<&UplinkSystemMetadata> for SystemMetadata {
    fn from(system: &UplinkSystemMetadata) -> Self {
        Self {
            created: timestamp(system.created),
            expires: timestamp(system.expires),
            content_length: system.content_length,
        }
    }
}

/// User metadata attached to an object.
///
/// Keys and values are raw bytes. Inserting a key twice keeps its first
/// position and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomMetadata {
    entries: IndexMap<Vec<u8>, Vec<u8>>,
}

impl CustomMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        match self.entries.entry(key.into()) {
            Entry::Occupied(mut entry) => Some(entry.insert(value.into())),
            Entry::Vacant(entry) => {
                entry.insert(value.into());
                None
            }
        }
    }

    pub fn with(mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        self.entries.get(key.as_ref()).map(Vec::as_slice)
    }

    /// The value as UTF-8, if it is.
    pub fn get_str(&self, key: impl AsRef<[u8]>) -> Option<&str> {
        self.get(key).and_then(|value| std::str::from_utf8(value).ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Copies a foreign metadata array using the explicit entry lengths.
    ///
    /// # Safety
    ///
    /// `metadata` must describe `count` valid entries (or be empty).
    pub(crate) unsafe fn from_foreign(metadata: &UplinkCustomMetadata) -> Self {
        let mut custom = Self::new();
        if metadata.entries.is_null() {
            return custom;
        }
        for entry in slice::from_raw_parts(metadata.entries, metadata.count) {
            custom.insert(
                bytes_from_foreign(entry.key, entry.key_length),
                bytes_from_foreign(entry.value, entry.value_length),
            );
        }
        custom
    }

    /// Lends a foreign view of the entries for the duration of `f`.
    ///
    /// The foreign side only reads through the pointers.
    pub(crate) fn with_foreign<R>(&self, f: impl FnOnce(UplinkCustomMetadata) -> R) -> R {
        let mut entries: Vec<UplinkCustomMetadataEntry> = self
            .entries
            .iter()
            .map(|(key, value)| UplinkCustomMetadataEntry {
                key: key.as_ptr() as *mut c_char,
                key_length: key.len(),
                value: value.as_ptr() as *mut c_char,
                value_length: value.len(),
            })
            .collect();

        f(UplinkCustomMetadata {
            entries: if entries.is_empty() {
                std::ptr::null_mut()
            } else {
                entries.as_mut_ptr()
            },
            count: entries.len(),
        })
    }
}

impl<K: Into<Vec<u8>>, V: Into<Vec<u8>>> FromIterator<(K, V)> for CustomMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut custom = Self::new();
        for (key, value) in iter {
            custom.insert(key, value);
        }
        custom
    }
}

/// Serialized as a string map; non-UTF-8 bytes are replaced.
impl Serialize for CustomMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(&String::from_utf8_lossy(key), &String::from_utf8_lossy(value))?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub is_prefix: bool,
    pub system: SystemMetadata,
    pub custom: CustomMetadata,
}

impl ObjectInfo {
    /// # Safety
    ///
    /// `object` must be a live record produced by the foreign library.
    pub(crate) unsafe fn from_foreign(object: &UplinkObject) -> Self {
        Self {
            key: string_from_foreign(object.key),
            is_prefix: object.is_prefix,
            system: SystemMetadata::from(&object.system),
            custom: CustomMetadata::from_foreign(&object.custom),
        }
    }
}

/// A multipart upload that has been begun but not committed or aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    pub upload_id: String,
    pub key: String,
    pub is_prefix: bool,
    pub system: SystemMetadata,
    pub custom: CustomMetadata,
}

impl UploadInfo {
    /// # Safety
    ///
    /// `info` must be a live record produced by the foreign library.
    pub(crate) unsafe fn from_foreign(info: &UplinkUploadInfo) -> Self {
        Self {
            upload_id: string_from_foreign(info.upload_id),
            key: string_from_foreign(info.key),
            is_prefix: info.is_prefix,
            system: SystemMetadata::from(&info.system),
            custom: CustomMetadata::from_foreign(&info.custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartInfo {
    pub part_number: u32,
    pub size: usize,
    #[serde(with = "ts_seconds_option")]
    pub modified: Option<DateTime<Utc>>,
    pub etag: String,
}

impl PartInfo {
    /// # Safety
    ///
    /// `part` must be a live record produced by the foreign library.
    pub(crate) unsafe fn from_foreign(part: &UplinkPart) -> Self {
        let etag = bytes_from_foreign(part.etag, part.etag_length);
        Self {
            part_number: part.part_number,
            size: part.size,
            modified: timestamp(part.modified),
            etag: String::from_utf8_lossy(&etag).into_owned(),
        }
    }
}

/// S3-compatible credentials issued by an edge auth service.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub endpoint: String,
}

impl EdgeCredentials {
    /// # Safety
    ///
    /// `credentials` must be a live record produced by the foreign library.
    pub(crate) unsafe fn from_foreign(credentials: &ForeignCredentials) -> Self {
        Self {
            access_key_id: string_from_foreign(credentials.access_key_id),
            secret_key: string_from_foreign(credentials.secret_key),
            endpoint: string_from_foreign(credentials.endpoint),
        }
    }
}

impl fmt::Debug for EdgeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
