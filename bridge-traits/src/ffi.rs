//! Fixed-layout records exchanged with the foreign storage library.
//!
//! Every type here mirrors the C ABI of `libuplink` field for field. Pointers
//! inside these records are owned by the foreign library and must be released
//! through the matching `free_*` entry point on [`ForeignLibrary`]; the bridge
//! never frees them with the Rust allocator.
//!
//! [`ForeignLibrary`]: crate::library::ForeignLibrary

use std::os::raw::{c_char, c_void};
use std::ptr;

/// Numeric error codes reported in [`UplinkError::code`].
///
/// These are a fixed external contract and are never renumbered.
pub mod codes {
    /// End of stream on a download read. Not an error class of its own.
    pub const EOF: i32 = -1;

    pub const INTERNAL: i32 = 0x02;
    pub const CANCELED: i32 = 0x03;
    pub const INVALID_HANDLE: i32 = 0x04;
    pub const TOO_MANY_REQUESTS: i32 = 0x05;
    pub const BANDWIDTH_LIMIT_EXCEEDED: i32 = 0x06;
    pub const STORAGE_LIMIT_EXCEEDED: i32 = 0x07;
    pub const SEGMENTS_LIMIT_EXCEEDED: i32 = 0x08;
    pub const PERMISSION_DENIED: i32 = 0x09;

    pub const BUCKET_NAME_INVALID: i32 = 0x10;
    pub const BUCKET_ALREADY_EXISTS: i32 = 0x11;
    pub const BUCKET_NOT_EMPTY: i32 = 0x12;
    pub const BUCKET_NOT_FOUND: i32 = 0x13;

    pub const OBJECT_KEY_INVALID: i32 = 0x20;
    pub const OBJECT_NOT_FOUND: i32 = 0x21;
    pub const UPLOAD_DONE: i32 = 0x22;

    pub const EDGE_AUTH_DIAL_FAILED: i32 = 0x30;
    pub const EDGE_REGISTER_ACCESS_FAILED: i32 = 0x31;
}

/// Opaque universe handle used by the foreign library to look up resources.
pub type ForeignId = usize;

macro_rules! handle_record {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name {
                pub _handle: ForeignId,
            }

            impl $name {
                pub fn from_id(id: ForeignId) -> Self {
                    Self { _handle: id }
                }
            }
        )*
    };
}

handle_record!(
    /// Serialized access grant.
    UplinkAccess,
    /// Open project session.
    UplinkProject,
    /// In-flight object upload.
    UplinkUpload,
    /// In-flight object download.
    UplinkDownload,
    /// Key derived by `uplink_derive_encryption_key`.
    UplinkEncryptionKey,
    /// One part of a multipart upload being written.
    UplinkPartUpload,
);

/// Opaque bucket iterator; only ever seen behind a pointer.
#[repr(C)]
pub struct UplinkBucketIterator {
    _private: [u8; 0],
}

/// Opaque object iterator; only ever seen behind a pointer.
#[repr(C)]
pub struct UplinkObjectIterator {
    _private: [u8; 0],
}

/// Opaque multipart part iterator.
#[repr(C)]
pub struct UplinkPartIterator {
    _private: [u8; 0],
}

/// Opaque pending-upload iterator.
#[repr(C)]
pub struct UplinkUploadIterator {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkError {
    pub code: i32,
    pub message: *mut c_char,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkAccessResult {
    pub access: *mut UplinkAccess,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkProjectResult {
    pub project: *mut UplinkProject,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkBucket {
    pub name: *mut c_char,
    /// Unix seconds; zero means unknown.
    pub created: i64,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkBucketResult {
    pub bucket: *mut UplinkBucket,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct UplinkSystemMetadata {
    pub created: i64,
    pub expires: i64,
    pub content_length: i64,
}

/// One custom metadata pair. Lengths are authoritative; the bytes are not
/// required to be NUL free.
#[repr(C)]
#[derive(Debug)]
pub struct UplinkCustomMetadataEntry {
    pub key: *mut c_char,
    pub key_length: usize,
    pub value: *mut c_char,
    pub value_length: usize,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkCustomMetadata {
    pub entries: *mut UplinkCustomMetadataEntry,
    pub count: usize,
}

impl UplinkCustomMetadata {
    pub fn empty() -> Self {
        Self {
            entries: ptr::null_mut(),
            count: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkObject {
    pub key: *mut c_char,
    pub is_prefix: bool,
    pub system: UplinkSystemMetadata,
    pub custom: UplinkCustomMetadata,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkObjectResult {
    pub object: *mut UplinkObject,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkUploadResult {
    pub upload: *mut UplinkUpload,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkDownloadResult {
    pub download: *mut UplinkDownload,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkWriteResult {
    pub bytes_written: usize,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkReadResult {
    pub bytes_read: usize,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkStringResult {
    pub string: *mut c_char,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UplinkConfig {
    pub user_agent: *const c_char,
    pub dial_timeout_milliseconds: i32,
    pub temp_directory: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UplinkListBucketsOptions {
    pub cursor: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UplinkListObjectsOptions {
    pub prefix: *const c_char,
    pub cursor: *const c_char,
    pub recursive: bool,
    pub system: bool,
    pub custom: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct UplinkUploadOptions {
    /// Unix seconds; zero means the object never expires.
    pub expires: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct UplinkDownloadOptions {
    pub offset: i64,
    /// Negative means "until the end of the object".
    pub length: i64,
}

/// Placeholder options record for `uplink_update_object_metadata`.
#[repr(C)]
#[derive(Debug, Default)]
pub struct UplinkUploadObjectMetadataOptions {
    _reserved: u8,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkEncryptionKeyResult {
    pub encryption_key: *mut UplinkEncryptionKey,
    pub error: *mut UplinkError,
}

/// Restrictions applied by `uplink_access_share`. Times are Unix seconds;
/// zero leaves the bound open.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct UplinkPermission {
    pub allow_download: bool,
    pub allow_upload: bool,
    pub allow_list: bool,
    pub allow_delete: bool,
    pub not_before: i64,
    pub not_after: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UplinkSharePrefix {
    pub bucket: *const c_char,
    /// Null or empty shares the whole bucket.
    pub prefix: *const c_char,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct UplinkCopyObjectOptions {
    _reserved: u8,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct UplinkMoveObjectOptions {
    _reserved: u8,
}

// ---- multipart ----------------------------------------------------------

#[repr(C)]
#[derive(Debug)]
pub struct UplinkUploadInfo {
    pub upload_id: *mut c_char,
    pub key: *mut c_char,
    pub is_prefix: bool,
    pub system: UplinkSystemMetadata,
    pub custom: UplinkCustomMetadata,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkUploadInfoResult {
    pub info: *mut UplinkUploadInfo,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkCommitUploadOptions {
    pub custom_metadata: UplinkCustomMetadata,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkCommitUploadResult {
    pub object: *mut UplinkObject,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkPartUploadResult {
    pub part_upload: *mut UplinkPartUpload,
    pub error: *mut UplinkError,
}

/// Etag bytes are length-delimited and not NUL terminated.
#[repr(C)]
#[derive(Debug)]
pub struct UplinkPart {
    pub part_number: u32,
    pub size: usize,
    pub modified: i64,
    pub etag: *mut c_char,
    pub etag_length: usize,
}

#[repr(C)]
#[derive(Debug)]
pub struct UplinkPartResult {
    pub part: *mut UplinkPart,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct UplinkListUploadPartsOptions {
    /// List parts numbered above this one.
    pub cursor: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UplinkListUploadsOptions {
    pub prefix: *const c_char,
    pub cursor: *const c_char,
    pub recursive: bool,
    pub system: bool,
    pub custom: bool,
}

// ---- edge ---------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EdgeConfig {
    pub auth_service_address: *const c_char,
    /// Null trusts the system roots.
    pub certificate_pem: *const c_char,
    pub insecure_unencrypted_connection: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeRegisterAccessOptions {
    pub is_public: bool,
}

#[repr(C)]
#[derive(Debug)]
pub struct EdgeCredentials {
    pub access_key_id: *mut c_char,
    pub secret_key: *mut c_char,
    pub endpoint: *mut c_char,
}

#[repr(C)]
#[derive(Debug)]
pub struct EdgeCredentialsResult {
    pub credentials: *mut EdgeCredentials,
    pub error: *mut UplinkError,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeShareUrlOptions {
    /// Link straight to the object data instead of the landing page.
    pub raw: bool,
}

pub type ErrorPtr = *mut UplinkError;
pub type BytesPtr = *mut c_void;
