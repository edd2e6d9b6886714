//! Typed exceptions projected from foreign error codes.
//!
//! Every foreign failure surfaces as a [`TypedException`]. Whether it "is a"
//! `BucketNotFoundError` is answered by [`TypedException::is_a`] against an
//! [`ExceptionClass`], which compares a kind tag and the [`Realm`] the class
//! table was bound to. No classes are synthesised at runtime.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

/// Class name of the umbrella type every typed exception derives from.
pub const UMBRELLA_CLASS: &str = "StorjError";

/// Name reported by exceptions built without an initialised registry.
pub const GENERIC_CLASS: &str = "Error";

/// Known foreign error codes. Discriminants are the wire values and must
/// never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(i32)]
pub enum ErrorKind {
    Internal = 0x02,
    Canceled = 0x03,
    InvalidHandle = 0x04,
    TooManyRequests = 0x05,
    BandwidthLimitExceeded = 0x06,
    StorageLimitExceeded = 0x07,
    SegmentsLimitExceeded = 0x08,
    PermissionDenied = 0x09,

    BucketNameInvalid = 0x10,
    BucketAlreadyExists = 0x11,
    BucketNotEmpty = 0x12,
    BucketNotFound = 0x13,

    ObjectKeyInvalid = 0x20,
    ObjectNotFound = 0x21,
    UploadDone = 0x22,

    EdgeAuthDialFailed = 0x30,
    EdgeRegisterAccessFailed = 0x31,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 17] = [
        ErrorKind::Internal,
        ErrorKind::Canceled,
        ErrorKind::InvalidHandle,
        ErrorKind::TooManyRequests,
        ErrorKind::BandwidthLimitExceeded,
        ErrorKind::StorageLimitExceeded,
        ErrorKind::SegmentsLimitExceeded,
        ErrorKind::PermissionDenied,
        ErrorKind::BucketNameInvalid,
        ErrorKind::BucketAlreadyExists,
        ErrorKind::BucketNotEmpty,
        ErrorKind::BucketNotFound,
        ErrorKind::ObjectKeyInvalid,
        ErrorKind::ObjectNotFound,
        ErrorKind::UploadDone,
        ErrorKind::EdgeAuthDialFailed,
        ErrorKind::EdgeRegisterAccessFailed,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::Internal => "InternalError",
            ErrorKind::Canceled => "CanceledError",
            ErrorKind::InvalidHandle => "InvalidHandleError",
            ErrorKind::TooManyRequests => "TooManyRequestsError",
            ErrorKind::BandwidthLimitExceeded => "BandwidthLimitExceededError",
            ErrorKind::StorageLimitExceeded => "StorageLimitExceededError",
            ErrorKind::SegmentsLimitExceeded => "SegmentsLimitExceededError",
            ErrorKind::PermissionDenied => "PermissionDeniedError",
            ErrorKind::BucketNameInvalid => "BucketNameInvalidError",
            ErrorKind::BucketAlreadyExists => "BucketAlreadyExistsError",
            ErrorKind::BucketNotEmpty => "BucketNotEmptyError",
            ErrorKind::BucketNotFound => "BucketNotFoundError",
            ErrorKind::ObjectKeyInvalid => "ObjectKeyInvalidError",
            ErrorKind::ObjectNotFound => "ObjectNotFoundError",
            ErrorKind::UploadDone => "UploadDoneError",
            ErrorKind::EdgeAuthDialFailed => "EdgeAuthDialFailedError",
            ErrorKind::EdgeRegisterAccessFailed => "EdgeRegisterAccessFailedError",
        }
    }

    /// Fixed description that prefixes the exception message.
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal error",
            ErrorKind::Canceled => "Operation canceled",
            ErrorKind::InvalidHandle => "Invalid handle",
            ErrorKind::TooManyRequests => "Too many requests",
            ErrorKind::BandwidthLimitExceeded => "Bandwidth limit exceeded",
            ErrorKind::StorageLimitExceeded => "Storage limit exceeded",
            ErrorKind::SegmentsLimitExceeded => "Segments limit exceeded",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::BucketNameInvalid => "Invalid bucket name",
            ErrorKind::BucketAlreadyExists => "Bucket already exists",
            ErrorKind::BucketNotEmpty => "Bucket is not empty",
            ErrorKind::BucketNotFound => "Bucket not found",
            ErrorKind::ObjectKeyInvalid => "Invalid object key",
            ErrorKind::ObjectNotFound => "Object not found",
            ErrorKind::UploadDone => "Upload already done",
            ErrorKind::EdgeAuthDialFailed => "Edge auth dial failed",
            ErrorKind::EdgeRegisterAccessFailed => "Edge register access failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.class_name(), self.code())
    }
}

/// Identity of an isolated execution sub-realm.
///
/// Class tables bound to different realms never satisfy each other's `is_a`
/// checks, the same way two sandboxes have distinct base exception types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Realm(u64);

static NEXT_REALM: AtomicU64 = AtomicU64::new(1);

impl Realm {
    /// The process default realm.
    pub const fn global() -> Self {
        Realm(0)
    }

    /// A fresh realm distinct from every other.
    pub fn isolated() -> Self {
        Realm(NEXT_REALM.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    pub fn is_global(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::global()
    }
}

/// One entry of the exception hierarchy, bound to a realm.
///
/// `kind == None` is the umbrella class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionClass {
    realm: Realm,
    kind: Option<ErrorKind>,
}

impl ExceptionClass {
    pub(crate) fn umbrella(realm: Realm) -> Self {
        Self { realm, kind: None }
    }

    pub(crate) fn for_kind(realm: Realm, kind: ErrorKind) -> Self {
        Self {
            realm,
            kind: Some(kind),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.map_or(UMBRELLA_CLASS, ErrorKind::class_name)
    }

    pub fn realm(&self) -> Realm {
        self.realm
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    pub fn is_umbrella(&self) -> bool {
        self.kind.is_none()
    }

    /// Builds an instance of this class.
    ///
    /// Subclasses embed `details` after their fixed description. The
    /// umbrella class carries `code` and `details` as given.
    pub(crate) fn instantiate(&self, code: i32, details: &str) -> TypedException {
        let (code, message) = match self.kind {
            Some(kind) if details.is_empty() => (kind.code(), kind.description().to_string()),
            Some(kind) => (kind.code(), format!("{}: {}", kind.description(), details)),
            None if details.is_empty() => (code, "Unknown error".to_string()),
            None => (code, details.to_string()),
        };

        TypedException {
            lineage: Lineage::Typed(*self),
            code,
            message,
            details: (!details.is_empty()).then(|| details.to_string()),
            properties: IndexMap::new(),
            partial: None,
        }
    }
}

/// Where an exception sits in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lineage {
    Typed(ExceptionClass),
    /// Built while no class table was bound; a plain base exception.
    Generic,
}

/// A projected foreign failure.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedException {
    lineage: Lineage,
    code: i32,
    message: String,
    details: Option<String>,
    properties: IndexMap<String, Value>,
    /// Bytes delivered before the failure; not serialized.
    partial: Option<Bytes>,
}

impl TypedException {
    /// A base exception outside any hierarchy.
    pub fn generic(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            lineage: Lineage::Generic,
            code,
            message: if message.is_empty() {
                "Unknown error".to_string()
            } else {
                message
            },
            details: None,
            properties: IndexMap::new(),
            partial: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.lineage {
            Lineage::Typed(class) => class.name(),
            Lineage::Generic => GENERIC_CLASS,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn lineage(&self) -> Lineage {
        self.lineage
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self.lineage {
            Lineage::Typed(class) => class.kind(),
            Lineage::Generic => None,
        }
    }

    /// The identity check: true when this exception belongs to `class`,
    /// either as that exact subclass or through the umbrella.
    pub fn is_a(&self, class: &ExceptionClass) -> bool {
        match self.lineage {
            Lineage::Typed(own) => {
                own.realm == class.realm && (class.kind.is_none() || class.kind == own.kind)
            }
            Lineage::Generic => false,
        }
    }

    /// Attaches an extra named property, e.g. `bytesRead` on read failures.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub(crate) fn with_partial(mut self, data: Bytes) -> Self {
        self.partial = Some(data);
        self
    }

    /// Data a failed read delivered before it stopped.
    pub fn partial_data(&self) -> Option<&Bytes> {
        self.partial.as_ref()
    }
}

impl fmt::Display for TypedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message)
    }
}

impl std::error::Error for TypedException {}

impl Serialize for TypedException {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4 + self.properties.len()))?;
        map.serialize_entry("name", self.name())?;
        map.serialize_entry("code", &self.code)?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry("details", &self.details)?;
        for (name, value) in &self.properties {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
