//! Allocation accounting.

use std::collections::HashMap;
use std::fmt;

/// What a live foreign pointer points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AllocKind {
    Error,
    String,
    Access,
    Project,
    Upload,
    Download,
    Bucket,
    Object,
    BucketIterator,
    ObjectIterator,
    EncryptionKey,
    PartUpload,
    UploadInfo,
    Part,
    PartIterator,
    UploadIterator,
    Credentials,
}

impl fmt::Display for AllocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Every allocation the simulator handed out and every free it received.
///
/// A free of a pointer that is not live (double free, foreign pointer, or a
/// free through the wrong function) is not performed; it is recorded as a
/// violation instead.
#[derive(Debug, Default)]
pub struct Ledger {
    live: HashMap<usize, AllocKind>,
    allocated: HashMap<AllocKind, u64>,
    freed: HashMap<AllocKind, u64>,
    violations: Vec<String>,
}

impl Ledger {
    pub(crate) fn track(&mut self, ptr: usize, kind: AllocKind) {
        self.live.insert(ptr, kind);
        *self.allocated.entry(kind).or_default() += 1;
    }

    /// Returns `true` when `ptr` was live as `kind` and is now released.
    pub(crate) fn release(&mut self, ptr: usize, kind: AllocKind) -> bool {
        match self.live.get(&ptr) {
            Some(live_kind) if *live_kind == kind => {
                self.live.remove(&ptr);
                *self.freed.entry(kind).or_default() += 1;
                true
            }
            Some(live_kind) => {
                let message = format!("{:#x} freed as {} but is a live {}", ptr, kind, live_kind);
                tracing::warn!(%message, "ledger violation");
                self.violations.push(message);
                false
            }
            None => {
                let message = format!("{:#x} freed as {} but is not live", ptr, kind);
                tracing::warn!(%message, "ledger violation");
                self.violations.push(message);
                false
            }
        }
    }

    pub(crate) fn is_live(&self, ptr: usize, kind: AllocKind) -> bool {
        self.live.get(&ptr) == Some(&kind)
    }

    pub(crate) fn violation(&mut self, message: String) {
        tracing::warn!(%message, "ledger violation");
        self.violations.push(message);
    }

    pub fn allocations(&self, kind: AllocKind) -> u64 {
        self.allocated.get(&kind).copied().unwrap_or(0)
    }

    pub fn frees(&self, kind: AllocKind) -> u64 {
        self.freed.get(&kind).copied().unwrap_or(0)
    }

    /// Number of `kind` pointers still outstanding.
    pub fn live(&self, kind: AllocKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    pub fn total_live(&self) -> usize {
        self.live.len()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// True when nothing leaked and nothing was freed twice.
    pub fn is_balanced(&self) -> bool {
        self.live.is_empty() && self.violations.is_empty()
    }
}
