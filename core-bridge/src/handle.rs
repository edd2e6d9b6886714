//! # Handle Registry
//!
//! A [`Handle`] is the host's token for one foreign resource. The resource
//! itself lives in a slot of the [`HandleRegistry`] and is freed exactly
//! once, by whichever comes first:
//!
//! - an explicit [`Handle::close`] / [`HandleRegistry::release`], or
//! - dropping the `Handle` (the finalization path).
//!
//! The second trigger finds the slot released and does nothing.
//!
//! Tasks that pass a resource to the foreign library hold a [`Lease`] on its
//! slot for the duration of the call. Releasing a leased slot marks it
//! released immediately (later unwraps fail) and defers the foreign free until
//! the last lease is returned.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bridge_traits::ffi::*;
use bridge_traits::ForeignLibrary;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{BridgeError, Result};
use crate::foreign::{Foreign, ForeignResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HandleKind {
    Access,
    Project,
    Upload,
    Download,
    BucketIterator,
    ObjectIterator,
    EncryptionKey,
    PartUpload,
    PartIterator,
    UploadIterator,
}

impl HandleKind {
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Access => "Access",
            HandleKind::Project => "Project",
            HandleKind::Upload => "Upload",
            HandleKind::Download => "Download",
            HandleKind::BucketIterator => "BucketIterator",
            HandleKind::ObjectIterator => "ObjectIterator",
            HandleKind::EncryptionKey => "EncryptionKey",
            HandleKind::PartUpload => "PartUpload",
            HandleKind::PartIterator => "PartIterator",
            HandleKind::UploadIterator => "UploadIterator",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The foreign allocation a handle owns.
#[derive(Debug)]
pub enum Resource {
    Access(UplinkAccessResult),
    Project(UplinkProjectResult),
    Upload(UplinkUploadResult),
    Download(UplinkDownloadResult),
    BucketIterator(*mut UplinkBucketIterator),
    ObjectIterator(*mut UplinkObjectIterator),
    EncryptionKey(UplinkEncryptionKeyResult),
    PartUpload(UplinkPartUploadResult),
    PartIterator(*mut UplinkPartIterator),
    UploadIterator(*mut UplinkUploadIterator),
}

impl Resource {
    pub fn kind(&self) -> HandleKind {
        match self {
            Resource::Access(_) => HandleKind::Access,
            Resource::Project(_) => HandleKind::Project,
            Resource::Upload(_) => HandleKind::Upload,
            Resource::Download(_) => HandleKind::Download,
            Resource::BucketIterator(_) => HandleKind::BucketIterator,
            Resource::ObjectIterator(_) => HandleKind::ObjectIterator,
            Resource::EncryptionKey(_) => HandleKind::EncryptionKey,
            Resource::PartUpload(_) => HandleKind::PartUpload,
            Resource::PartIterator(_) => HandleKind::PartIterator,
            Resource::UploadIterator(_) => HandleKind::UploadIterator,
        }
    }

    /// Address of the record the foreign functions take.
    pub fn foreign_id(&self) -> usize {
        match self {
            Resource::Access(r) => r.access as usize,
            Resource::Project(r) => r.project as usize,
            Resource::Upload(r) => r.upload as usize,
            Resource::Download(r) => r.download as usize,
            Resource::BucketIterator(p) => *p as usize,
            Resource::ObjectIterator(p) => *p as usize,
            Resource::EncryptionKey(r) => r.encryption_key as usize,
            Resource::PartUpload(r) => r.part_upload as usize,
            Resource::PartIterator(p) => *p as usize,
            Resource::UploadIterator(p) => *p as usize,
        }
    }
}

impl ForeignResource for Resource {
    unsafe fn release(self, library: &dyn ForeignLibrary) {
        match self {
            Resource::Access(r) => r.release(library),
            Resource::Project(r) => r.release(library),
            Resource::Upload(r) => r.release(library),
            Resource::Download(r) => r.release(library),
            Resource::BucketIterator(p) => p.release(library),
            Resource::ObjectIterator(p) => p.release(library),
            Resource::EncryptionKey(r) => r.release(library),
            Resource::PartUpload(r) => r.release(library),
            Resource::PartIterator(p) => p.release(library),
            Resource::UploadIterator(p) => p.release(library),
        }
    }
}

struct Slot {
    generation: u32,
    occupied: bool,
    kind: HandleKind,
    foreign_id: usize,
    owned: Option<Foreign<Resource>>,
    released: bool,
    token_alive: bool,
    leases: usize,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            generation: 0,
            occupied: false,
            kind: HandleKind::Access,
            foreign_id: 0,
            owned: None,
            released: false,
            token_alive: false,
            leases: 0,
        }
    }

    /// Reclaims the slot once neither the token nor a lease refers to it.
    fn try_vacate(&mut self) -> bool {
        if self.occupied && !self.token_alive && self.leases == 0 {
            self.occupied = false;
            self.foreign_id = 0;
            return true;
        }
        false
    }
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<usize>,
    released: u64,
}

impl Slots {
    fn get(&mut self, index: usize, generation: u32) -> Option<&mut Slot> {
        self.entries
            .get_mut(index)
            .filter(|slot| slot.occupied && slot.generation == generation)
    }

    fn vacate(&mut self, index: usize) {
        if let Some(slot) = self.entries.get_mut(index) {
            if slot.try_vacate() {
                self.free.push(index);
            }
        }
    }
}

/// Slot table shared by every handle of one bridge.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Slot updates are single assignments; a panic elsewhere cannot leave
        // one half-written.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wraps a foreign resource in a new handle.
    ///
    /// `owned`, when given, is freed on release; its kind must match `kind`.
    pub fn wrap(
        &self,
        kind: HandleKind,
        foreign_id: usize,
        owned: Option<Foreign<Resource>>,
    ) -> Result<Handle> {
        if let Some(resource) = &owned {
            if resource.get().kind() != kind {
                return Err(BridgeError::InvalidHandle(format!(
                    "cannot wrap a {} resource as {}",
                    resource.get().kind(),
                    kind
                )));
            }
        }

        let mut slots = self.lock();
        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                slots.entries.try_reserve(1).map_err(|e| {
                    BridgeError::OutOfMemory(format!("cannot allocate {} handle: {}", kind, e))
                })?;
                slots.free.try_reserve(1).map_err(|e| {
                    BridgeError::OutOfMemory(format!("cannot allocate {} handle: {}", kind, e))
                })?;
                slots.entries.push(Slot::vacant());
                slots.entries.len() - 1
            }
        };

        let slot = &mut slots.entries[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.occupied = true;
        slot.kind = kind;
        slot.foreign_id = foreign_id;
        slot.owned = owned;
        slot.released = false;
        slot.token_alive = true;
        slot.leases = 0;
        let generation = slot.generation;
        drop(slots);

        debug!(kind = %kind, index, "Created handle");

        Ok(Handle {
            registry: self.clone(),
            index,
            generation,
            kind,
        })
    }

    /// Whether `handle` was issued by this registry.
    pub fn owns(&self, handle: &Handle) -> bool {
        Arc::ptr_eq(&self.slots, &handle.registry.slots)
    }

    fn ensure_owned(&self, handle: &Handle) -> Result<()> {
        if self.owns(handle) {
            Ok(())
        } else {
            Err(BridgeError::InvalidHandle(format!(
                "{} handle belongs to another bridge",
                handle.kind
            )))
        }
    }

    fn check<'a>(
        slots: &'a mut Slots,
        handle: &Handle,
        expected: HandleKind,
    ) -> Result<&'a mut Slot> {
        let slot = slots
            .get(handle.index, handle.generation)
            .ok_or_else(|| BridgeError::InvalidHandle(format!("stale {} handle", handle.kind)))?;

        if slot.kind != expected {
            return Err(BridgeError::InvalidHandle(format!(
                "expected {} handle, got {}",
                expected, slot.kind
            )));
        }
        if slot.released {
            return Err(BridgeError::InvalidHandle(format!(
                "{} handle was released",
                expected
            )));
        }
        if slot.foreign_id == 0 {
            return Err(BridgeError::InvalidHandle(format!("null {} handle", expected)));
        }
        Ok(slot)
    }

    /// The foreign id behind `handle`, after checking its kind.
    pub fn unwrap(&self, handle: &Handle, expected: HandleKind) -> Result<usize> {
        self.ensure_owned(handle)?;
        let mut slots = self.lock();
        Self::check(&mut slots, handle, expected).map(|slot| slot.foreign_id)
    }

    /// Like [`unwrap`](Self::unwrap), and keeps the resource alive until the
    /// returned lease is dropped.
    pub fn lease(&self, handle: &Handle, expected: HandleKind) -> Result<Lease> {
        self.ensure_owned(handle)?;
        let mut slots = self.lock();
        let slot = Self::check(&mut slots, handle, expected)?;
        slot.leases += 1;
        Ok(Lease {
            registry: self.clone(),
            index: handle.index,
            generation: handle.generation,
            kind: expected,
            foreign_id: slot.foreign_id,
        })
    }

    /// Releases the resource behind `handle`. Returns `true` when this call
    /// performed the release; later calls are no-ops returning `false`.
    pub fn release(&self, handle: &Handle) -> bool {
        if !self.owns(handle) {
            return false;
        }
        let freed = {
            let mut slots = self.lock();
            let Some(slot) = slots.get(handle.index, handle.generation) else {
                return false;
            };
            if slot.released {
                trace!(kind = %slot.kind, "Handle already released");
                return false;
            }
            slot.released = true;
            let freed = if slot.leases == 0 { slot.owned.take() } else { None };
            if slot.leases > 0 {
                debug!(kind = %slot.kind, leases = slot.leases, "Deferring release until in-flight calls finish");
            }
            slots.released += 1;
            freed
        };

        if freed.is_some() {
            debug!(kind = %handle.kind, "Released foreign resource");
        }
        drop(freed);
        true
    }

    /// Releases the handle and hands its owned resource to the caller instead
    /// of freeing it.
    ///
    /// Used by operations that free the resource themselves on a worker
    /// thread; the returned guard still frees it if that never happens.
    pub fn detach(&self, handle: &Handle, expected: HandleKind) -> Result<Option<Foreign<Resource>>> {
        self.ensure_owned(handle)?;
        let mut slots = self.lock();
        let slot = Self::check(&mut slots, handle, expected)?;
        if slot.leases > 0 {
            return Err(BridgeError::InvalidHandle(format!(
                "{} handle is in use by another operation",
                expected
            )));
        }
        slot.released = true;
        let owned = slot.owned.take();
        slots.released += 1;
        Ok(owned)
    }

    pub fn is_released(&self, handle: &Handle) -> bool {
        if !self.owns(handle) {
            return true;
        }
        let mut slots = self.lock();
        slots
            .get(handle.index, handle.generation)
            .map_or(true, |slot| slot.released)
    }

    /// Handles whose slot has not been reclaimed yet.
    pub fn len(&self) -> usize {
        self.lock().entries.iter().filter(|slot| slot.occupied).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles not yet released.
    pub fn live(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|slot| slot.occupied && !slot.released)
            .count()
    }

    /// Total number of releases performed.
    pub fn releases(&self) -> u64 {
        self.lock().released
    }

    fn finalize(&self, index: usize, generation: u32, kind: HandleKind) {
        let freed = {
            let mut slots = self.lock();
            let Some(slot) = slots.get(index, generation) else {
                return;
            };
            slot.token_alive = false;
            let mut freed = None;
            if !slot.released {
                slot.released = true;
                if slot.leases == 0 {
                    freed = slot.owned.take();
                }
                slots.released += 1;
                trace!(kind = %kind, "Handle finalized before explicit close");
            }
            slots.vacate(index);
            freed
        };
        drop(freed);
    }

    fn return_lease(&self, index: usize, generation: u32) {
        let freed = {
            let mut slots = self.lock();
            let Some(slot) = slots.get(index, generation) else {
                return;
            };
            slot.leases -= 1;
            let freed = if slot.leases == 0 && slot.released {
                slot.owned.take()
            } else {
                None
            };
            slots.vacate(index);
            freed
        };
        if freed.is_some() {
            debug!("Released foreign resource after last in-flight call");
        }
        drop(freed);
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("handles", &self.len())
            .field("live", &self.live())
            .finish()
    }
}

/// Host-side token for one foreign resource. Not `Clone`: there is exactly
/// one owner, and dropping it releases the resource if nothing else did.
pub struct Handle {
    registry: HandleRegistry,
    index: usize,
    generation: u32,
    kind: HandleKind,
}

impl Handle {
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Explicit release. Returns `false` if the handle was already released.
    pub fn close(&self) -> bool {
        self.registry.release(self)
    }

    pub fn is_released(&self) -> bool {
        self.registry.is_released(self)
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.registry.finalize(self.index, self.generation, self.kind);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Pins a live slot while a foreign call uses its resource.
pub struct Lease {
    registry: HandleRegistry,
    index: usize,
    generation: u32,
    kind: HandleKind,
    foreign_id: usize,
}

impl Lease {
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn foreign_id(&self) -> usize {
        self.foreign_id
    }

    pub(crate) fn as_ptr<T>(&self) -> *mut T {
        self.foreign_id as *mut T
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.return_lease(self.index, self.generation);
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("kind", &self.kind)
            .field("foreign_id", &format_args!("{:#x}", self.foreign_id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let registry = HandleRegistry::new();
        for (kind, id) in [
            (HandleKind::Access, 1usize),
            (HandleKind::Project, 0xdead_beef),
            (HandleKind::ObjectIterator, usize::MAX),
        ] {
            let handle = registry.wrap(kind, id, None).unwrap();
            assert_eq!(registry.unwrap(&handle, kind).unwrap(), id);
        }
    }

    #[test]
    fn test_wrong_kind_is_invalid_handle() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap(HandleKind::Project, 42, None).unwrap();

        let err = registry.unwrap(&handle, HandleKind::Access).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidHandle(ref m) if m.contains("expected Access")));
    }

    #[test]
    fn test_null_id_is_invalid_handle() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap(HandleKind::Upload, 0, None).unwrap();
        assert!(matches!(
            registry.unwrap(&handle, HandleKind::Upload),
            Err(BridgeError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap(HandleKind::Download, 7, None).unwrap();

        assert!(handle.close());
        assert!(!handle.close());
        assert!(!registry.release(&handle));
        assert!(registry.unwrap(&handle, HandleKind::Download).is_err());
        assert_eq!(registry.releases(), 1);
    }

    #[test]
    fn test_slot_reclaimed_on_drop_and_reused_with_new_generation() {
        let registry = HandleRegistry::new();
        let first = registry.wrap(HandleKind::Access, 1, None).unwrap();
        let first_generation = first.generation;
        drop(first);
        assert!(registry.is_empty());

        let second = registry.wrap(HandleKind::Access, 2, None).unwrap();
        assert_eq!(second.index, 0);
        assert_ne!(second.generation, first_generation);
    }

    #[test]
    fn test_lease_keeps_slot_until_returned() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap(HandleKind::Project, 9, None).unwrap();
        let lease = registry.lease(&handle, HandleKind::Project).unwrap();

        assert!(handle.close());
        drop(handle);
        assert_eq!(registry.len(), 1);
        assert_eq!(lease.foreign_id(), 9);

        drop(lease);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_detach_refuses_leased_handle() {
        let registry = HandleRegistry::new();
        let handle = registry.wrap(HandleKind::BucketIterator, 5, None).unwrap();
        let _lease = registry.lease(&handle, HandleKind::BucketIterator).unwrap();

        assert!(registry.detach(&handle, HandleKind::BucketIterator).is_err());
    }

    #[test]
    fn test_handle_from_other_registry_is_rejected() {
        let ours = HandleRegistry::new();
        let theirs = HandleRegistry::new();
        let handle = theirs.wrap(HandleKind::Access, 3, None).unwrap();

        assert!(!ours.owns(&handle));
        assert!(matches!(
            ours.unwrap(&handle, HandleKind::Access),
            Err(BridgeError::InvalidHandle(_))
        ));
        assert!(!ours.release(&handle));
        assert!(!handle.is_released());
    }
}
