//! Ownership of memory allocated by the foreign library.

use std::fmt;
use std::sync::Arc;

use bridge_traits::ffi::*;
use bridge_traits::ForeignLibrary;

/// Something the foreign library allocated and must free itself.
pub trait ForeignResource {
    /// Hands the resource back through its matching `free_*` function.
    ///
    /// # Safety
    ///
    /// `self` must have been produced by `library` and not freed yet.
    unsafe fn release(self, library: &dyn ForeignLibrary);
}

macro_rules! results {
    ($($ty:ty => $free:ident),* $(,)?) => {
        $(
            impl ForeignResource for $ty {
                unsafe fn release(self, library: &dyn ForeignLibrary) {
                    library.$free(self);
                }
            }
        )*
    };
}

results!(
    UplinkAccessResult => free_access_result,
    UplinkProjectResult => free_project_result,
    UplinkBucketResult => free_bucket_result,
    UplinkObjectResult => free_object_result,
    UplinkUploadResult => free_upload_result,
    UplinkDownloadResult => free_download_result,
    UplinkStringResult => free_string_result,
    UplinkEncryptionKeyResult => free_encryption_key_result,
    UplinkUploadInfoResult => free_upload_info_result,
    UplinkCommitUploadResult => free_commit_upload_result,
    UplinkPartUploadResult => free_part_upload_result,
    UplinkPartResult => free_part_result,
    EdgeCredentialsResult => edge_free_credentials_result,
);

macro_rules! pointers {
    ($($ty:ty => $free:ident),* $(,)?) => {
        $(
            impl ForeignResource for *mut $ty {
                unsafe fn release(self, library: &dyn ForeignLibrary) {
                    if !self.is_null() {
                        library.$free(self);
                    }
                }
            }
        )*
    };
}

pointers!(
    UplinkError => free_error,
    UplinkBucket => free_bucket,
    UplinkObject => free_object,
    UplinkBucketIterator => free_bucket_iterator,
    UplinkObjectIterator => free_object_iterator,
    UplinkPart => free_part,
    UplinkUploadInfo => free_upload_info,
    UplinkPartIterator => free_part_iterator,
    UplinkUploadIterator => free_upload_iterator,
);

/// Read and write results carry only an error pointer.
impl ForeignResource for UplinkWriteResult {
    unsafe fn release(self, library: &dyn ForeignLibrary) {
        self.error.release(library);
    }
}

impl ForeignResource for UplinkReadResult {
    unsafe fn release(self, library: &dyn ForeignLibrary) {
        self.error.release(library);
    }
}

/// RAII owner of one foreign allocation.
///
/// Dropping it frees the allocation through the library that produced it,
/// exactly once. [`Foreign::into_inner`] transfers ownership out.
pub struct Foreign<T: ForeignResource> {
    value: Option<T>,
    library: Arc<dyn ForeignLibrary>,
}

// SAFETY: libuplink resources are not bound to the thread that created them,
// and `Foreign` is their single owner, so moving it between the worker pool
// and the host thread cannot introduce shared access.
unsafe impl<T: ForeignResource> Send for Foreign<T> {}

impl<T: ForeignResource> Foreign<T> {
    /// # Safety
    ///
    /// `value` must come from `library` and have no other owner.
    pub unsafe fn new(library: Arc<dyn ForeignLibrary>, value: T) -> Self {
        Self {
            value: Some(value),
            library,
        }
    }

    pub fn get(&self) -> &T {
        match &self.value {
            Some(value) => value,
            // `value` is only taken by `into_inner` and `drop`, both of which
            // consume the guard.
            None => unreachable!("foreign resource accessed after release"),
        }
    }

    pub fn library(&self) -> &Arc<dyn ForeignLibrary> {
        &self.library
    }

    /// Gives up ownership; the caller becomes responsible for freeing.
    pub fn into_inner(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("foreign resource taken twice"),
        }
    }
}

impl<T: ForeignResource> Drop for Foreign<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            // SAFETY: construction guarantees the value is ours to free.
            unsafe { value.release(&*self.library) };
        }
    }
}

impl<T: ForeignResource + fmt::Debug> fmt::Debug for Foreign<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Foreign")
            .field("value", &self.value)
            .field("library", &self.library.describe())
            .finish()
    }
}

/// Reads the code and message of a foreign error without freeing it.
///
/// # Safety
///
/// `error` must be null or point to a live `UplinkError`.
pub(crate) unsafe fn error_parts(error: *const UplinkError) -> Option<(i32, String)> {
    if error.is_null() {
        return None;
    }
    let error = &*error;
    Some((error.code, crate::marshal::string_from_foreign(error.message)))
}
