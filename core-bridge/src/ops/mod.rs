//! Domain operations.
//!
//! Every operation is a thin call site on [`Bridge`](crate::Bridge):
//! arguments are validated and copied synchronously, handles are leased, and
//! one foreign call is submitted. Contract errors surface as `Err` from the
//! call itself; foreign failures reject the returned future.

mod access;
mod bucket;
mod download;
mod edge;
mod encryption;
mod multipart;
mod object;
mod project;
mod upload;

use std::sync::Arc;

use bridge_traits::ffi::*;
use bridge_traits::ForeignLibrary;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::foreign::{Foreign, ForeignResource};
use crate::handle::{Handle, Resource};
use crate::marshal::{Bucket, ObjectInfo};
use crate::work::HostContext;

pub use access::{Permission, SharePrefix};
pub use download::{DownloadOptions, BYTES_READ_PROPERTY};
pub use edge::{EdgeConfig, ShareUrlOptions};
pub use multipart::ListUploadsOptions;
pub use object::ListObjectsOptions;
pub use project::ProjectConfig;

/// Result records with an error slot.
pub(crate) trait Fallible: ForeignResource {
    fn error(&self) -> *const UplinkError;
}

macro_rules! fallible {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Fallible for $ty {
                fn error(&self) -> *const UplinkError {
                    self.error
                }
            }
        )*
    };
}

fallible!(
    UplinkAccessResult,
    UplinkProjectResult,
    UplinkBucketResult,
    UplinkObjectResult,
    UplinkUploadResult,
    UplinkDownloadResult,
    UplinkStringResult,
    UplinkWriteResult,
    UplinkReadResult,
    UplinkEncryptionKeyResult,
    UplinkUploadInfoResult,
    UplinkCommitUploadResult,
    UplinkPartUploadResult,
    UplinkPartResult,
    EdgeCredentialsResult,
);

/// Takes ownership of a value the library just returned.
///
/// # Safety
///
/// `value` must come from `library` and have no other owner.
pub(crate) unsafe fn owned<T: ForeignResource>(
    library: &Arc<dyn ForeignLibrary>,
    value: T,
) -> Foreign<T> {
    Foreign::new(Arc::clone(library), value)
}

/// Error slot first: a populated slot becomes a typed exception.
pub(crate) fn succeeded<T: Fallible>(ctx: &HostContext, result: Foreign<T>) -> Result<Foreign<T>> {
    match ctx.foreign_failure(result.get().error()) {
        Some(exception) => {
            debug!(code = exception.code(), message = exception.message(), "Foreign call failed");
            Err(exception.into())
        }
        None => Ok(result),
    }
}

/// Completion for calls that only return an error pointer.
pub(crate) fn settled(ctx: &HostContext, error: Foreign<ErrorPtr>) -> Result<()> {
    match ctx.take_failure(error) {
        Some(exception) => {
            debug!(code = exception.code(), message = exception.message(), "Foreign call failed");
            Err(exception.into())
        }
        None => Ok(()),
    }
}

/// A success with nothing in it.
pub(crate) fn missing(ctx: &HostContext, what: &str) -> BridgeError {
    ctx.exception(codes::INTERNAL, &format!("libuplink returned no {}", what))
        .into()
}

/// Moves an owned foreign value into a new handle.
pub(crate) fn adopt<T, F>(ctx: &HostContext, value: Foreign<T>, resource: F) -> Result<Handle>
where
    T: ForeignResource,
    F: FnOnce(T) -> Resource,
{
    let library = Arc::clone(value.library());
    let resource = resource(value.into_inner());
    // SAFETY: ownership moved straight out of a guard over `library`.
    let resource = unsafe { Foreign::new(library, resource) };
    if resource.get().foreign_id() == 0 {
        return Err(missing(ctx, resource.get().kind().name()));
    }
    ctx.wrap(resource)
}

pub(crate) fn into_handle<T, F>(ctx: &HostContext, result: Foreign<T>, resource: F) -> Result<Handle>
where
    T: Fallible,
    F: FnOnce(T) -> Resource,
{
    adopt(ctx, succeeded(ctx, result)?, resource)
}

pub(crate) fn bucket_record(ctx: &HostContext, result: Foreign<UplinkBucketResult>) -> Result<Bucket> {
    let result = succeeded(ctx, result)?;
    let bucket = result.get().bucket;
    if bucket.is_null() {
        return Err(missing(ctx, "bucket"));
    }
    // SAFETY: non-null and owned by `result` until it drops.
    Ok(unsafe { Bucket::from_foreign(&*bucket) })
}

pub(crate) fn object_record(
    ctx: &HostContext,
    result: Foreign<UplinkObjectResult>,
) -> Result<Option<ObjectInfo>> {
    let result = succeeded(ctx, result)?;
    let object = result.get().object;
    if object.is_null() {
        return Ok(None);
    }
    // SAFETY: non-null and owned by `result` until it drops.
    Ok(Some(unsafe { ObjectInfo::from_foreign(&*object) }))
}

pub(crate) fn string_record(ctx: &HostContext, result: Foreign<UplinkStringResult>) -> Result<String> {
    let result = succeeded(ctx, result)?;
    // SAFETY: owned by `result` until it drops.
    Ok(unsafe { crate::marshal::string_from_foreign(result.get().string) })
}
