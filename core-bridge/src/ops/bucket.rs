use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use bridge_traits::ffi::{
    ErrorPtr, UplinkBucketIterator, UplinkBucketResult, UplinkListBucketsOptions, UplinkProject,
};
use bridge_traits::ForeignLibrary;

use crate::bridge::Bridge;
use crate::error::Result;
use crate::exception::TypedException;
use crate::handle::{Handle, HandleKind, Lease, Resource};
use crate::marshal::{c_string, Bucket};
use crate::work::PendingFuture;

use super::{adopt, bucket_record, missing, owned};

type BucketCall =
    unsafe fn(&dyn ForeignLibrary, *mut UplinkProject, *const c_char) -> UplinkBucketResult;

impl Bridge {
    fn bucket_call(
        &self,
        name: &'static str,
        project: &Handle,
        bucket: &str,
        call: BucketCall,
    ) -> Result<PendingFuture<Bucket>> {
        let bucket = c_string("bucket name", bucket)?;
        let project = self.lease(project, HandleKind::Project)?;
        self.submit(
            name,
            (project, bucket),
            move |library, (project, bucket)| unsafe {
                owned(library, call(&**library, project.as_ptr(), bucket.as_ptr()))
            },
            |ctx, _, result| bucket_record(ctx, result),
        )
    }

    pub fn create_bucket(&self, project: &Handle, bucket: &str) -> Result<PendingFuture<Bucket>> {
        self.bucket_call("create_bucket", project, bucket, |l, p, b| unsafe {
            l.create_bucket(p, b)
        })
    }

    /// Creates the bucket unless it already exists.
    pub fn ensure_bucket(&self, project: &Handle, bucket: &str) -> Result<PendingFuture<Bucket>> {
        self.bucket_call("ensure_bucket", project, bucket, |l, p, b| unsafe {
            l.ensure_bucket(p, b)
        })
    }

    pub fn stat_bucket(&self, project: &Handle, bucket: &str) -> Result<PendingFuture<Bucket>> {
        self.bucket_call("stat_bucket", project, bucket, |l, p, b| unsafe {
            l.stat_bucket(p, b)
        })
    }

    /// Deletes an empty bucket.
    pub fn delete_bucket(&self, project: &Handle, bucket: &str) -> Result<PendingFuture<Bucket>> {
        self.bucket_call("delete_bucket", project, bucket, |l, p, b| unsafe {
            l.delete_bucket(p, b)
        })
    }

    pub fn delete_bucket_with_objects(
        &self,
        project: &Handle,
        bucket: &str,
    ) -> Result<PendingFuture<Bucket>> {
        self.bucket_call("delete_bucket_with_objects", project, bucket, |l, p, b| unsafe {
            l.delete_bucket_with_objects(p, b)
        })
    }

    /// Starts a bucket listing after `cursor`. Listing failures are
    /// reported by [`bucket_iterator_err`](Self::bucket_iterator_err).
    pub fn list_buckets(
        &self,
        project: &Handle,
        cursor: Option<&str>,
    ) -> Result<PendingFuture<Handle>> {
        let cursor = cursor.map(|c| c_string("cursor", c)).transpose()?;
        let project = self.lease(project, HandleKind::Project)?;
        self.submit(
            "list_buckets",
            (project, cursor),
            |library, (project, cursor): &mut (Lease, Option<CString>)| unsafe {
                let mut options = cursor.as_ref().map(|cursor| UplinkListBucketsOptions {
                    cursor: cursor.as_ptr(),
                });
                let options = options
                    .as_mut()
                    .map_or(ptr::null_mut(), |o| o as *mut UplinkListBucketsOptions);
                owned(library, library.list_buckets(project.as_ptr(), options))
            },
            |ctx, _, iterator| adopt(ctx, iterator, Resource::BucketIterator),
        )
    }

    /// Advances the iterator; `false` once it is exhausted or failed.
    pub fn bucket_iterator_next(&self, iterator: &Handle) -> Result<PendingFuture<bool>> {
        let iterator = self.lease(iterator, HandleKind::BucketIterator)?;
        self.submit(
            "bucket_iterator_next",
            iterator,
            |library, iterator| unsafe {
                library.bucket_iterator_next(iterator.as_ptr::<UplinkBucketIterator>())
            },
            |_, _, more| Ok(more),
        )
    }

    /// The bucket the iterator is positioned on.
    pub fn bucket_iterator_item(&self, iterator: &Handle) -> Result<PendingFuture<Bucket>> {
        let iterator = self.lease(iterator, HandleKind::BucketIterator)?;
        self.submit(
            "bucket_iterator_item",
            iterator,
            |library, iterator| unsafe {
                owned(library, library.bucket_iterator_item(iterator.as_ptr()))
            },
            |ctx, _, bucket| {
                let raw = *bucket.get();
                if raw.is_null() {
                    return Err(missing(ctx, "bucket at the iterator position"));
                }
                // SAFETY: non-null and owned by `bucket` until it drops.
                Ok(unsafe { Bucket::from_foreign(&*raw) })
            },
        )
    }

    /// The error that ended the listing, if any. Resolves rather than
    /// rejects.
    pub fn bucket_iterator_err(
        &self,
        iterator: &Handle,
    ) -> Result<PendingFuture<Option<TypedException>>> {
        let iterator = self.lease(iterator, HandleKind::BucketIterator)?;
        self.submit(
            "bucket_iterator_err",
            iterator,
            |library, iterator| unsafe {
                owned::<ErrorPtr>(library, library.bucket_iterator_err(iterator.as_ptr()))
            },
            |ctx, _, error| Ok(ctx.take_failure(error)),
        )
    }

    /// Frees the iterator on a worker thread. The handle is released at
    /// once; a cancelled free still frees.
    pub fn free_bucket_iterator(&self, iterator: &Handle) -> Result<PendingFuture<()>> {
        free_iterator(self, "free_bucket_iterator", iterator, HandleKind::BucketIterator)
    }
}

pub(super) fn free_iterator(
    bridge: &Bridge,
    name: &'static str,
    iterator: &Handle,
    kind: HandleKind,
) -> Result<PendingFuture<()>> {
    let resource = bridge.handles().detach(iterator, kind)?;
    bridge.submit(
        name,
        resource,
        |_: &Arc<dyn ForeignLibrary>, resource| drop(resource.take()),
        |_, _, ()| Ok(()),
    )
}
