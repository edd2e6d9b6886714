//! Multipart uploads: a pending upload is begun, parts are uploaded under
//! its id (possibly out of order), and a commit stitches them together in
//! part-number order.

use std::ffi::CString;

use bridge_traits::ffi::{
    ErrorPtr, UplinkCommitUploadOptions, UplinkListUploadPartsOptions, UplinkListUploadsOptions,
    UplinkPartIterator, UplinkPartUpload, UplinkUploadIterator, UplinkUploadOptions,
};
use chrono::{DateTime, Utc};

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::exception::TypedException;
use crate::handle::{Handle, HandleKind, Lease, Resource};
use crate::marshal::{c_string, timestamp_seconds, CustomMetadata, ObjectInfo, PartInfo, UploadInfo};
use crate::work::PendingFuture;

use super::bucket::free_iterator;
use super::object::ListObjectsOptions;
use super::{adopt, into_handle, missing, owned, settled, succeeded};

/// Pending uploads are listed with the same knobs as objects.
pub type ListUploadsOptions = ListObjectsOptions;

/// The pending upload an operation addresses.
struct UploadTarget {
    project: Lease,
    bucket: CString,
    key: CString,
    upload_id: CString,
}

impl Bridge {
    fn upload_target(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<UploadTarget> {
        Ok(UploadTarget {
            bucket: c_string("bucket name", bucket)?,
            key: c_string("object key", key)?,
            upload_id: c_string("upload id", upload_id)?,
            project: self.lease(project, HandleKind::Project)?,
        })
    }

    /// Begins a multipart upload. The returned info carries the upload id.
    pub fn begin_upload(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<PendingFuture<UploadInfo>> {
        let (bucket, key) = (c_string("bucket name", bucket)?, c_string("object key", key)?);
        let project = self.lease(project, HandleKind::Project)?;
        let options = UplinkUploadOptions {
            expires: timestamp_seconds(expires),
        };
        self.submit(
            "begin_upload",
            (project, bucket, key, options),
            |library, (project, bucket, key, options)| unsafe {
                owned(
                    library,
                    library.begin_upload(project.as_ptr(), bucket.as_ptr(), key.as_ptr(), options),
                )
            },
            |ctx, _, result| {
                let result = succeeded(ctx, result)?;
                let info = result.get().info;
                if info.is_null() {
                    return Err(missing(ctx, "upload info"));
                }
                // SAFETY: non-null and owned by `result` until it drops.
                Ok(unsafe { UploadInfo::from_foreign(&*info) })
            },
        )
    }

    /// Commits the uploaded parts as one object carrying `metadata`.
    pub fn commit_upload(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        upload_id: &str,
        metadata: CustomMetadata,
    ) -> Result<PendingFuture<ObjectInfo>> {
        let target = self.upload_target(project, bucket, key, upload_id)?;
        self.submit(
            "commit_upload",
            (target, metadata),
            |library, (target, metadata)| {
                let result = metadata.with_foreign(|raw| unsafe {
                    let mut options = UplinkCommitUploadOptions {
                        custom_metadata: raw,
                    };
                    library.commit_upload(
                        target.project.as_ptr(),
                        target.bucket.as_ptr(),
                        target.key.as_ptr(),
                        target.upload_id.as_ptr(),
                        &mut options,
                    )
                });
                unsafe { owned(library, result) }
            },
            |ctx, _, result| {
                let result = succeeded(ctx, result)?;
                let object = result.get().object;
                if object.is_null() {
                    return Err(missing(ctx, "committed object"));
                }
                // SAFETY: non-null and owned by `result` until it drops.
                Ok(unsafe { ObjectInfo::from_foreign(&*object) })
            },
        )
    }

    /// Abandons a pending upload and every part uploaded to it.
    pub fn abort_upload(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<PendingFuture<()>> {
        let target = self.upload_target(project, bucket, key, upload_id)?;
        self.submit(
            "abort_upload",
            target,
            |library, target| unsafe {
                owned::<ErrorPtr>(
                    library,
                    library.abort_upload(
                        target.project.as_ptr(),
                        target.bucket.as_ptr(),
                        target.key.as_ptr(),
                        target.upload_id.as_ptr(),
                    ),
                )
            },
            |ctx, _, error| settled(ctx, error),
        )
    }

    /// Starts uploading part `part_number` of a pending upload.
    pub fn upload_part(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<PendingFuture<Handle>> {
        let target = self.upload_target(project, bucket, key, upload_id)?;
        self.submit(
            "upload_part",
            target,
            move |library, target| unsafe {
                owned(
                    library,
                    library.upload_part(
                        target.project.as_ptr(),
                        target.bucket.as_ptr(),
                        target.key.as_ptr(),
                        target.upload_id.as_ptr(),
                        part_number,
                    ),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::PartUpload),
        )
    }

    /// Writes a copy of `data` to the part. Resolves to the bytes accepted.
    pub fn part_upload_write(&self, part: &Handle, data: &[u8]) -> Result<PendingFuture<usize>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(data.len()).map_err(|e| {
            BridgeError::OutOfMemory(format!("cannot copy {} byte write buffer: {}", data.len(), e))
        })?;
        buffer.extend_from_slice(data);
        let part = self.lease(part, HandleKind::PartUpload)?;
        self.submit(
            "part_upload_write",
            (part, buffer),
            |library, (part, buffer)| unsafe {
                owned(
                    library,
                    library.part_upload_write(
                        part.as_ptr::<UplinkPartUpload>(),
                        buffer.as_mut_ptr().cast(),
                        buffer.len(),
                    ),
                )
            },
            |ctx, _, result| Ok(succeeded(ctx, result)?.get().bytes_written),
        )
    }

    pub fn part_upload_commit(&self, part: &Handle) -> Result<PendingFuture<()>> {
        let part = self.lease(part, HandleKind::PartUpload)?;
        self.submit(
            "part_upload_commit",
            part,
            |library, part| unsafe { owned(library, library.part_upload_commit(part.as_ptr())) },
            |ctx, _, error| settled(ctx, error),
        )
    }

    pub fn part_upload_abort(&self, part: &Handle) -> Result<PendingFuture<()>> {
        let part = self.lease(part, HandleKind::PartUpload)?;
        self.submit(
            "part_upload_abort",
            part,
            |library, part| unsafe { owned(library, library.part_upload_abort(part.as_ptr())) },
            |ctx, _, error| settled(ctx, error),
        )
    }

    pub fn part_upload_set_etag(&self, part: &Handle, etag: &str) -> Result<PendingFuture<()>> {
        let etag = c_string("etag", etag)?;
        let part = self.lease(part, HandleKind::PartUpload)?;
        self.submit(
            "part_upload_set_etag",
            (part, etag),
            |library, (part, etag)| unsafe {
                owned::<ErrorPtr>(library, library.part_upload_set_etag(part.as_ptr(), etag.as_ptr()))
            },
            |ctx, _, error| settled(ctx, error),
        )
    }

    pub fn part_upload_info(&self, part: &Handle) -> Result<PendingFuture<PartInfo>> {
        let part = self.lease(part, HandleKind::PartUpload)?;
        self.submit(
            "part_upload_info",
            part,
            |library, part| unsafe { owned(library, library.part_upload_info(part.as_ptr())) },
            |ctx, _, result| {
                let result = succeeded(ctx, result)?;
                let part = result.get().part;
                if part.is_null() {
                    return Err(missing(ctx, "part info"));
                }
                // SAFETY: non-null and owned by `result` until it drops.
                Ok(unsafe { PartInfo::from_foreign(&*part) })
            },
        )
    }

    /// Lists the committed parts numbered above `cursor` (zero lists all).
    pub fn list_upload_parts(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        upload_id: &str,
        cursor: u32,
    ) -> Result<PendingFuture<Handle>> {
        let target = self.upload_target(project, bucket, key, upload_id)?;
        self.submit(
            "list_upload_parts",
            target,
            move |library, target| unsafe {
                let mut options = UplinkListUploadPartsOptions { cursor };
                owned(
                    library,
                    library.list_upload_parts(
                        target.project.as_ptr(),
                        target.bucket.as_ptr(),
                        target.key.as_ptr(),
                        target.upload_id.as_ptr(),
                        &mut options,
                    ),
                )
            },
            |ctx, _, iterator| adopt(ctx, iterator, Resource::PartIterator),
        )
    }

    pub fn part_iterator_next(&self, iterator: &Handle) -> Result<PendingFuture<bool>> {
        let iterator = self.lease(iterator, HandleKind::PartIterator)?;
        self.submit(
            "part_iterator_next",
            iterator,
            |library, iterator| unsafe {
                library.part_iterator_next(iterator.as_ptr::<UplinkPartIterator>())
            },
            |_, _, more| Ok(more),
        )
    }

    pub fn part_iterator_item(&self, iterator: &Handle) -> Result<PendingFuture<PartInfo>> {
        let iterator = self.lease(iterator, HandleKind::PartIterator)?;
        self.submit(
            "part_iterator_item",
            iterator,
            |library, iterator| unsafe { owned(library, library.part_iterator_item(iterator.as_ptr())) },
            |ctx, _, part| {
                let raw = *part.get();
                if raw.is_null() {
                    return Err(missing(ctx, "part at the iterator position"));
                }
                // SAFETY: non-null and owned by `part` until it drops.
                Ok(unsafe { PartInfo::from_foreign(&*raw) })
            },
        )
    }

    pub fn part_iterator_err(
        &self,
        iterator: &Handle,
    ) -> Result<PendingFuture<Option<TypedException>>> {
        let iterator = self.lease(iterator, HandleKind::PartIterator)?;
        self.submit(
            "part_iterator_err",
            iterator,
            |library, iterator| unsafe {
                owned::<ErrorPtr>(library, library.part_iterator_err(iterator.as_ptr()))
            },
            |ctx, _, error| Ok(ctx.take_failure(error)),
        )
    }

    pub fn free_part_iterator(&self, iterator: &Handle) -> Result<PendingFuture<()>> {
        free_iterator(self, "free_part_iterator", iterator, HandleKind::PartIterator)
    }

    /// Lists pending uploads in `bucket`.
    pub fn list_uploads(
        &self,
        project: &Handle,
        bucket: &str,
        options: ListUploadsOptions,
    ) -> Result<PendingFuture<Handle>> {
        let input = (
            self.lease(project, HandleKind::Project)?,
            c_string("bucket name", bucket)?,
            c_string("prefix", options.prefix.as_deref().unwrap_or_default())?,
            c_string("cursor", options.cursor.as_deref().unwrap_or_default())?,
        );
        self.submit(
            "list_uploads",
            input,
            move |library, (project, bucket, prefix, cursor)| unsafe {
                let mut raw = UplinkListUploadsOptions {
                    prefix: prefix.as_ptr(),
                    cursor: cursor.as_ptr(),
                    recursive: options.recursive,
                    system: options.system,
                    custom: options.custom,
                };
                owned(
                    library,
                    library.list_uploads(project.as_ptr(), bucket.as_ptr(), &mut raw),
                )
            },
            |ctx, _, iterator| adopt(ctx, iterator, Resource::UploadIterator),
        )
    }

    pub fn upload_iterator_next(&self, iterator: &Handle) -> Result<PendingFuture<bool>> {
        let iterator = self.lease(iterator, HandleKind::UploadIterator)?;
        self.submit(
            "upload_iterator_next",
            iterator,
            |library, iterator| unsafe {
                library.upload_iterator_next(iterator.as_ptr::<UplinkUploadIterator>())
            },
            |_, _, more| Ok(more),
        )
    }

    pub fn upload_iterator_item(&self, iterator: &Handle) -> Result<PendingFuture<UploadInfo>> {
        let iterator = self.lease(iterator, HandleKind::UploadIterator)?;
        self.submit(
            "upload_iterator_item",
            iterator,
            |library, iterator| unsafe {
                owned(library, library.upload_iterator_item(iterator.as_ptr()))
            },
            |ctx, _, info| {
                let raw = *info.get();
                if raw.is_null() {
                    return Err(missing(ctx, "upload at the iterator position"));
                }
                // SAFETY: non-null and owned by `info` until it drops.
                Ok(unsafe { UploadInfo::from_foreign(&*raw) })
            },
        )
    }

    pub fn upload_iterator_err(
        &self,
        iterator: &Handle,
    ) -> Result<PendingFuture<Option<TypedException>>> {
        let iterator = self.lease(iterator, HandleKind::UploadIterator)?;
        self.submit(
            "upload_iterator_err",
            iterator,
            |library, iterator| unsafe {
                owned::<ErrorPtr>(library, library.upload_iterator_err(iterator.as_ptr()))
            },
            |ctx, _, error| Ok(ctx.take_failure(error)),
        )
    }

    pub fn free_upload_iterator(&self, iterator: &Handle) -> Result<PendingFuture<()>> {
        free_iterator(self, "free_upload_iterator", iterator, HandleKind::UploadIterator)
    }
}
