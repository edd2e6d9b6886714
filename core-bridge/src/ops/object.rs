use std::ffi::CString;
use std::ptr;

use bridge_traits::ffi::{
    ErrorPtr, UplinkCopyObjectOptions, UplinkListObjectsOptions, UplinkMoveObjectOptions,
    UplinkObjectIterator, UplinkUploadObjectMetadataOptions,
};
use serde::Serialize;

use crate::bridge::Bridge;
use crate::error::Result;
use crate::exception::TypedException;
use crate::handle::{Handle, HandleKind, Lease, Resource};
use crate::marshal::{c_string, CustomMetadata, ObjectInfo};
use crate::work::PendingFuture;

use super::bucket::free_iterator;
use super::{adopt, missing, object_record, owned, settled};

/// Options for [`Bridge::list_objects`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsOptions {
    pub prefix: Option<String>,
    pub cursor: Option<String>,
    pub recursive: bool,
    /// Include system metadata in listed items
    pub system: bool,
    /// Include custom metadata in listed items
    pub custom: bool,
}

impl ListObjectsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    pub fn with_custom(mut self, custom: bool) -> Self {
        self.custom = custom;
        self
    }
}

struct ListInput {
    project: Lease,
    bucket: CString,
    prefix: CString,
    cursor: CString,
    recursive: bool,
    system: bool,
    custom: bool,
}

/// Source and target of a copy or move.
struct Relocation {
    old_bucket: CString,
    old_key: CString,
    new_bucket: CString,
    new_key: CString,
}

impl Relocation {
    fn new(old_bucket: &str, old_key: &str, new_bucket: &str, new_key: &str) -> Result<Self> {
        Ok(Self {
            old_bucket: c_string("source bucket name", old_bucket)?,
            old_key: c_string("source object key", old_key)?,
            new_bucket: c_string("target bucket name", new_bucket)?,
            new_key: c_string("target object key", new_key)?,
        })
    }
}

impl Bridge {
    /// Object info, or `None` when the library returned no record.
    pub fn stat_object(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
    ) -> Result<PendingFuture<Option<ObjectInfo>>> {
        let (bucket, key) = (c_string("bucket name", bucket)?, c_string("object key", key)?);
        let project = self.lease(project, HandleKind::Project)?;
        self.submit(
            "stat_object",
            (project, bucket, key),
            |library, (project, bucket, key)| unsafe {
                owned(
                    library,
                    library.stat_object(project.as_ptr(), bucket.as_ptr(), key.as_ptr()),
                )
            },
            |ctx, _, result| object_record(ctx, result),
        )
    }

    /// Deletes an object. Resolves to the deleted object's info, or `None`
    /// when there was nothing to delete.
    pub fn delete_object(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
    ) -> Result<PendingFuture<Option<ObjectInfo>>> {
        let (bucket, key) = (c_string("bucket name", bucket)?, c_string("object key", key)?);
        let project = self.lease(project, HandleKind::Project)?;
        self.submit(
            "delete_object",
            (project, bucket, key),
            |library, (project, bucket, key)| unsafe {
                owned(
                    library,
                    library.delete_object(project.as_ptr(), bucket.as_ptr(), key.as_ptr()),
                )
            },
            |ctx, _, result| object_record(ctx, result),
        )
    }

    /// Replaces the custom metadata of an existing object.
    pub fn update_object_metadata(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        metadata: CustomMetadata,
    ) -> Result<PendingFuture<()>> {
        let (bucket, key) = (c_string("bucket name", bucket)?, c_string("object key", key)?);
        let project = self.lease(project, HandleKind::Project)?;
        self.submit(
            "update_object_metadata",
            (project, bucket, key, metadata),
            |library, (project, bucket, key, metadata)| {
                let mut options = UplinkUploadObjectMetadataOptions::default();
                let error = metadata.with_foreign(|raw| unsafe {
                    library.update_object_metadata(
                        project.as_ptr(),
                        bucket.as_ptr(),
                        key.as_ptr(),
                        raw,
                        &mut options,
                    )
                });
                unsafe { owned::<ErrorPtr>(library, error) }
            },
            |ctx, _, error| settled(ctx, error),
        )
    }

    /// Copies an object server-side. Resolves to the new object's info.
    pub fn copy_object(
        &self,
        project: &Handle,
        old_bucket: &str,
        old_key: &str,
        new_bucket: &str,
        new_key: &str,
    ) -> Result<PendingFuture<ObjectInfo>> {
        let input = (
            self.lease(project, HandleKind::Project)?,
            Relocation::new(old_bucket, old_key, new_bucket, new_key)?,
        );
        self.submit(
            "copy_object",
            input,
            |library, (project, to)| unsafe {
                let mut options = UplinkCopyObjectOptions::default();
                owned(
                    library,
                    library.copy_object(
                        project.as_ptr(),
                        to.old_bucket.as_ptr(),
                        to.old_key.as_ptr(),
                        to.new_bucket.as_ptr(),
                        to.new_key.as_ptr(),
                        &mut options,
                    ),
                )
            },
            |ctx, _, result| {
                object_record(ctx, result)?.ok_or_else(|| missing(ctx, "copied object"))
            },
        )
    }

    /// Moves (renames) an object, possibly into another bucket.
    pub fn move_object(
        &self,
        project: &Handle,
        old_bucket: &str,
        old_key: &str,
        new_bucket: &str,
        new_key: &str,
    ) -> Result<PendingFuture<()>> {
        let input = (
            self.lease(project, HandleKind::Project)?,
            Relocation::new(old_bucket, old_key, new_bucket, new_key)?,
        );
        self.submit(
            "move_object",
            input,
            |library, (project, to)| unsafe {
                owned::<ErrorPtr>(
                    library,
                    library.move_object(
                        project.as_ptr(),
                        to.old_bucket.as_ptr(),
                        to.old_key.as_ptr(),
                        to.new_bucket.as_ptr(),
                        to.new_key.as_ptr(),
                        ptr::null_mut::<UplinkMoveObjectOptions>(),
                    ),
                )
            },
            |ctx, _, error| settled(ctx, error),
        )
    }

    /// Starts an object listing. Listing failures are reported by
    /// [`object_iterator_err`](Self::object_iterator_err).
    pub fn list_objects(
        &self,
        project: &Handle,
        bucket: &str,
        options: ListObjectsOptions,
    ) -> Result<PendingFuture<Handle>> {
        let input = ListInput {
            bucket: c_string("bucket name", bucket)?,
            prefix: c_string("prefix", options.prefix.as_deref().unwrap_or_default())?,
            cursor: c_string("cursor", options.cursor.as_deref().unwrap_or_default())?,
            recursive: options.recursive,
            system: options.system,
            custom: options.custom,
            project: self.lease(project, HandleKind::Project)?,
        };
        self.submit(
            "list_objects",
            input,
            |library, input| unsafe {
                let mut options = UplinkListObjectsOptions {
                    prefix: input.prefix.as_ptr(),
                    cursor: input.cursor.as_ptr(),
                    recursive: input.recursive,
                    system: input.system,
                    custom: input.custom,
                };
                owned(
                    library,
                    library.list_objects(input.project.as_ptr(), input.bucket.as_ptr(), &mut options),
                )
            },
            |ctx, _, iterator| adopt(ctx, iterator, Resource::ObjectIterator),
        )
    }

    pub fn object_iterator_next(&self, iterator: &Handle) -> Result<PendingFuture<bool>> {
        let iterator = self.lease(iterator, HandleKind::ObjectIterator)?;
        self.submit(
            "object_iterator_next",
            iterator,
            |library, iterator| unsafe {
                library.object_iterator_next(iterator.as_ptr::<UplinkObjectIterator>())
            },
            |_, _, more| Ok(more),
        )
    }

    pub fn object_iterator_item(&self, iterator: &Handle) -> Result<PendingFuture<ObjectInfo>> {
        let iterator = self.lease(iterator, HandleKind::ObjectIterator)?;
        self.submit(
            "object_iterator_item",
            iterator,
            |library, iterator| unsafe {
                owned(library, library.object_iterator_item(iterator.as_ptr()))
            },
            |ctx, _, object| {
                let raw = *object.get();
                if raw.is_null() {
                    return Err(missing(ctx, "object at the iterator position"));
                }
                // SAFETY: non-null and owned by `object` until it drops.
                Ok(unsafe { ObjectInfo::from_foreign(&*raw) })
            },
        )
    }

    pub fn object_iterator_err(
        &self,
        iterator: &Handle,
    ) -> Result<PendingFuture<Option<TypedException>>> {
        let iterator = self.lease(iterator, HandleKind::ObjectIterator)?;
        self.submit(
            "object_iterator_err",
            iterator,
            |library, iterator| unsafe {
                owned::<ErrorPtr>(library, library.object_iterator_err(iterator.as_ptr()))
            },
            |ctx, _, error| Ok(ctx.take_failure(error)),
        )
    }

    pub fn free_object_iterator(&self, iterator: &Handle) -> Result<PendingFuture<()>> {
        free_iterator(self, "free_object_iterator", iterator, HandleKind::ObjectIterator)
    }
}
