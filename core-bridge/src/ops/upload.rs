use bridge_traits::ffi::{ErrorPtr, UplinkUpload, UplinkUploadOptions};
use chrono::{DateTime, Utc};

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleKind, Resource};
use crate::marshal::{c_string, timestamp_seconds, CustomMetadata, ObjectInfo};
use crate::work::PendingFuture;

use super::{into_handle, missing, object_record, owned, settled, succeeded};

impl Bridge {
    /// Starts an upload. `expires` of `None` keeps the object forever.
    pub fn upload_object(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<PendingFuture<Handle>> {
        let (bucket, key) = (c_string("bucket name", bucket)?, c_string("object key", key)?);
        let project = self.lease(project, HandleKind::Project)?;
        let options = UplinkUploadOptions {
            expires: timestamp_seconds(expires),
        };
        self.submit(
            "upload_object",
            (project, bucket, key, options),
            |library, (project, bucket, key, options)| unsafe {
                owned(
                    library,
                    library.upload_object(project.as_ptr(), bucket.as_ptr(), key.as_ptr(), options),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::Upload),
        )
    }

    /// Writes a copy of `data`. Resolves to the number of bytes accepted.
    pub fn upload_write(&self, upload: &Handle, data: &[u8]) -> Result<PendingFuture<usize>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(data.len()).map_err(|e| {
            BridgeError::OutOfMemory(format!("cannot copy {} byte write buffer: {}", data.len(), e))
        })?;
        buffer.extend_from_slice(data);
        let upload = self.lease(upload, HandleKind::Upload)?;
        self.submit(
            "upload_write",
            (upload, buffer),
            |library, (upload, buffer)| unsafe {
                owned(
                    library,
                    library.upload_write(
                        upload.as_ptr::<UplinkUpload>(),
                        buffer.as_mut_ptr().cast(),
                        buffer.len(),
                    ),
                )
            },
            |ctx, _, result| Ok(succeeded(ctx, result)?.get().bytes_written),
        )
    }

    /// Custom metadata to store with the object on commit.
    pub fn upload_set_custom_metadata(
        &self,
        upload: &Handle,
        metadata: CustomMetadata,
    ) -> Result<PendingFuture<()>> {
        let upload = self.lease(upload, HandleKind::Upload)?;
        self.submit(
            "upload_set_custom_metadata",
            (upload, metadata),
            |library, (upload, metadata)| {
                let error = metadata.with_foreign(|raw| unsafe {
                    library.upload_set_custom_metadata(upload.as_ptr(), raw)
                });
                unsafe { owned::<ErrorPtr>(library, error) }
            },
            |ctx, _, error| settled(ctx, error),
        )
    }

    pub fn upload_commit(&self, upload: &Handle) -> Result<PendingFuture<()>> {
        let upload = self.lease(upload, HandleKind::Upload)?;
        self.submit(
            "upload_commit",
            upload,
            |library, upload| unsafe { owned(library, library.upload_commit(upload.as_ptr())) },
            |ctx, _, error| settled(ctx, error),
        )
    }

    pub fn upload_abort(&self, upload: &Handle) -> Result<PendingFuture<()>> {
        let upload = self.lease(upload, HandleKind::Upload)?;
        self.submit(
            "upload_abort",
            upload,
            |library, upload| unsafe { owned(library, library.upload_abort(upload.as_ptr())) },
            |ctx, _, error| settled(ctx, error),
        )
    }

    pub fn upload_info(&self, upload: &Handle) -> Result<PendingFuture<ObjectInfo>> {
        let upload = self.lease(upload, HandleKind::Upload)?;
        self.submit(
            "upload_info",
            upload,
            |library, upload| unsafe { owned(library, library.upload_info(upload.as_ptr())) },
            |ctx, _, result| object_record(ctx, result)?.ok_or_else(|| missing(ctx, "upload info")),
        )
    }
}
