use bridge_traits::ffi::{codes, UplinkDownload, UplinkDownloadOptions};
use bytes::Bytes;
use serde::Serialize;

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::foreign::error_parts;
use crate::handle::{Handle, HandleKind, Resource};
use crate::marshal::{c_string, ObjectInfo};
use crate::work::PendingFuture;

use super::{into_handle, missing, object_record, owned, settled};

/// Property on a failed read's exception holding the partial byte count.
pub const BYTES_READ_PROPERTY: &str = "bytesRead";

/// Byte range for [`Bridge::download_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub offset: i64,
    /// Negative reads to the end of the object.
    pub length: i64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            length: -1,
        }
    }
}

impl DownloadOptions {
    pub fn range(offset: i64, length: i64) -> Self {
        Self { offset, length }
    }
}

impl Bridge {
    pub fn download_object(
        &self,
        project: &Handle,
        bucket: &str,
        key: &str,
        options: DownloadOptions,
    ) -> Result<PendingFuture<Handle>> {
        if options.offset < 0 {
            return Err(BridgeError::InvalidArgument(format!(
                "download offset must not be negative, got {}",
                options.offset
            )));
        }
        let (bucket, key) = (c_string("bucket name", bucket)?, c_string("object key", key)?);
        let project = self.lease(project, HandleKind::Project)?;
        let options = UplinkDownloadOptions {
            offset: options.offset,
            length: options.length,
        };
        self.submit(
            "download_object",
            (project, bucket, key, options),
            |library, (project, bucket, key, options)| unsafe {
                owned(
                    library,
                    library.download_object(project.as_ptr(), bucket.as_ptr(), key.as_ptr(), options),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::Download),
        )
    }

    /// Reads up to `length` bytes.
    ///
    /// Any error slot rejects, end of stream (`codes::EOF`) included. The
    /// exception carries the partial count under [`BYTES_READ_PROPERTY`] and
    /// the bytes themselves in
    /// [`partial_data`](crate::TypedException::partial_data).
    pub fn download_read(&self, download: &Handle, length: usize) -> Result<PendingFuture<Bytes>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(length).map_err(|e| {
            BridgeError::OutOfMemory(format!("cannot allocate {} byte read buffer: {}", length, e))
        })?;
        buffer.resize(length, 0u8);
        let download = self.lease(download, HandleKind::Download)?;
        self.submit(
            "download_read",
            (download, buffer),
            |library, (download, buffer)| unsafe {
                owned(
                    library,
                    library.download_read(
                        download.as_ptr::<UplinkDownload>(),
                        buffer.as_mut_ptr().cast(),
                        buffer.len(),
                    ),
                )
            },
            |ctx, (_, mut buffer), result| {
                let read = result.get();
                let bytes_read = read.bytes_read.min(buffer.len());
                buffer.truncate(bytes_read);

                // SAFETY: the error is owned by `result` until it drops.
                match unsafe { error_parts(read.error) } {
                    None => Ok(Bytes::from(buffer)),
                    Some((code, message)) => {
                        let message = if code == codes::EOF && message.is_empty() {
                            "EOF".to_string()
                        } else {
                            message
                        };
                        Err(ctx
                            .exception(code, &message)
                            .with_property(BYTES_READ_PROPERTY, bytes_read)
                            .with_partial(Bytes::from(buffer))
                            .into())
                    }
                }
            },
        )
    }

    pub fn download_info(&self, download: &Handle) -> Result<PendingFuture<ObjectInfo>> {
        let download = self.lease(download, HandleKind::Download)?;
        self.submit(
            "download_info",
            download,
            |library, download| unsafe { owned(library, library.download_info(download.as_ptr())) },
            |ctx, _, result| {
                object_record(ctx, result)?.ok_or_else(|| missing(ctx, "download info"))
            },
        )
    }

    /// Closes the download stream. The handle still has to be released.
    pub fn close_download(&self, download: &Handle) -> Result<PendingFuture<()>> {
        let download = self.lease(download, HandleKind::Download)?;
        self.submit(
            "close_download",
            download,
            |library, download| unsafe { owned(library, library.close_download(download.as_ptr())) },
            |ctx, _, error| settled(ctx, error),
        )
    }
}
