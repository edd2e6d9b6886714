//! `libuplink` resolved from a shared object at runtime.

use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};

use bridge_traits::ffi::*;
use bridge_traits::ForeignLibrary;
use libloading::Library;
use tracing::{debug, info};

use crate::error::{LoadError, Result};

/// Resolves one exported function. Names are passed without the trailing NUL.
unsafe fn resolve<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T> {
    match library.get::<T>(name.as_bytes()) {
        Ok(symbol) => Ok(*symbol),
        Err(_) => Err(LoadError::MissingSymbol {
            path: path.to_path_buf(),
            symbol: name.to_string(),
        }),
    }
}

/// Exported symbol for a trait method. The edge helpers ship under their own
/// `edge_` prefix; everything else is `uplink_`.
fn export_name(method: &str) -> String {
    if method.starts_with("edge_") {
        method.to_string()
    } else {
        format!("uplink_{method}")
    }
}

/// Declares the `uplink_*` and `edge_*` exports the bridge uses. Each entry becomes a
/// function pointer in `Symbols` and a call-through in the `ForeignLibrary`
/// impl, so the two cannot drift apart.
macro_rules! uplink_exports {
    ($( $name:ident ( $($arg:ident : $ty:ty),* ) $(-> $ret:ty)? ; )*) => {
        struct Symbols {
            $( $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?, )*
        }

        impl Symbols {
            fn resolve_all(library: &Library, path: &Path) -> Result<Self> {
                Ok(Self {
                    $( $name: unsafe {
                        resolve(library, path, &export_name(stringify!($name)))
                    }?, )*
                })
            }
        }

        impl ForeignLibrary for DynamicUplink {
            fn describe(&self) -> String {
                self.path.display().to_string()
            }

            $(
                unsafe fn $name(&self, $($arg: $ty),*) $(-> $ret)? {
                    (self.symbols.$name)($($arg),*)
                }
            )*
        }
    };
}

uplink_exports! {
    parse_access(access: *const c_char) -> UplinkAccessResult;
    request_access_with_passphrase(
        satellite_address: *const c_char,
        api_key: *const c_char,
        passphrase: *const c_char
    ) -> UplinkAccessResult;
    access_serialize(access: *mut UplinkAccess) -> UplinkStringResult;
    access_satellite_address(access: *mut UplinkAccess) -> UplinkStringResult;
    config_request_access_with_passphrase(
        config: UplinkConfig,
        satellite_address: *const c_char,
        api_key: *const c_char,
        passphrase: *const c_char
    ) -> UplinkAccessResult;
    access_share(
        access: *mut UplinkAccess,
        permission: UplinkPermission,
        prefixes: *mut UplinkSharePrefix,
        prefix_count: i64
    ) -> UplinkAccessResult;
    access_override_encryption_key(
        access: *mut UplinkAccess,
        bucket: *const c_char,
        prefix: *const c_char,
        key: *mut UplinkEncryptionKey
    ) -> ErrorPtr;
    derive_encryption_key(
        passphrase: *const c_char,
        salt: *mut c_void,
        length: usize
    ) -> UplinkEncryptionKeyResult;

    open_project(access: *mut UplinkAccess) -> UplinkProjectResult;
    config_open_project(config: UplinkConfig, access: *mut UplinkAccess) -> UplinkProjectResult;
    close_project(project: *mut UplinkProject) -> ErrorPtr;
    revoke_access(project: *mut UplinkProject, access: *mut UplinkAccess) -> ErrorPtr;

    create_bucket(project: *mut UplinkProject, bucket: *const c_char) -> UplinkBucketResult;
    ensure_bucket(project: *mut UplinkProject, bucket: *const c_char) -> UplinkBucketResult;
    stat_bucket(project: *mut UplinkProject, bucket: *const c_char) -> UplinkBucketResult;
    delete_bucket(project: *mut UplinkProject, bucket: *const c_char) -> UplinkBucketResult;
    delete_bucket_with_objects(
        project: *mut UplinkProject,
        bucket: *const c_char
    ) -> UplinkBucketResult;
    list_buckets(
        project: *mut UplinkProject,
        options: *mut UplinkListBucketsOptions
    ) -> *mut UplinkBucketIterator;
    bucket_iterator_next(iterator: *mut UplinkBucketIterator) -> bool;
    bucket_iterator_item(iterator: *mut UplinkBucketIterator) -> *mut UplinkBucket;
    bucket_iterator_err(iterator: *mut UplinkBucketIterator) -> ErrorPtr;
    free_bucket_iterator(iterator: *mut UplinkBucketIterator);

    stat_object(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char
    ) -> UplinkObjectResult;
    delete_object(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char
    ) -> UplinkObjectResult;
    update_object_metadata(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        metadata: UplinkCustomMetadata,
        options: *mut UplinkUploadObjectMetadataOptions
    ) -> ErrorPtr;
    list_objects(
        project: *mut UplinkProject,
        bucket: *const c_char,
        options: *mut UplinkListObjectsOptions
    ) -> *mut UplinkObjectIterator;
    object_iterator_next(iterator: *mut UplinkObjectIterator) -> bool;
    object_iterator_item(iterator: *mut UplinkObjectIterator) -> *mut UplinkObject;
    object_iterator_err(iterator: *mut UplinkObjectIterator) -> ErrorPtr;
    free_object_iterator(iterator: *mut UplinkObjectIterator);
    copy_object(
        project: *mut UplinkProject,
        old_bucket: *const c_char,
        old_key: *const c_char,
        new_bucket: *const c_char,
        new_key: *const c_char,
        options: *mut UplinkCopyObjectOptions
    ) -> UplinkObjectResult;
    move_object(
        project: *mut UplinkProject,
        old_bucket: *const c_char,
        old_key: *const c_char,
        new_bucket: *const c_char,
        new_key: *const c_char,
        options: *mut UplinkMoveObjectOptions
    ) -> ErrorPtr;

    upload_object(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkUploadOptions
    ) -> UplinkUploadResult;
    upload_write(upload: *mut UplinkUpload, bytes: *mut c_void, length: usize) -> UplinkWriteResult;
    upload_set_custom_metadata(upload: *mut UplinkUpload, metadata: UplinkCustomMetadata) -> ErrorPtr;
    upload_commit(upload: *mut UplinkUpload) -> ErrorPtr;
    upload_abort(upload: *mut UplinkUpload) -> ErrorPtr;
    upload_info(upload: *mut UplinkUpload) -> UplinkObjectResult;

    download_object(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkDownloadOptions
    ) -> UplinkDownloadResult;
    download_read(download: *mut UplinkDownload, buffer: *mut c_void, length: usize) -> UplinkReadResult;
    download_info(download: *mut UplinkDownload) -> UplinkObjectResult;
    close_download(download: *mut UplinkDownload) -> ErrorPtr;

    begin_upload(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkUploadOptions
    ) -> UplinkUploadInfoResult;
    commit_upload(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        options: *mut UplinkCommitUploadOptions
    ) -> UplinkCommitUploadResult;
    abort_upload(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char
    ) -> ErrorPtr;
    upload_part(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        part_number: u32
    ) -> UplinkPartUploadResult;
    part_upload_write(
        part_upload: *mut UplinkPartUpload,
        bytes: *mut c_void,
        length: usize
    ) -> UplinkWriteResult;
    part_upload_commit(part_upload: *mut UplinkPartUpload) -> ErrorPtr;
    part_upload_abort(part_upload: *mut UplinkPartUpload) -> ErrorPtr;
    part_upload_set_etag(part_upload: *mut UplinkPartUpload, etag: *const c_char) -> ErrorPtr;
    part_upload_info(part_upload: *mut UplinkPartUpload) -> UplinkPartResult;
    list_upload_parts(
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        options: *mut UplinkListUploadPartsOptions
    ) -> *mut UplinkPartIterator;
    part_iterator_next(iterator: *mut UplinkPartIterator) -> bool;
    part_iterator_item(iterator: *mut UplinkPartIterator) -> *mut UplinkPart;
    part_iterator_err(iterator: *mut UplinkPartIterator) -> ErrorPtr;
    free_part_iterator(iterator: *mut UplinkPartIterator);
    list_uploads(
        project: *mut UplinkProject,
        bucket: *const c_char,
        options: *mut UplinkListUploadsOptions
    ) -> *mut UplinkUploadIterator;
    upload_iterator_next(iterator: *mut UplinkUploadIterator) -> bool;
    upload_iterator_item(iterator: *mut UplinkUploadIterator) -> *mut UplinkUploadInfo;
    upload_iterator_err(iterator: *mut UplinkUploadIterator) -> ErrorPtr;
    free_upload_iterator(iterator: *mut UplinkUploadIterator);

    edge_register_access(
        config: EdgeConfig,
        access: *mut UplinkAccess,
        options: *mut EdgeRegisterAccessOptions
    ) -> EdgeCredentialsResult;
    edge_join_share_url(
        base_url: *const c_char,
        access_key_id: *const c_char,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut EdgeShareUrlOptions
    ) -> UplinkStringResult;

    free_error(error: ErrorPtr);
    free_access_result(result: UplinkAccessResult);
    free_project_result(result: UplinkProjectResult);
    free_bucket_result(result: UplinkBucketResult);
    free_bucket(bucket: *mut UplinkBucket);
    free_object_result(result: UplinkObjectResult);
    free_object(object: *mut UplinkObject);
    free_upload_result(result: UplinkUploadResult);
    free_download_result(result: UplinkDownloadResult);
    free_string_result(result: UplinkStringResult);
    free_encryption_key_result(result: UplinkEncryptionKeyResult);
    free_upload_info_result(result: UplinkUploadInfoResult);
    free_upload_info(info: *mut UplinkUploadInfo);
    free_commit_upload_result(result: UplinkCommitUploadResult);
    free_part_upload_result(result: UplinkPartUploadResult);
    free_part_result(result: UplinkPartResult);
    free_part(part: *mut UplinkPart);
    edge_free_credentials_result(result: EdgeCredentialsResult);
}

/// A `libuplink` shared object with every export the bridge needs resolved.
///
/// The library stays mapped for as long as this value lives; the resolved
/// function pointers never outlive it.
pub struct DynamicUplink {
    symbols: Symbols,
    path: PathBuf,
    _library: Library,
}

impl DynamicUplink {
    /// Maps the shared object at `path` and resolves every export.
    ///
    /// A bare file name (no directory component) goes through the platform
    /// loader's own search path.
    pub fn open(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Opening shared library");

        // SAFETY: loading runs the library's initialisers; libuplink has no
        // initialisers with preconditions.
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let symbols = Symbols::resolve_all(&library, path)?;

        info!(path = %path.display(), "Loaded libuplink");

        Ok(Self {
            symbols,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for DynamicUplink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicUplink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_reports_path() {
        let path = Path::new("/nonexistent/dir/libuplink.so");
        match DynamicUplink::open(path) {
            Err(LoadError::Open { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected open failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_export_names() {
        assert_eq!(export_name("stat_bucket"), "uplink_stat_bucket");
        assert_eq!(export_name("edge_register_access"), "edge_register_access");
        assert_eq!(export_name("edge_free_credentials_result"), "edge_free_credentials_result");
    }
}
