//! The foreign storage library seen as a black box.
//!
//! [`ForeignLibrary`] is the single seam between the bridge and `libuplink`.
//! Production code resolves it from a shared object (`bridge-native`); tests
//! plug in an in-memory stand-in (`bridge-sim`). Every method is a direct,
//! blocking call-through with C semantics, so all of them are `unsafe`:
//!
//! - pointer arguments must be valid for the duration of the call,
//! - every non-null pointer returned (including the `error` slot of a result
//!   record) is owned by the library and must be handed back to exactly one
//!   matching `free_*` method,
//! - blocking methods must never be called from the host thread.

use std::os::raw::{c_char, c_void};

use crate::ffi::*;

pub trait ForeignLibrary: Send + Sync {
    /// Human readable origin of this implementation (a path or a label).
    fn describe(&self) -> String;

    // ---- access ----------------------------------------------------------

    unsafe fn parse_access(&self, access: *const c_char) -> UplinkAccessResult;

    unsafe fn request_access_with_passphrase(
        &self,
        satellite_address: *const c_char,
        api_key: *const c_char,
        passphrase: *const c_char,
    ) -> UplinkAccessResult;

    unsafe fn access_serialize(&self, access: *mut UplinkAccess) -> UplinkStringResult;

    unsafe fn access_satellite_address(&self, access: *mut UplinkAccess) -> UplinkStringResult;

    unsafe fn config_request_access_with_passphrase(
        &self,
        config: UplinkConfig,
        satellite_address: *const c_char,
        api_key: *const c_char,
        passphrase: *const c_char,
    ) -> UplinkAccessResult;

    /// Derives a restricted access; the result is a new, independent grant.
    unsafe fn access_share(
        &self,
        access: *mut UplinkAccess,
        permission: UplinkPermission,
        prefixes: *mut UplinkSharePrefix,
        prefix_count: i64,
    ) -> UplinkAccessResult;

    unsafe fn access_override_encryption_key(
        &self,
        access: *mut UplinkAccess,
        bucket: *const c_char,
        prefix: *const c_char,
        key: *mut UplinkEncryptionKey,
    ) -> ErrorPtr;

    unsafe fn derive_encryption_key(
        &self,
        passphrase: *const c_char,
        salt: *mut c_void,
        length: usize,
    ) -> UplinkEncryptionKeyResult;

    // ---- project ---------------------------------------------------------

    unsafe fn open_project(&self, access: *mut UplinkAccess) -> UplinkProjectResult;

    unsafe fn config_open_project(
        &self,
        config: UplinkConfig,
        access: *mut UplinkAccess,
    ) -> UplinkProjectResult;

    unsafe fn close_project(&self, project: *mut UplinkProject) -> ErrorPtr;

    unsafe fn revoke_access(
        &self,
        project: *mut UplinkProject,
        access: *mut UplinkAccess,
    ) -> ErrorPtr;

    // ---- buckets ---------------------------------------------------------

    unsafe fn create_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult;

    unsafe fn ensure_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult;

    unsafe fn stat_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult;

    unsafe fn delete_bucket(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult;

    unsafe fn delete_bucket_with_objects(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
    ) -> UplinkBucketResult;

    unsafe fn list_buckets(
        &self,
        project: *mut UplinkProject,
        options: *mut UplinkListBucketsOptions,
    ) -> *mut UplinkBucketIterator;

    unsafe fn bucket_iterator_next(&self, iterator: *mut UplinkBucketIterator) -> bool;

    unsafe fn bucket_iterator_item(&self, iterator: *mut UplinkBucketIterator) -> *mut UplinkBucket;

    unsafe fn bucket_iterator_err(&self, iterator: *mut UplinkBucketIterator) -> ErrorPtr;

    unsafe fn free_bucket_iterator(&self, iterator: *mut UplinkBucketIterator);

    // ---- objects ---------------------------------------------------------

    unsafe fn stat_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
    ) -> UplinkObjectResult;

    unsafe fn delete_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
    ) -> UplinkObjectResult;

    unsafe fn update_object_metadata(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        metadata: UplinkCustomMetadata,
        options: *mut UplinkUploadObjectMetadataOptions,
    ) -> ErrorPtr;

    unsafe fn list_objects(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        options: *mut UplinkListObjectsOptions,
    ) -> *mut UplinkObjectIterator;

    unsafe fn object_iterator_next(&self, iterator: *mut UplinkObjectIterator) -> bool;

    unsafe fn object_iterator_item(&self, iterator: *mut UplinkObjectIterator) -> *mut UplinkObject;

    unsafe fn object_iterator_err(&self, iterator: *mut UplinkObjectIterator) -> ErrorPtr;

    unsafe fn free_object_iterator(&self, iterator: *mut UplinkObjectIterator);

    unsafe fn copy_object(
        &self,
        project: *mut UplinkProject,
        old_bucket: *const c_char,
        old_key: *const c_char,
        new_bucket: *const c_char,
        new_key: *const c_char,
        options: *mut UplinkCopyObjectOptions,
    ) -> UplinkObjectResult;

    unsafe fn move_object(
        &self,
        project: *mut UplinkProject,
        old_bucket: *const c_char,
        old_key: *const c_char,
        new_bucket: *const c_char,
        new_key: *const c_char,
        options: *mut UplinkMoveObjectOptions,
    ) -> ErrorPtr;

    // ---- uploads ---------------------------------------------------------

    unsafe fn upload_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkUploadOptions,
    ) -> UplinkUploadResult;

    unsafe fn upload_write(
        &self,
        upload: *mut UplinkUpload,
        bytes: *mut c_void,
        length: usize,
    ) -> UplinkWriteResult;

    unsafe fn upload_set_custom_metadata(
        &self,
        upload: *mut UplinkUpload,
        metadata: UplinkCustomMetadata,
    ) -> ErrorPtr;

    unsafe fn upload_commit(&self, upload: *mut UplinkUpload) -> ErrorPtr;

    unsafe fn upload_abort(&self, upload: *mut UplinkUpload) -> ErrorPtr;

    unsafe fn upload_info(&self, upload: *mut UplinkUpload) -> UplinkObjectResult;

    // ---- downloads -------------------------------------------------------

    unsafe fn download_object(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkDownloadOptions,
    ) -> UplinkDownloadResult;

    unsafe fn download_read(
        &self,
        download: *mut UplinkDownload,
        buffer: *mut c_void,
        length: usize,
    ) -> UplinkReadResult;

    unsafe fn download_info(&self, download: *mut UplinkDownload) -> UplinkObjectResult;

    unsafe fn close_download(&self, download: *mut UplinkDownload) -> ErrorPtr;

    // ---- multipart -------------------------------------------------------

    unsafe fn begin_upload(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut UplinkUploadOptions,
    ) -> UplinkUploadInfoResult;

    unsafe fn commit_upload(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        options: *mut UplinkCommitUploadOptions,
    ) -> UplinkCommitUploadResult;

    unsafe fn abort_upload(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
    ) -> ErrorPtr;

    unsafe fn upload_part(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        part_number: u32,
    ) -> UplinkPartUploadResult;

    unsafe fn part_upload_write(
        &self,
        part_upload: *mut UplinkPartUpload,
        bytes: *mut c_void,
        length: usize,
    ) -> UplinkWriteResult;

    unsafe fn part_upload_commit(&self, part_upload: *mut UplinkPartUpload) -> ErrorPtr;

    unsafe fn part_upload_abort(&self, part_upload: *mut UplinkPartUpload) -> ErrorPtr;

    unsafe fn part_upload_set_etag(
        &self,
        part_upload: *mut UplinkPartUpload,
        etag: *const c_char,
    ) -> ErrorPtr;

    unsafe fn part_upload_info(&self, part_upload: *mut UplinkPartUpload) -> UplinkPartResult;

    unsafe fn list_upload_parts(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        key: *const c_char,
        upload_id: *const c_char,
        options: *mut UplinkListUploadPartsOptions,
    ) -> *mut UplinkPartIterator;

    unsafe fn part_iterator_next(&self, iterator: *mut UplinkPartIterator) -> bool;

    unsafe fn part_iterator_item(&self, iterator: *mut UplinkPartIterator) -> *mut UplinkPart;

    unsafe fn part_iterator_err(&self, iterator: *mut UplinkPartIterator) -> ErrorPtr;

    unsafe fn free_part_iterator(&self, iterator: *mut UplinkPartIterator);

    unsafe fn list_uploads(
        &self,
        project: *mut UplinkProject,
        bucket: *const c_char,
        options: *mut UplinkListUploadsOptions,
    ) -> *mut UplinkUploadIterator;

    unsafe fn upload_iterator_next(&self, iterator: *mut UplinkUploadIterator) -> bool;

    unsafe fn upload_iterator_item(&self, iterator: *mut UplinkUploadIterator)
        -> *mut UplinkUploadInfo;

    unsafe fn upload_iterator_err(&self, iterator: *mut UplinkUploadIterator) -> ErrorPtr;

    unsafe fn free_upload_iterator(&self, iterator: *mut UplinkUploadIterator);

    // ---- edge ------------------------------------------------------------

    unsafe fn edge_register_access(
        &self,
        config: EdgeConfig,
        access: *mut UplinkAccess,
        options: *mut EdgeRegisterAccessOptions,
    ) -> EdgeCredentialsResult;

    unsafe fn edge_join_share_url(
        &self,
        base_url: *const c_char,
        access_key_id: *const c_char,
        bucket: *const c_char,
        key: *const c_char,
        options: *mut EdgeShareUrlOptions,
    ) -> UplinkStringResult;

    // ---- release ---------------------------------------------------------

    unsafe fn free_error(&self, error: ErrorPtr);

    unsafe fn free_access_result(&self, result: UplinkAccessResult);

    unsafe fn free_project_result(&self, result: UplinkProjectResult);

    unsafe fn free_bucket_result(&self, result: UplinkBucketResult);

    unsafe fn free_bucket(&self, bucket: *mut UplinkBucket);

    unsafe fn free_object_result(&self, result: UplinkObjectResult);

    unsafe fn free_object(&self, object: *mut UplinkObject);

    unsafe fn free_upload_result(&self, result: UplinkUploadResult);

    unsafe fn free_download_result(&self, result: UplinkDownloadResult);

    unsafe fn free_string_result(&self, result: UplinkStringResult);

    unsafe fn free_encryption_key_result(&self, result: UplinkEncryptionKeyResult);

    unsafe fn free_upload_info_result(&self, result: UplinkUploadInfoResult);

    unsafe fn free_upload_info(&self, info: *mut UplinkUploadInfo);

    unsafe fn free_commit_upload_result(&self, result: UplinkCommitUploadResult);

    unsafe fn free_part_upload_result(&self, result: UplinkPartUploadResult);

    unsafe fn free_part_result(&self, result: UplinkPartResult);

    unsafe fn free_part(&self, part: *mut UplinkPart);

    unsafe fn edge_free_credentials_result(&self, result: EdgeCredentialsResult);
}
