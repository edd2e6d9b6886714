use std::ffi::CString;
use std::ptr;

use bridge_traits::ffi::{ErrorPtr, UplinkEncryptionKey, UplinkPermission, UplinkSharePrefix};
use chrono::serde::ts_seconds_option;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleKind, Lease, Resource};
use crate::marshal::{c_string, timestamp_seconds};
use crate::work::PendingFuture;

use super::project::ProjectConfig;
use super::{into_handle, owned, settled, string_record};

/// What a shared access may do. An unset bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub allow_download: bool,
    pub allow_upload: bool,
    pub allow_list: bool,
    pub allow_delete: bool,
    #[serde(with = "ts_seconds_option")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(with = "ts_seconds_option")]
    pub not_after: Option<DateTime<Utc>>,
}

impl Permission {
    pub fn full() -> Self {
        Self {
            allow_download: true,
            allow_upload: true,
            allow_list: true,
            allow_delete: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            allow_download: true,
            allow_list: true,
            ..Self::default()
        }
    }

    pub fn with_not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }

    pub fn with_not_after(mut self, at: DateTime<Utc>) -> Self {
        self.not_after = Some(at);
        self
    }

    fn to_foreign(self) -> UplinkPermission {
        UplinkPermission {
            allow_download: self.allow_download,
            allow_upload: self.allow_upload,
            allow_list: self.allow_list,
            allow_delete: self.allow_delete,
            not_before: timestamp_seconds(self.not_before),
            not_after: timestamp_seconds(self.not_after),
        }
    }
}

/// A bucket, optionally narrowed to a key prefix, that a shared access covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePrefix {
    pub bucket: String,
    pub prefix: Option<String>,
}

impl SharePrefix {
    pub fn bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

struct ShareInput {
    access: Lease,
    permission: UplinkPermission,
    /// Bucket and prefix per entry; a missing prefix is passed as null.
    prefixes: Vec<(CString, Option<CString>)>,
}

impl Bridge {
    /// Parses a serialized access grant into an access handle.
    pub fn parse_access(&self, grant: &str) -> Result<PendingFuture<Handle>> {
        let grant = c_string("access grant", grant)?;
        self.submit(
            "parse_access",
            grant,
            |library, grant| unsafe { owned(library, library.parse_access(grant.as_ptr())) },
            |ctx, _, result| into_handle(ctx, result, Resource::Access),
        )
    }

    /// Derives an access grant from an API key and an encryption passphrase.
    pub fn request_access_with_passphrase(
        &self,
        satellite_address: &str,
        api_key: &str,
        passphrase: &str,
    ) -> Result<PendingFuture<Handle>> {
        let input = (
            c_string("satellite address", satellite_address)?,
            c_string("API key", api_key)?,
            c_string("passphrase", passphrase)?,
        );
        self.submit(
            "request_access_with_passphrase",
            input,
            |library, (satellite, key, passphrase)| unsafe {
                owned(
                    library,
                    library.request_access_with_passphrase(
                        satellite.as_ptr(),
                        key.as_ptr(),
                        passphrase.as_ptr(),
                    ),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::Access),
        )
    }

    /// Like [`request_access_with_passphrase`](Self::request_access_with_passphrase),
    /// dialing the satellite with explicit settings merged over the bridge
    /// defaults.
    pub fn config_request_access_with_passphrase(
        &self,
        config: &ProjectConfig,
        satellite_address: &str,
        api_key: &str,
        passphrase: &str,
    ) -> Result<PendingFuture<Handle>> {
        let input = (
            config.or(self.project_defaults()).to_foreign()?,
            c_string("satellite address", satellite_address)?,
            c_string("API key", api_key)?,
            c_string("passphrase", passphrase)?,
        );
        self.submit(
            "config_request_access_with_passphrase",
            input,
            |library, (config, satellite, key, passphrase)| unsafe {
                owned(
                    library,
                    library.config_request_access_with_passphrase(
                        config.as_raw(),
                        satellite.as_ptr(),
                        key.as_ptr(),
                        passphrase.as_ptr(),
                    ),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::Access),
        )
    }

    /// Derives a restricted access. The new handle is independent of
    /// `access`; either may be released first.
    pub fn access_share(
        &self,
        access: &Handle,
        permission: Permission,
        prefixes: &[SharePrefix],
    ) -> Result<PendingFuture<Handle>> {
        let prefixes = prefixes
            .iter()
            .map(|shared| {
                Ok((
                    c_string("shared bucket", &shared.bucket)?,
                    shared
                        .prefix
                        .as_deref()
                        .map(|prefix| c_string("shared prefix", prefix))
                        .transpose()?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let prefix_count = i64::try_from(prefixes.len()).map_err(|_| {
            BridgeError::InvalidArgument(format!("too many shared prefixes: {}", prefixes.len()))
        })?;
        let input = ShareInput {
            access: self.lease(access, HandleKind::Access)?,
            permission: permission.to_foreign(),
            prefixes,
        };
        self.submit(
            "access_share",
            input,
            move |library, input| unsafe {
                let mut raw: Vec<UplinkSharePrefix> = input
                    .prefixes
                    .iter()
                    .map(|(bucket, prefix)| UplinkSharePrefix {
                        bucket: bucket.as_ptr(),
                        prefix: prefix.as_ref().map_or(ptr::null(), |p| p.as_ptr()),
                    })
                    .collect();
                let prefixes = if raw.is_empty() {
                    ptr::null_mut()
                } else {
                    raw.as_mut_ptr()
                };
                owned(
                    library,
                    library.access_share(input.access.as_ptr(), input.permission, prefixes, prefix_count),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::Access),
        )
    }

    /// Uses `key` instead of the access's own key for `bucket`/`prefix`.
    pub fn access_override_encryption_key(
        &self,
        access: &Handle,
        bucket: &str,
        prefix: &str,
        key: &Handle,
    ) -> Result<PendingFuture<()>> {
        let (bucket, prefix) = (c_string("bucket name", bucket)?, c_string("prefix", prefix)?);
        let access = self.lease(access, HandleKind::Access)?;
        let key = self.lease(key, HandleKind::EncryptionKey)?;
        self.submit(
            "access_override_encryption_key",
            (access, bucket, prefix, key),
            |library, (access, bucket, prefix, key)| unsafe {
                owned::<ErrorPtr>(
                    library,
                    library.access_override_encryption_key(
                        access.as_ptr(),
                        bucket.as_ptr(),
                        prefix.as_ptr(),
                        key.as_ptr::<UplinkEncryptionKey>(),
                    ),
                )
            },
            |ctx, _, error| settled(ctx, error),
        )
    }

    /// Serializes an access back into a grant string.
    pub fn access_serialize(&self, access: &Handle) -> Result<PendingFuture<String>> {
        let access = self.lease(access, HandleKind::Access)?;
        self.submit(
            "access_serialize",
            access,
            |library, access| unsafe { owned(library, library.access_serialize(access.as_ptr())) },
            |ctx, _, result| string_record(ctx, result),
        )
    }

    pub fn access_satellite_address(&self, access: &Handle) -> Result<PendingFuture<String>> {
        let access = self.lease(access, HandleKind::Access)?;
        self.submit(
            "access_satellite_address",
            access,
            |library, access| unsafe {
                owned(library, library.access_satellite_address(access.as_ptr()))
            },
            |ctx, _, result| string_record(ctx, result),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_bounds_map_to_seconds() {
        let at = chrono::TimeZone::timestamp_opt(&Utc, 1_700_000_000, 0).unwrap();
        let raw = Permission::read_only().with_not_after(at).to_foreign();

        assert!(raw.allow_download && raw.allow_list);
        assert!(!raw.allow_upload && !raw.allow_delete);
        assert_eq!(raw.not_before, 0);
        assert_eq!(raw.not_after, 1_700_000_000);
    }
}
