//! Edge services: registering an access with an auth service for
//! S3-compatible credentials, and building linksharing URLs.

use std::ffi::CString;
use std::ptr;

use bridge_traits::ffi::{self, EdgeRegisterAccessOptions, EdgeShareUrlOptions};
use serde::Serialize;

use crate::bridge::Bridge;
use crate::error::Result;
use crate::handle::{Handle, HandleKind, Lease};
use crate::marshal::{c_string, EdgeCredentials};
use crate::work::PendingFuture;

use super::{missing, owned, string_record, succeeded};

/// Where and how to reach the auth service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConfig {
    /// `host:port` of the auth service.
    pub auth_service_address: String,
    /// PEM bundle to trust instead of the system roots.
    pub certificate_pem: Option<String>,
    pub insecure_unencrypted_connection: bool,
}

impl EdgeConfig {
    pub fn new(auth_service_address: impl Into<String>) -> Self {
        Self {
            auth_service_address: auth_service_address.into(),
            ..Self::default()
        }
    }

    pub fn with_certificate_pem(mut self, pem: impl Into<String>) -> Self {
        self.certificate_pem = Some(pem.into());
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure_unencrypted_connection = insecure;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareUrlOptions {
    /// Link directly to the object data rather than its landing page.
    pub raw: bool,
}

struct RegisterInput {
    access: Lease,
    address: CString,
    certificate_pem: Option<CString>,
    insecure: bool,
    is_public: bool,
}

impl Bridge {
    /// Registers `access` with the auth service. Public registrations can
    /// back share URLs.
    pub fn edge_register_access(
        &self,
        config: &EdgeConfig,
        access: &Handle,
        is_public: bool,
    ) -> Result<PendingFuture<EdgeCredentials>> {
        let input = RegisterInput {
            address: c_string("auth service address", &config.auth_service_address)?,
            certificate_pem: config
                .certificate_pem
                .as_deref()
                .map(|pem| c_string("certificate PEM", pem))
                .transpose()?,
            insecure: config.insecure_unencrypted_connection,
            is_public,
            access: self.lease(access, HandleKind::Access)?,
        };
        self.submit(
            "edge_register_access",
            input,
            |library, input| unsafe {
                let config = ffi::EdgeConfig {
                    auth_service_address: input.address.as_ptr(),
                    certificate_pem: input.certificate_pem.as_ref().map_or(ptr::null(), |p| p.as_ptr()),
                    insecure_unencrypted_connection: input.insecure,
                };
                let mut options = EdgeRegisterAccessOptions {
                    is_public: input.is_public,
                };
                owned(
                    library,
                    library.edge_register_access(config, input.access.as_ptr(), &mut options),
                )
            },
            |ctx, _, result| {
                let result = succeeded(ctx, result)?;
                let credentials = result.get().credentials;
                if credentials.is_null() {
                    return Err(missing(ctx, "credentials"));
                }
                // SAFETY: non-null and owned by `result` until it drops.
                Ok(unsafe { EdgeCredentials::from_foreign(&*credentials) })
            },
        )
    }

    /// Builds a linksharing URL for a bucket or an object under it. An empty
    /// `key` links the bucket; an empty `bucket` links everything the
    /// credentials cover.
    pub fn edge_join_share_url(
        &self,
        base_url: &str,
        access_key_id: &str,
        bucket: &str,
        key: &str,
        options: ShareUrlOptions,
    ) -> Result<PendingFuture<String>> {
        let input = (
            c_string("base URL", base_url)?,
            c_string("access key id", access_key_id)?,
            c_string("bucket name", bucket)?,
            c_string("object key", key)?,
        );
        self.submit(
            "edge_join_share_url",
            input,
            move |library, (base_url, access_key_id, bucket, key)| unsafe {
                let mut raw = EdgeShareUrlOptions { raw: options.raw };
                let raw = if options.raw {
                    &mut raw as *mut EdgeShareUrlOptions
                } else {
                    ptr::null_mut()
                };
                owned(
                    library,
                    library.edge_join_share_url(
                        base_url.as_ptr(),
                        access_key_id.as_ptr(),
                        bucket.as_ptr(),
                        key.as_ptr(),
                        raw,
                    ),
                )
            },
            |ctx, _, result| string_record(ctx, result),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EdgeConfig::new("auth.example:7777").insecure(true);

        assert_eq!(config.auth_service_address, "auth.example:7777");
        assert_eq!(config.certificate_pem, None);
        assert!(config.insecure_unencrypted_connection);
        assert_eq!(
            serde_json::to_value(&config).unwrap()["authServiceAddress"],
            "auth.example:7777"
        );
    }
}
