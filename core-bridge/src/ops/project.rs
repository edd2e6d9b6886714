use std::ffi::CString;
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;

use bridge_traits::ffi::UplinkConfig;
use core_runtime::BridgeConfig;
use serde::Serialize;

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleKind, Resource};
use crate::marshal::c_string;
use crate::work::PendingFuture;

use super::{into_handle, owned, settled};

/// Settings for `config_open_project`. Unset fields fall back to the
/// bridge defaults, then to the library's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub user_agent: Option<String>,
    /// Passed through to the library untouched; no timeout is enforced here.
    pub dial_timeout: Option<Duration>,
    pub temp_directory: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defaults(config: &BridgeConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            dial_timeout: config.dial_timeout,
            temp_directory: config.temp_directory.clone(),
        }
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    pub fn with_temp_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_directory = Some(dir.into());
        self
    }

    /// Fields set here win over `defaults`.
    pub fn or(&self, defaults: &ProjectConfig) -> ProjectConfig {
        ProjectConfig {
            user_agent: self.user_agent.clone().or_else(|| defaults.user_agent.clone()),
            dial_timeout: self.dial_timeout.or(defaults.dial_timeout),
            temp_directory: self
                .temp_directory
                .clone()
                .or_else(|| defaults.temp_directory.clone()),
        }
    }

    pub(super) fn to_foreign(&self) -> Result<ForeignConfig> {
        let dial_timeout_milliseconds = match self.dial_timeout {
            None => 0,
            Some(timeout) => i32::try_from(timeout.as_millis()).map_err(|_| {
                BridgeError::InvalidArgument(format!(
                    "dial timeout of {} ms does not fit in 32 bits",
                    timeout.as_millis()
                ))
            })?,
        };

        let temp_directory = match &self.temp_directory {
            None => None,
            Some(dir) => {
                let dir = dir.to_str().ok_or_else(|| {
                    BridgeError::InvalidArgument("temp directory must be valid UTF-8".to_string())
                })?;
                Some(c_string("temp directory", dir)?)
            }
        };

        Ok(ForeignConfig {
            user_agent: self
                .user_agent
                .as_deref()
                .map(|agent| c_string("user agent", agent))
                .transpose()?,
            dial_timeout_milliseconds,
            temp_directory,
        })
    }
}

/// Owned strings behind an `UplinkConfig`.
pub(super) struct ForeignConfig {
    user_agent: Option<CString>,
    dial_timeout_milliseconds: i32,
    temp_directory: Option<CString>,
}

impl ForeignConfig {
    pub(super) fn as_raw(&self) -> UplinkConfig {
        UplinkConfig {
            user_agent: self.user_agent.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            dial_timeout_milliseconds: self.dial_timeout_milliseconds,
            temp_directory: self.temp_directory.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
        }
    }
}

impl Bridge {
    pub fn open_project(&self, access: &Handle) -> Result<PendingFuture<Handle>> {
        let access = self.lease(access, HandleKind::Access)?;
        self.submit(
            "open_project",
            access,
            |library, access| unsafe { owned(library, library.open_project(access.as_ptr())) },
            |ctx, _, result| into_handle(ctx, result, Resource::Project),
        )
    }

    /// Opens a project with explicit settings merged over the bridge
    /// defaults.
    pub fn config_open_project(
        &self,
        config: &ProjectConfig,
        access: &Handle,
    ) -> Result<PendingFuture<Handle>> {
        let foreign = config.or(self.project_defaults()).to_foreign()?;
        let access = self.lease(access, HandleKind::Access)?;
        self.submit(
            "config_open_project",
            (foreign, access),
            |library, (config, access)| unsafe {
                owned(
                    library,
                    library.config_open_project(config.as_raw(), access.as_ptr()),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::Project),
        )
    }

    /// Closes the project session. The handle still has to be released.
    pub fn close_project(&self, project: &Handle) -> Result<PendingFuture<()>> {
        let project = self.lease(project, HandleKind::Project)?;
        self.submit(
            "close_project",
            project,
            |library, project| unsafe { owned(library, library.close_project(project.as_ptr())) },
            |ctx, _, error| settled(ctx, error),
        )
    }

    /// Revokes `access` and everything shared from it, through the
    /// satellite `project` is connected to.
    pub fn revoke_access(&self, project: &Handle, access: &Handle) -> Result<PendingFuture<()>> {
        let project = self.lease(project, HandleKind::Project)?;
        let access = self.lease(access, HandleKind::Access)?;
        self.submit(
            "revoke_access",
            (project, access),
            |library, (project, access)| unsafe {
                owned(library, library.revoke_access(project.as_ptr(), access.as_ptr()))
            },
            |ctx, _, error| settled(ctx, error),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_fields_win_over_defaults() {
        let defaults = ProjectConfig::new()
            .with_user_agent("default-agent")
            .with_dial_timeout(Duration::from_secs(5));
        let merged = ProjectConfig::new().with_user_agent("explicit").or(&defaults);

        assert_eq!(merged.user_agent.as_deref(), Some("explicit"));
        assert_eq!(merged.dial_timeout, Some(Duration::from_secs(5)));
        assert_eq!(merged.temp_directory, None);
    }

    #[test]
    fn test_oversized_dial_timeout_is_rejected() {
        let config = ProjectConfig::new().with_dial_timeout(Duration::from_millis(i32::MAX as u64 + 1));
        assert!(matches!(config.to_foreign(), Err(BridgeError::InvalidArgument(_))));
    }

    #[test]
    fn test_unset_fields_become_null() {
        let foreign = ProjectConfig::new().to_foreign().unwrap();
        let raw = foreign.as_raw();
        assert!(raw.user_agent.is_null());
        assert!(raw.temp_directory.is_null());
        assert_eq!(raw.dial_timeout_milliseconds, 0);
    }
}
