//! The bridge context every operation goes through.

use std::fmt;
use std::sync::Arc;

use bridge_native::{LibraryLoader, LibraryOpener};
use bridge_traits::ForeignLibrary;
use core_async::{HostLoop, WorkerPool};
use core_runtime::BridgeConfig;
use tracing::{info, warn};

use crate::error::{BridgeError, Result};
use crate::exception::Realm;
use crate::handle::{Handle, HandleKind, HandleRegistry, Lease};
use crate::ops::ProjectConfig;
use crate::registry::{ErrorClasses, ErrorRegistry};
use crate::work::{HostContext, PendingFuture, WorkBridge, WorkStatsSnapshot};

enum Backend {
    Ready {
        library: Arc<dyn ForeignLibrary>,
        work: WorkBridge,
    },
    Unavailable {
        reason: String,
    },
}

/// One bridge instance: a foreign library, its worker pool, the handle
/// table and the error registry.
///
/// Created together with the [`HostLoop`] that runs its completions. The
/// loop must be driven on the host thread for any future to settle.
pub struct Bridge {
    backend: Backend,
    handles: HandleRegistry,
    errors: Arc<ErrorRegistry>,
    defaults: ProjectConfig,
}

impl Bridge {
    /// Builds a bridge over an already opened library.
    pub fn with_library(
        library: Arc<dyn ForeignLibrary>,
        config: &BridgeConfig,
    ) -> Result<(Self, HostLoop<HostContext>)> {
        config.validate()?;
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);
        let (bridge, host) = Self::assemble(config, |handles, errors| {
            let host = HostLoop::new(HostContext::new(handles, errors));
            let work = WorkBridge::new(pool, host.sender());
            (Backend::Ready { library, work }, host)
        });

        info!(
            library = %bridge.describe(),
            workers = config.worker_threads,
            "Bridge ready"
        );
        Ok((bridge, host))
    }

    /// Loads `libuplink` through the configured search path.
    ///
    /// A library that cannot be found is not an error here: the returned
    /// bridge reports [`BridgeError::LibraryUnavailable`] from every
    /// operation instead.
    pub fn from_config(config: &BridgeConfig) -> Result<(Self, HostLoop<HostContext>)> {
        Self::from_loader(&LibraryLoader::new(config.library_path.clone()), config)
    }

    pub fn from_loader<O: LibraryOpener>(
        loader: &LibraryLoader<O>,
        config: &BridgeConfig,
    ) -> Result<(Self, HostLoop<HostContext>)> {
        match loader.load() {
            Ok(loaded) => {
                info!(path = %loaded.path.display(), "Loaded libuplink");
                Self::with_library(loaded.library, config)
            }
            Err(err) => {
                warn!(error = %err, "libuplink unavailable; every operation will fail");
                config.validate()?;
                Ok(Self::unavailable(err.to_string(), config))
            }
        }
    }

    /// A bridge without a library.
    pub fn unavailable(reason: impl Into<String>, config: &BridgeConfig) -> (Self, HostLoop<HostContext>) {
        let reason = reason.into();
        Self::assemble(config, |handles, errors| {
            let host = HostLoop::new(HostContext::new(handles, errors));
            (Backend::Unavailable { reason }, host)
        })
    }

    fn assemble<F>(config: &BridgeConfig, backend: F) -> (Self, HostLoop<HostContext>)
    where
        F: FnOnce(HandleRegistry, Arc<ErrorRegistry>) -> (Backend, HostLoop<HostContext>),
    {
        let handles = HandleRegistry::new();
        let errors = Arc::new(ErrorRegistry::new());
        let (backend, host) = backend(handles.clone(), Arc::clone(&errors));
        let bridge = Self {
            backend,
            handles,
            errors,
            defaults: ProjectConfig::from_defaults(config),
        };
        (bridge, host)
    }

    /// Builds the exception classes for `realm` (the global realm when
    /// `None`), replacing any earlier binding.
    pub fn init_error_classes(&self, realm: Option<Realm>) -> ErrorClasses {
        self.errors.initialize(realm)
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.errors
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, Backend::Ready { .. })
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.backend {
            Backend::Ready { .. } => None,
            Backend::Unavailable { reason } => Some(reason),
        }
    }

    pub fn describe(&self) -> String {
        match &self.backend {
            Backend::Ready { library, .. } => library.describe(),
            Backend::Unavailable { reason } => format!("unavailable ({})", reason),
        }
    }

    /// Task counters; all zero for an unavailable bridge.
    pub fn stats(&self) -> WorkStatsSnapshot {
        match &self.backend {
            Backend::Ready { work, .. } => work.stats(),
            Backend::Unavailable { .. } => WorkStatsSnapshot::default(),
        }
    }

    /// Defaults applied by `config_open_project`.
    pub fn project_defaults(&self) -> &ProjectConfig {
        &self.defaults
    }

    /// Explicit release of any handle this bridge issued.
    pub fn release(&self, handle: &Handle) -> bool {
        self.handles.release(handle)
    }

    fn ready(&self) -> Result<(&Arc<dyn ForeignLibrary>, &WorkBridge)> {
        match &self.backend {
            Backend::Ready { library, work } => Ok((library, work)),
            Backend::Unavailable { reason } => Err(BridgeError::LibraryUnavailable(reason.clone())),
        }
    }

    pub(crate) fn lease(&self, handle: &Handle, kind: HandleKind) -> Result<Lease> {
        self.handles.lease(handle, kind)
    }

    /// Submits one foreign call. `execute` receives the library.
    pub(crate) fn submit<I, R, T, E, C>(
        &self,
        name: &'static str,
        input: I,
        execute: E,
        complete: C,
    ) -> Result<PendingFuture<T>>
    where
        I: Send + 'static,
        R: Send + 'static,
        T: Send + 'static,
        E: FnOnce(&Arc<dyn ForeignLibrary>, &mut I) -> R + Send + 'static,
        C: FnOnce(&HostContext, I, R) -> Result<T> + Send + 'static,
    {
        let (library, work) = self.ready()?;
        let library = Arc::clone(library);
        work.submit(name, input, move |input| execute(&library, input), complete)
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("library", &self.describe())
            .field("handles", &self.handles)
            .field("stats", &self.stats())
            .finish()
    }
}
