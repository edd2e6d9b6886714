//! The code → exception class table.

use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::exception::{ErrorKind, ExceptionClass, Realm, TypedException, UMBRELLA_CLASS};

/// The class table produced by [`ErrorRegistry::initialize`], keyed by class
/// name so a host can re-export it (`StorjError`, `BucketNotFoundError`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClasses {
    realm: Realm,
    classes: IndexMap<&'static str, ExceptionClass>,
}

impl ErrorClasses {
    fn bind(realm: Realm) -> Self {
        let mut classes = IndexMap::with_capacity(ErrorKind::ALL.len() + 1);
        classes.insert(UMBRELLA_CLASS, ExceptionClass::umbrella(realm));
        for kind in ErrorKind::ALL {
            classes.insert(kind.class_name(), ExceptionClass::for_kind(realm, kind));
        }
        Self { realm, classes }
    }

    pub fn realm(&self) -> Realm {
        self.realm
    }

    pub fn get(&self, name: &str) -> Option<ExceptionClass> {
        self.classes.get(name).copied()
    }

    pub fn umbrella(&self) -> ExceptionClass {
        ExceptionClass::umbrella(self.realm)
    }

    pub fn of(&self, kind: ErrorKind) -> ExceptionClass {
        ExceptionClass::for_kind(self.realm, kind)
    }

    /// Classes in declaration order, umbrella first.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, ExceptionClass)> + '_ {
        self.classes.iter().map(|(name, class)| (*name, *class))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn construct(&self, code: i32, message: &str) -> TypedException {
        match ErrorKind::from_code(code) {
            Some(kind) => self.of(kind).instantiate(code, message),
            None => self.umbrella().instantiate(code, message),
        }
    }
}

/// Single source of truth for projecting foreign codes, re-initialisable.
///
/// Starts uninitialised; projections made before [`initialize`](Self::initialize)
/// produce generic exceptions.
#[derive(Debug, Default)]
pub struct ErrorRegistry {
    classes: RwLock<Option<ErrorClasses>>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the class table to `realm`, or to [`Realm::global`] when none is
    /// given. Any previous binding is dropped first.
    pub fn initialize(&self, realm: Option<Realm>) -> ErrorClasses {
        let mut slot = self.classes.write().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            debug!("Dropped previous error class bindings");
        }

        let realm = realm.unwrap_or_default();
        let classes = ErrorClasses::bind(realm);
        info!(
            classes = classes.len(),
            realm = realm.id(),
            "Initialised error classes"
        );
        *slot = Some(classes.clone());
        classes
    }

    pub fn reset(&self) {
        let mut slot = self.classes.write().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            info!("Error registry cleaned up");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn classes(&self) -> Option<ErrorClasses> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Projects a foreign failure. Never fails: unmapped codes become the
    /// umbrella class, and an uninitialised registry yields a generic
    /// exception.
    pub fn create_typed_exception(&self, code: i32, message: &str) -> TypedException {
        let slot = self.classes.read().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(classes) => {
                let exception = classes.construct(code, message);
                debug!(code, class = exception.name(), "Created typed exception");
                exception
            }
            None => {
                debug!(code, "Error classes not initialised, using generic exception");
                TypedException::generic(code, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_umbrella_and_every_kind() {
        let registry = ErrorRegistry::new();
        let classes = registry.initialize(None);

        assert_eq!(classes.len(), ErrorKind::ALL.len() + 1);
        assert_eq!(classes.iter().next().map(|(name, _)| name), Some(UMBRELLA_CLASS));
        assert!(classes.get("UploadDoneError").is_some());
        assert!(classes.realm().is_global());
    }

    #[test]
    fn test_reinitialize_rebinds_realm() {
        let registry = ErrorRegistry::new();
        let first = registry.initialize(None);
        let sandbox = Realm::isolated();
        let second = registry.initialize(Some(sandbox));

        let exception = registry.create_typed_exception(0x21, "gone");
        assert!(exception.is_a(&second.of(ErrorKind::ObjectNotFound)));
        assert!(!exception.is_a(&first.of(ErrorKind::ObjectNotFound)));
    }

    #[test]
    fn test_reset_falls_back_to_generic() {
        let registry = ErrorRegistry::new();
        let classes = registry.initialize(None);
        registry.reset();

        let exception = registry.create_typed_exception(0x13, "bucket not found");
        assert!(!registry.is_initialized());
        assert!(!exception.is_a(&classes.umbrella()));
        assert_eq!(exception.message(), "bucket not found");
    }
}
