use std::fmt;
use std::sync::Arc;

use crate::container::autowiring::{downcast, Instance, ParamOverride};
use crate::container::descriptor::TypeKey;
use crate::container::ioc_container::Injector;
use crate::container::scope::WeakInjector;
use crate::errors::CoreError;

/// Handle constructing a fresh, uncached instance of one type on every call
///
/// Positions left without an override are resolved by the engine.
#[derive(Clone)]
pub struct AutoFactory {
    key: TypeKey,
    scope: WeakInjector,
}

impl AutoFactory {
    pub fn new(key: TypeKey, scope: &Injector) -> Self {
        Self {
            key,
            scope: scope.downgrade(),
        }
    }

    /// The type this factory constructs
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn create(&self) -> Result<Instance, CoreError> {
        self.create_with(Vec::new())
    }

    /// Construct with explicit values for some constructor positions
    pub fn create_with(&self, params: Vec<Option<ParamOverride>>) -> Result<Instance, CoreError> {
        let scope = self.scope.upgrade()?;
        scope.create_unmanaged(self.key, params)
    }

    /// Construct and downcast
    pub fn create_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        downcast::<T>(self.create()?)
    }
}

impl fmt::Debug for AutoFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoFactory")
            .field("key", &self.key.short_name())
            .field("scope", &self.scope.id())
            .finish()
    }
}
