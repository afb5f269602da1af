use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::autowiring::{downcast, Instance};
use crate::container::descriptor::Target;
use crate::container::ioc_container::Injector;
use crate::container::scope::WeakInjector;
use crate::errors::CoreError;

/// Deferred resolution, performed on first access and memoized
///
/// Clones share the memoized value. A failed resolution is not memoized.
#[derive(Clone)]
pub struct LazyInstance {
    target: Target,
    scope: WeakInjector,
    value: Arc<Mutex<Option<Instance>>>,
}

impl LazyInstance {
    pub fn new(target: Target, scope: &Injector) -> Self {
        Self {
            target,
            scope: scope.downgrade(),
            value: Arc::new(Mutex::new(None)),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn has_value(&self) -> bool {
        self.value.lock().is_some()
    }

    /// Resolve on first call, then return the memoized instance
    pub fn value(&self) -> Result<Instance, CoreError> {
        if let Some(instance) = self.value.lock().as_ref() {
            return Ok(instance.clone());
        }

        let resolved = self.scope.upgrade()?.resolve(self.target.clone())?;

        let mut slot = self.value.lock();
        Ok(slot.get_or_insert(resolved).clone())
    }

    pub fn value_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        downcast::<T>(self.value()?)
    }
}

impl fmt::Debug for LazyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyInstance")
            .field("target", &self.target)
            .field("has_value", &self.has_value())
            .finish()
    }
}
