use parking_lot::Mutex;

use crate::container::autowiring::Instance;
use crate::container::binding::ValueSource;
use crate::container::scope::WeakInjector;
use crate::errors::CoreError;

/// Cache-resident wrapper around a value registered by token
///
/// The engine stores the box under a synthetic key and unboxes it on every
/// resolution, so callers only ever see the inner value.
pub struct BoxedValue {
    scope: WeakInjector,
    source: ValueSource,
    memo: Mutex<Option<Instance>>,
}

impl BoxedValue {
    pub(crate) fn new(scope: WeakInjector, source: ValueSource) -> Self {
        Self {
            scope,
            source,
            memo: Mutex::new(None),
        }
    }

    /// Produce the inner value
    ///
    /// A resolver runs against the registering scope; its result is memoized
    /// only when cache syncing is on.
    pub fn unbox(&self) -> Result<Instance, CoreError> {
        match &self.source {
            ValueSource::Literal(value) => Ok(value.clone()),
            ValueSource::Resolver {
                resolver,
                cache_syncing,
            } => {
                if let Some(value) = self.memo.lock().as_ref() {
                    return Ok(value.clone());
                }

                let scope = self.scope.upgrade()?;
                let value = resolver(&scope)?;
                if *cache_syncing {
                    return Ok(self.memo.lock().get_or_insert(value).clone());
                }
                Ok(value)
            }
        }
    }
}

/// Replace a boxed value with its content; other instances pass through
pub(crate) fn unbox(instance: Instance) -> Result<Instance, CoreError> {
    if let Some(boxed) = instance.downcast_ref::<BoxedValue>() {
        return boxed.unbox();
    }
    Ok(instance)
}
