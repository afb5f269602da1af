use std::collections::HashMap;
use std::sync::Arc;

use crate::container::autowiring::{Arguments, Instance};
use crate::container::binding::Registration;
use crate::container::descriptor::TypeKey;
use crate::container::ioc_container::Injector;

/// What an interceptor sees about the construction in progress
pub struct InjectionContext<'a> {
    pub key: TypeKey,
    pub registration: &'a Registration,
    /// Scope constructing the instance
    pub scope: &'a Injector,
    pub arguments: &'a Arguments,
}

/// Hook fired around every construction of its target type
///
/// Interceptors never fire on cache hits.
pub trait ConstructionInterceptor: Send + Sync {
    fn target(&self) -> TypeKey;

    fn before_create(&self, _context: &InjectionContext<'_>) {}

    fn after_create(&self, _instance: &Instance, _context: &InjectionContext<'_>) {}
}

/// Interceptors keyed by target type, kept by the root scope
#[derive(Default, Clone)]
pub(crate) struct InterceptorRegistry {
    by_target: HashMap<TypeKey, Vec<Arc<dyn ConstructionInterceptor>>>,
}

impl InterceptorRegistry {
    /// Add an interceptor unless this exact instance is already registered
    pub(crate) fn add(&mut self, interceptor: Arc<dyn ConstructionInterceptor>) -> bool {
        let entries = self.by_target.entry(interceptor.target()).or_default();
        let duplicate = entries
            .iter()
            .any(|existing| same_instance(existing, &interceptor));
        if duplicate {
            return false;
        }
        entries.push(interceptor);
        true
    }

    pub(crate) fn for_target(&self, key: &TypeKey) -> Vec<Arc<dyn ConstructionInterceptor>> {
        self.by_target.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn clear(&mut self) {
        self.by_target.clear();
    }
}

fn same_instance(a: &Arc<dyn ConstructionInterceptor>, b: &Arc<dyn ConstructionInterceptor>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
