//! Scope tree: node state, weak handles, lookup and destruction
//!
//! Links are strong in both directions: a child keeps its whole lineage
//! alive, and a parent keeps its children reachable by name until they are
//! destroyed. `destroy` drops the parent's side of every link in the subtree,
//! so a tree is released once its root is destroyed and the handles are gone.
//! Lookups walk toward the root and never into siblings or children.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::config::Configuration;
use crate::container::binding::Registration;
use crate::container::cache::InstanceCache;
use crate::container::descriptor::{ScopeId, Target, TypeKey};
use crate::container::interceptor::InterceptorRegistry;
use crate::container::ioc_container::Injector;
use crate::container::metrics::Metrics;
use crate::container::tokens::{ParameterAnnotations, TokenRegistry};
use crate::errors::CoreError;

/// Registrations of one scope, in registration order
#[derive(Default)]
pub(crate) struct RegistrationTable {
    entries: HashMap<TypeKey, Arc<Registration>>,
    order: Vec<TypeKey>,
}

impl RegistrationTable {
    pub(crate) fn insert(&mut self, registration: Registration) {
        let key = registration.key();
        if self.entries.insert(key, Arc::new(registration)).is_none() {
            self.order.push(key);
        }
    }

    pub(crate) fn get(&self, key: &TypeKey) -> Option<Arc<Registration>> {
        self.entries.get(key).cloned()
    }

    pub(crate) fn contains(&self, key: &TypeKey) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn keys(&self) -> Vec<TypeKey> {
        self.order.clone()
    }

    pub(crate) fn values(&self) -> Vec<Arc<Registration>> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).cloned())
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// State owned by one scope
pub(crate) struct ScopeInner {
    pub(crate) id: ScopeId,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<Arc<ScopeInner>>,
    pub(crate) configuration: Arc<RwLock<Configuration>>,
    pub(crate) cache: InstanceCache,
    pub(crate) tokens: RwLock<TokenRegistry>,
    pub(crate) registrations: RwLock<RegistrationTable>,
    /// Only populated on the root
    pub(crate) interceptors: RwLock<InterceptorRegistry>,
    pub(crate) children: RwLock<Vec<Injector>>,
    pub(crate) metrics: Metrics,
    pub(crate) destroyed: AtomicBool,
}

impl ScopeInner {
    pub(crate) fn new(
        name: Option<String>,
        parent: Option<Arc<ScopeInner>>,
        configuration: Arc<RwLock<Configuration>>,
    ) -> Self {
        Self {
            id: ScopeId::new(),
            name,
            parent,
            configuration,
            cache: InstanceCache::new(),
            tokens: RwLock::new(TokenRegistry::new()),
            registrations: RwLock::new(RegistrationTable::default()),
            interceptors: RwLock::new(InterceptorRegistry::default()),
            children: RwLock::new(Vec::new()),
            metrics: Metrics::new(),
            destroyed: AtomicBool::new(false),
        }
    }
}

/// Non-owning handle to a scope, held by factories, lazy handles and boxed values
#[derive(Clone)]
pub struct WeakInjector {
    id: ScopeId,
    inner: Weak<ScopeInner>,
}

impl WeakInjector {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Upgrade, failing when the scope is gone or destroyed
    pub fn upgrade(&self) -> Result<Injector, CoreError> {
        let injector = self
            .inner
            .upgrade()
            .map(Injector::from_inner)
            .ok_or_else(|| CoreError::DestroyedScope {
                scope_id: self.id.to_string(),
            })?;
        injector.ensure_alive()?;
        Ok(injector)
    }
}

impl std::fmt::Debug for WeakInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakInjector").field("id", &self.id).finish()
    }
}

impl Injector {
    pub fn downgrade(&self) -> WeakInjector {
        WeakInjector {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), CoreError> {
        if self.is_destroyed() {
            return Err(CoreError::DestroyedScope {
                scope_id: self.inner.id.to_string(),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn parent(&self) -> Option<Injector> {
        self.inner.parent.clone().map(Injector::from_inner)
    }

    /// Direct child scopes in creation order
    pub fn children(&self) -> Vec<Injector> {
        self.inner.children.read().clone()
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn is_scoped(&self) -> bool {
        self.inner.parent.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Topmost ancestor (this scope when it is the root)
    pub fn root(&self) -> Injector {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// This scope followed by each ancestor up to the root
    pub(crate) fn lineage(&self) -> Vec<Injector> {
        let mut lineage = vec![self.clone()];
        while let Some(parent) = lineage.last().and_then(Injector::parent) {
            lineage.push(parent);
        }
        lineage
    }

    /// Create a named child scope sharing this tree's configuration
    pub fn create_scope(&self, name: impl Into<String>) -> Result<Injector, CoreError> {
        self.ensure_alive()?;

        let child = Injector::from_inner(Arc::new(ScopeInner::new(
            Some(name.into()),
            Some(self.inner.clone()),
            self.inner.configuration.clone(),
        )));
        self.inner.children.write().push(child.clone());

        tracing::debug!(
            "Created scope {} ({}) under {}",
            child.name().unwrap_or("unnamed"),
            child.id(),
            self.id()
        );
        Ok(child)
    }

    /// Find a descendant by name or id, breadth-first
    pub fn get_scope(&self, name_or_id: &str) -> Option<Injector> {
        let mut queue: VecDeque<Injector> = self.children().into_iter().collect();
        while let Some(scope) = queue.pop_front() {
            if scope.name() == Some(name_or_id) || scope.id().to_string() == name_or_id {
                return Some(scope);
            }
            queue.extend(scope.children());
        }
        None
    }

    /// Nearest scope, starting here, that can answer for `target`
    ///
    /// Falls back to this scope when nothing up the chain knows the target.
    pub fn get_injector_for_target(&self, target: &Target) -> Injector {
        self.lineage()
            .into_iter()
            .find(|scope| match target {
                Target::Type(key) => scope.inner.registrations.read().contains(key),
                Target::Token(token) => scope.inner.tokens.read().get_type_for_token(token).is_some(),
            })
            .unwrap_or_else(|| self.clone())
    }

    pub(crate) fn injector_for_key(&self, key: &TypeKey) -> Injector {
        self.get_injector_for_target(&Target::Type(*key))
    }

    /// Parameter annotations of `owner` from the first scope up the chain that has any
    pub(crate) fn parameter_annotations(&self, owner: &TypeKey) -> ParameterAnnotations {
        self.lineage()
            .into_iter()
            .map(|scope| scope.inner.tokens.read().parameter_annotations(owner))
            .find(|annotations| !annotations.is_empty())
            .unwrap_or_default()
    }

    /// Destroy this scope and its subtree
    ///
    /// Children go first, depth-first. The scope is then detached from its
    /// parent, its cache is cleared (each cleanup hook runs once) and it is
    /// marked destroyed for good.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }

        if let Some(parent) = self.parent() {
            let id = self.id();
            parent.inner.children.write().retain(|child| child.id() != id);
        }
        self.destroy_subtree();
    }

    fn destroy_subtree(&self) {
        let children = std::mem::take(&mut *self.inner.children.write());
        for child in children {
            child.destroy_subtree();
        }

        self.clear_state();
        self.inner.destroyed.store(true, Ordering::Release);
        tracing::info!(
            "Destroyed scope {} ({})",
            self.name().unwrap_or("unnamed"),
            self.id()
        );
    }

    /// Return this scope to its initial empty state
    ///
    /// Child scopes are destroyed; the scope itself stays usable.
    pub fn reset(&self) {
        let children = std::mem::take(&mut *self.inner.children.write());
        for child in children {
            child.destroy_subtree();
        }

        self.clear_state();
        tracing::info!("Reset scope {}", self.id());
    }

    fn clear_state(&self) {
        self.inner.cache.clear();
        self.inner.tokens.write().clear();
        self.inner.registrations.write().clear();
        self.inner.metrics.clear();
        self.inner.interceptors.write().clear();
    }
}
