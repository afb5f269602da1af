use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Configuration;
use crate::container::autowiring::{downcast, Injectable, Instance, ParamOverride};
use crate::container::binding::{InjectionConfig, Registration, ValueConfig};
use crate::container::boxing::BoxedValue;
use crate::container::cache::{CacheStrategy, InstanceCache};
use crate::container::descriptor::{Target, Token, TypeKey};
use crate::container::factory::AutoFactory;
use crate::container::interceptor::ConstructionInterceptor;
use crate::container::lazy::LazyInstance;
use crate::container::metadata::{MetadataProvider, RegistrationMetadataProvider};
use crate::container::metrics::Metrics;
use crate::container::resolver::ResolveOptions;
use crate::container::scope::ScopeInner;
use crate::container::tokens::{ParameterKind, ParameterToken, TokenBinding, TokenRegistry};
use crate::errors::CoreError;

/// A registered type together with its constructor parameter types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDependencies {
    pub key: TypeKey,
    pub dependencies: Vec<TypeKey>,
}

/// Handle to one scope of the injector tree
///
/// Cloning is cheap and yields another handle to the same scope. A root is
/// created explicitly with [`Injector::new`] or [`Injector::with_configuration`];
/// child scopes come from [`Injector::create_scope`].
#[derive(Clone)]
pub struct Injector {
    pub(crate) inner: Arc<ScopeInner>,
}

impl Injector {
    /// Create a root scope with the default configuration
    pub fn new() -> Self {
        Self::with_configuration(Configuration::default())
    }

    /// Create a root scope with the given configuration
    pub fn with_configuration(configuration: Configuration) -> Self {
        let injector = Self::from_inner(Arc::new(ScopeInner::new(
            None,
            None,
            Arc::new(RwLock::new(configuration)),
        )));
        tracing::debug!("Created root injector {}", injector.id());
        injector
    }

    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    /// Check if two handles point at the same scope
    pub fn ptr_eq(&self, other: &Injector) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot of the configuration shared by this tree
    pub fn configuration(&self) -> Configuration {
        self.inner.configuration.read().clone()
    }

    /// Change the shared configuration; the change is rejected if it fails validation
    pub fn configure<F>(&self, update: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut Configuration),
    {
        let mut configuration = self.inner.configuration.write();
        let mut candidate = configuration.clone();
        update(&mut candidate);
        candidate.validate()?;
        *configuration = candidate;
        Ok(())
    }

    /// Register a constructible type
    pub fn register<T: Injectable>(&self, config: InjectionConfig) -> Result<&Self, CoreError> {
        self.add_registration(Registration::for_type::<T>(config))
    }

    /// Register a type that is only reachable through a resolution override
    pub fn register_abstract(
        &self,
        key: TypeKey,
        config: InjectionConfig,
    ) -> Result<&Self, CoreError> {
        self.add_registration(Registration::for_abstract(key, config))
    }

    /// Preload the cache with an existing instance
    ///
    /// The type is (re)registered only when it has no registration here yet or
    /// a non-default configuration is supplied. The instance is kept unless the
    /// registration names another cache strategy.
    pub fn register_instance<T: Injectable>(
        &self,
        instance: Arc<T>,
        config: Option<InjectionConfig>,
    ) -> Result<&Self, CoreError> {
        self.ensure_alive()?;
        let key = TypeKey::of::<T>();
        let explicit = config.as_ref().map_or(false, |config| !config.is_default());

        if explicit || self.get_registration_for_type(&key).is_none() {
            self.register::<T>(config.unwrap_or_default())?;
        }

        let registration = self.get_registration_for_type(&key);
        let strategy = registration
            .as_ref()
            .and_then(|registration| registration.cache_strategy().cloned())
            .unwrap_or(CacheStrategy::Persistent);
        let teardown = registration.and_then(|registration| registration.teardown());

        self.inner.cache.update(key, instance, &strategy, teardown);
        Ok(self)
    }

    /// Register a value reachable by token
    pub fn register_value(&self, config: ValueConfig) -> Result<&Self, CoreError> {
        if config.tokens.is_empty() {
            return Err(CoreError::configuration(
                "All values must be registered with at least one token",
            ));
        }

        let key = TypeKey::value();
        let boxed: Instance = Arc::new(BoxedValue::new(self.downgrade(), config.value));
        self.add_registration(Registration::for_abstract(
            key,
            InjectionConfig::new().with_tokens(config.tokens),
        ))?;

        self.inner
            .cache
            .update(key, boxed, &CacheStrategy::Persistent, None);
        Ok(self)
    }

    /// Register an interceptor with the root scope
    pub fn register_interceptor(
        &self,
        interceptor: Arc<dyn ConstructionInterceptor>,
    ) -> Result<&Self, CoreError> {
        self.ensure_alive()?;
        let target = interceptor.target();
        if self.root().inner.interceptors.write().add(interceptor) {
            tracing::debug!("Registered construction interceptor for {}", target);
        }
        Ok(self)
    }

    /// Resolve position `index` of `owner` through `token`
    pub fn register_param_for_token_injection(
        &self,
        token: impl Into<Token>,
        owner: TypeKey,
        index: usize,
    ) -> Result<&Self, CoreError> {
        self.annotate(owner, index, ParameterKind::Token(token.into()))
    }

    /// Inject every consumer of `strategy` at position `index` of `owner`
    pub fn register_param_for_strategy_injection(
        &self,
        strategy: impl Into<Token>,
        owner: TypeKey,
        index: usize,
    ) -> Result<&Self, CoreError> {
        self.annotate(owner, index, ParameterKind::Strategy(strategy.into()))
    }

    /// Inject a factory of `target` at position `index` of `owner`
    pub fn register_param_for_factory_injection(
        &self,
        target: TypeKey,
        owner: TypeKey,
        index: usize,
    ) -> Result<&Self, CoreError> {
        self.annotate(owner, index, ParameterKind::Factory(target))
    }

    /// Inject a lazy handle of `target` at position `index` of `owner`
    pub fn register_param_for_lazy_injection(
        &self,
        target: TypeKey,
        owner: TypeKey,
        index: usize,
    ) -> Result<&Self, CoreError> {
        self.annotate(owner, index, ParameterKind::Lazy(target))
    }

    /// Accept an unregistered type at position `index` of `owner`
    pub fn register_param_for_optional_injection(
        &self,
        owner: TypeKey,
        index: usize,
    ) -> Result<&Self, CoreError> {
        self.annotate(owner, index, ParameterKind::Optional)
    }

    /// Resolve `T` by type
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        downcast::<T>(self.resolve(TypeKey::of::<T>())?)
    }

    /// Resolve `T`, or `None` when nothing is registered for it
    pub fn get_optional<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, CoreError> {
        self.resolve_optional(TypeKey::of::<T>())?
            .map(downcast::<T>)
            .transpose()
    }

    /// Resolve the owner of `token` and downcast it to `T`
    pub fn get_by_token<T: Send + Sync + 'static>(
        &self,
        token: impl Into<Token>,
    ) -> Result<Arc<T>, CoreError> {
        downcast::<T>(self.resolve(token.into())?)
    }

    /// Resolve a type or token
    pub fn resolve(&self, target: impl Into<Target>) -> Result<Instance, CoreError> {
        self.resolve_with_params(target, Vec::new())
    }

    /// Resolve a type or token, or `None` when nothing is registered for it
    pub fn resolve_optional(
        &self,
        target: impl Into<Target>,
    ) -> Result<Option<Instance>, CoreError> {
        let options = ResolveOptions {
            optional: true,
            params: Vec::new(),
        };
        self.resolve_target(&target.into(), &mut Vec::new(), &options)
    }

    /// Resolve with explicit values for some constructor positions
    pub fn resolve_with_params(
        &self,
        target: impl Into<Target>,
        params: Vec<Option<ParamOverride>>,
    ) -> Result<Instance, CoreError> {
        let target = target.into();
        let options = ResolveOptions {
            optional: false,
            params,
        };
        self.resolve_target(&target, &mut Vec::new(), &options)?
            .ok_or_else(|| CoreError::not_found(target.to_string(), target.to_string()))
    }

    /// Factory bound to this scope
    pub fn get_factory(&self, key: TypeKey) -> AutoFactory {
        AutoFactory::new(key, self)
    }

    /// Lazy handle bound to this scope
    pub fn get_lazy(&self, target: impl Into<Target>) -> LazyInstance {
        LazyInstance::new(target.into(), self)
    }

    /// Resolve every consumer registered under `strategy`
    ///
    /// Consumers come from the nearest scope that has any; an unknown key
    /// yields an empty list.
    pub fn get_strategies(&self, strategy: impl Into<Token>) -> Result<Vec<Instance>, CoreError> {
        self.ensure_alive()?;
        self.strategy_instances(&strategy.into(), &mut Vec::new())
    }

    /// Typed form of [`Injector::get_strategies`]
    pub fn get_strategies_as<T: Send + Sync + 'static>(
        &self,
        strategy: impl Into<Token>,
    ) -> Result<Vec<Arc<T>>, CoreError> {
        self.get_strategies(strategy)?
            .into_iter()
            .map(downcast::<T>)
            .collect()
    }

    /// Registrations of this scope, in registration order
    pub fn get_registrations(&self) -> Vec<Arc<Registration>> {
        self.inner.registrations.read().values()
    }

    pub fn get_registration_for_type(&self, key: &TypeKey) -> Option<Arc<Registration>> {
        self.inner.registrations.read().get(key)
    }

    pub fn get_registered_types(&self) -> Vec<TypeKey> {
        self.inner.registrations.read().keys()
    }

    /// Registered types with the parameter types the metadata provider reports
    pub fn get_registered_types_with_dependencies(&self) -> Vec<TypeDependencies> {
        let provider = RegistrationMetadataProvider::new(self.inner.configuration.read().metadata_mode);
        self.get_registrations()
            .iter()
            .map(|registration| TypeDependencies {
                key: registration.key(),
                dependencies: provider
                    .constructor_parameter_types(&registration.key(), Some(registration.as_ref())),
            })
            .collect()
    }

    /// Interceptors registered for `key` (always read from the root)
    pub fn get_interceptors_for_type(&self, key: &TypeKey) -> Vec<Arc<dyn ConstructionInterceptor>> {
        self.root().inner.interceptors.read().for_target(key)
    }

    /// This scope's instance cache
    pub fn cache(&self) -> &InstanceCache {
        &self.inner.cache
    }

    /// Snapshot of this scope's token registry
    pub fn token_registry(&self) -> TokenRegistry {
        self.inner.tokens.read().clone()
    }

    /// Metrics recorded for types owned by this scope
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    fn add_registration(&self, registration: Registration) -> Result<&Self, CoreError> {
        self.ensure_alive()?;
        let key = registration.key();
        let allow_duplicates = self.inner.configuration.read().allow_duplicate_tokens;

        {
            let mut tokens = self.inner.tokens.write();
            if !allow_duplicates {
                for token in registration.tokens() {
                    tokens.ensure_unclaimed(key, token)?;
                }
            }
            for token in registration.tokens() {
                tokens.register(TokenBinding::Type {
                    owner: key,
                    token: token.clone(),
                });
            }
            if let Some(strategy) = registration.strategy() {
                tokens.register(TokenBinding::Strategy {
                    owner: key,
                    token: strategy.clone(),
                });
            }
        }

        self.inner.registrations.write().insert(registration);
        tracing::debug!("Registered {} in scope {}", key, self.id());
        Ok(self)
    }

    fn annotate(
        &self,
        owner: TypeKey,
        index: usize,
        kind: ParameterKind,
    ) -> Result<&Self, CoreError> {
        self.ensure_alive()?;
        tracing::debug!(
            "Annotated parameter {} of {} for {} injection",
            index,
            owner,
            kind.as_str()
        );
        self.inner
            .tokens
            .write()
            .register(ParameterToken::new(owner, index, kind));
        Ok(self)
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Injector {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Injector {}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("destroyed", &self.is_destroyed())
            .field("registrations", &self.get_registered_types().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::autowiring::Arguments;

    struct Clock;

    impl Injectable for Clock {
        fn construct(_args: &Arguments) -> Result<Self, CoreError> {
            Ok(Clock)
        }
    }

    struct Calendar {
        clock: Arc<Clock>,
    }

    impl Injectable for Calendar {
        fn dependencies() -> Vec<TypeKey> {
            vec![TypeKey::of::<Clock>()]
        }

        fn construct(args: &Arguments) -> Result<Self, CoreError> {
            Ok(Calendar {
                clock: args.instance::<Clock>(0)?,
            })
        }
    }

    #[test]
    fn test_register_twice_keeps_one_registration() {
        let injector = Injector::new();
        injector.register::<Clock>(InjectionConfig::new()).unwrap();
        injector.register::<Clock>(InjectionConfig::new()).unwrap();

        assert_eq!(injector.get_registered_types().len(), 1);
    }

    #[test]
    fn test_chained_registration() {
        let injector = Injector::new();
        injector
            .register::<Clock>(InjectionConfig::new())
            .and_then(|i| i.register::<Calendar>(InjectionConfig::new()))
            .unwrap();

        let calendar = injector.get::<Calendar>().unwrap();
        assert!(Arc::ptr_eq(&calendar.clock, &injector.get::<Clock>().unwrap()));
    }

    #[test]
    fn test_duplicate_token_is_rejected_unless_allowed() {
        let injector = Injector::new();
        injector
            .register::<Clock>(InjectionConfig::new().with_token("time"))
            .unwrap();

        let result = injector.register::<Calendar>(InjectionConfig::new().with_token("time"));
        assert!(matches!(result, Err(CoreError::Configuration { .. })));

        injector.configure(|c| c.allow_duplicate_tokens = true).unwrap();
        injector
            .register::<Calendar>(InjectionConfig::new().with_token("time"))
            .unwrap();
        assert!(injector.get_by_token::<Calendar>("time").is_ok());
    }

    #[test]
    fn test_configure_rejects_invalid_changes() {
        let injector = Injector::new();
        assert!(injector.configure(|c| c.max_tree_depth = 0).is_err());
        assert_eq!(injector.configuration().max_tree_depth, 100);
    }

    #[test]
    fn test_register_instance_preloads_cache() {
        let injector = Injector::new();
        let clock = Arc::new(Clock);
        injector.register_instance(clock.clone(), None).unwrap();

        assert!(Arc::ptr_eq(&injector.get::<Clock>().unwrap(), &clock));
        assert_eq!(injector.get_registered_types(), vec![TypeKey::of::<Clock>()]);
    }

    #[test]
    fn test_register_instance_keeps_existing_registration() {
        let injector = Injector::new();
        injector
            .register::<Clock>(InjectionConfig::new().with_token("time"))
            .unwrap();
        injector.register_instance(Arc::new(Clock), None).unwrap();

        let registration = injector.get_registration_for_type(&TypeKey::of::<Clock>()).unwrap();
        assert_eq!(registration.tokens(), &[Token::name("time")]);
    }

    #[test]
    fn test_destroyed_scope_rejects_annotations_and_interceptors() {
        struct Audit;

        impl ConstructionInterceptor for Audit {
            fn target(&self) -> TypeKey {
                TypeKey::of::<Clock>()
            }
        }

        let root = Injector::new();
        let scope = root.create_scope("request").unwrap();
        scope.destroy();

        let owner = TypeKey::of::<Calendar>();
        assert!(scope
            .register_param_for_token_injection("time", owner, 0)
            .unwrap_err()
            .is_destroyed());
        assert!(scope
            .register_param_for_optional_injection(owner, 0)
            .unwrap_err()
            .is_destroyed());
        assert!(scope
            .register_interceptor(Arc::new(Audit))
            .unwrap_err()
            .is_destroyed());
        assert!(root.get_interceptors_for_type(&TypeKey::of::<Clock>()).is_empty());
    }

    #[test]
    fn test_register_value_requires_token() {
        let injector = Injector::new();
        let result = injector.register_value(ValueConfig::literal(42u32));
        assert!(matches!(result, Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn test_registered_types_with_dependencies() {
        let injector = Injector::new();
        injector.register::<Clock>(InjectionConfig::new()).unwrap();
        injector.register::<Calendar>(InjectionConfig::new()).unwrap();

        let listing = injector.get_registered_types_with_dependencies();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[1].key, TypeKey::of::<Calendar>());
        assert_eq!(listing[1].dependencies, vec![TypeKey::of::<Clock>()]);
    }
}
