use std::fmt;
use std::sync::Arc;

use crate::container::autowiring::{Arguments, Injectable, Instance, ParamOverride};
use crate::container::cache::{CacheStrategy, Teardown};
use crate::container::descriptor::{Token, TypeKey};
use crate::container::ioc_container::Injector;
use crate::errors::CoreError;

/// Outcome of delegated resolution
pub enum Resolved {
    Instance(Instance),
    /// The resolver declines; the engine falls back to local construction
    NotFound,
}

/// Resolver consulted before local construction
///
/// Errors are propagated to the caller unmodified.
pub trait ExternalResolver: Send + Sync {
    fn resolve(
        &self,
        key: &TypeKey,
        scope: &Injector,
        params: &[Option<ParamOverride>],
    ) -> Result<Resolved, CoreError>;
}

impl<F> ExternalResolver for F
where
    F: Fn(&TypeKey, &Injector, &[Option<ParamOverride>]) -> Result<Resolved, CoreError>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        key: &TypeKey,
        scope: &Injector,
        params: &[Option<ParamOverride>],
    ) -> Result<Resolved, CoreError> {
        self(key, scope, params)
    }
}

/// External resolver plus whether its results are written to the owning cache
#[derive(Clone)]
pub struct ExternalResolution {
    pub resolver: Arc<dyn ExternalResolver>,
    pub cache_syncing: bool,
}

impl ExternalResolution {
    pub fn new(resolver: impl ExternalResolver + 'static) -> Self {
        Self {
            resolver: Arc::new(resolver),
            cache_syncing: false,
        }
    }

    pub fn with_cache_syncing(mut self, cache_syncing: bool) -> Self {
        self.cache_syncing = cache_syncing;
        self
    }
}

impl fmt::Debug for ExternalResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalResolution")
            .field("resolver", &"<resolver>")
            .field("cache_syncing", &self.cache_syncing)
            .finish()
    }
}

/// Per-registration resolution override
#[derive(Debug, Clone)]
pub enum Resolution {
    External(ExternalResolution),
    /// Resolve this other type instead and cache the result under the registered key
    Type(TypeKey),
}

impl From<ExternalResolution> for Resolution {
    fn from(value: ExternalResolution) -> Self {
        Resolution::External(value)
    }
}

impl From<TypeKey> for Resolution {
    fn from(value: TypeKey) -> Self {
        Resolution::Type(value)
    }
}

/// Injection configuration supplied with a registration
#[derive(Debug, Clone, Default)]
pub struct InjectionConfig {
    /// Tokens the type can be resolved by
    pub tokens: Vec<Token>,
    /// Strategy key this type is a consumer of
    pub strategy: Option<Token>,
    pub resolution: Option<Resolution>,
    /// Explicit constructor parameter types
    pub metadata: Option<Vec<TypeKey>>,
    /// Falls back to the configured default when unset
    pub cache_strategy: Option<CacheStrategy>,
}

impl InjectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<Token>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn with_tokens<I, T>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<Token>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<Resolution>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<TypeKey>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_cache_strategy(mut self, cache_strategy: CacheStrategy) -> Self {
        self.cache_strategy = Some(cache_strategy);
        self
    }

    /// True when nothing beyond the defaults was supplied
    pub fn is_default(&self) -> bool {
        self.tokens.is_empty()
            && self.strategy.is_none()
            && self.resolution.is_none()
            && self.metadata.is_none()
            && self.cache_strategy.is_none()
    }
}

/// Boxed constructor of a registered type
pub type Constructor = Arc<dyn Fn(&Arguments) -> Result<Instance, CoreError> + Send + Sync>;

/// A type registration held by one scope
#[derive(Clone)]
pub struct Registration {
    key: TypeKey,
    config: InjectionConfig,
    constructor: Option<Constructor>,
    reflected: fn() -> Vec<TypeKey>,
    teardown: Option<Teardown>,
}

fn no_dependencies() -> Vec<TypeKey> {
    Vec::new()
}

impl Registration {
    /// Registration of a constructible type
    pub fn for_type<T: Injectable>(config: InjectionConfig) -> Self {
        let constructor: Constructor = Arc::new(|args: &Arguments| -> Result<Instance, CoreError> {
            let value = T::construct(args)?;
            Ok(Arc::new(value) as Instance)
        });
        Self::new(
            TypeKey::of::<T>(),
            config,
            Some(constructor),
            T::dependencies,
            Some(teardown_for::<T>()),
        )
    }

    /// Registration of a type the engine cannot construct itself
    pub fn for_abstract(key: TypeKey, config: InjectionConfig) -> Self {
        Self::new(key, config, None, no_dependencies, None)
    }

    fn new(
        key: TypeKey,
        config: InjectionConfig,
        constructor: Option<Constructor>,
        reflected: fn() -> Vec<TypeKey>,
        teardown: Option<Teardown>,
    ) -> Self {
        Self {
            key,
            config,
            constructor,
            reflected,
            teardown,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn config(&self) -> &InjectionConfig {
        &self.config
    }

    pub fn tokens(&self) -> &[Token] {
        &self.config.tokens
    }

    pub fn strategy(&self) -> Option<&Token> {
        self.config.strategy.as_ref()
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.config.resolution.as_ref()
    }

    pub fn cache_strategy(&self) -> Option<&CacheStrategy> {
        self.config.cache_strategy.as_ref()
    }

    pub fn is_constructible(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn reflected_dependencies(&self) -> Vec<TypeKey> {
        (self.reflected)()
    }

    pub fn teardown(&self) -> Option<Teardown> {
        self.teardown.clone()
    }

    /// Invoke the constructor with resolved arguments
    pub fn construct(&self, args: &Arguments) -> Result<Instance, CoreError> {
        let constructor = self.constructor.as_ref().ok_or_else(|| CoreError::NotConstructible {
            type_name: self.key.short_name().to_string(),
        })?;
        constructor(args)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key.short_name())
            .field("config", &self.config)
            .field("constructible", &self.is_constructible())
            .finish()
    }
}

/// Cleanup hook forwarding to [`Injectable::destroy`]
pub(crate) fn teardown_for<T: Injectable>() -> Teardown {
    Arc::new(|instance: &Instance| {
        if let Some(value) = instance.downcast_ref::<T>() {
            value.destroy();
        }
    })
}

/// Resolver producing a registered value on demand
pub type ValueResolver = Arc<dyn Fn(&Injector) -> Result<Instance, CoreError> + Send + Sync>;

/// Where a registered value comes from
#[derive(Clone)]
pub enum ValueSource {
    Literal(Instance),
    Resolver {
        resolver: ValueResolver,
        /// Memoize the first result instead of evaluating on every resolution
        cache_syncing: bool,
    },
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Literal(_) => write!(f, "Literal(<value>)"),
            ValueSource::Resolver { cache_syncing, .. } => f
                .debug_struct("Resolver")
                .field("cache_syncing", cache_syncing)
                .finish(),
        }
    }
}

/// Configuration of a value registered by token
#[derive(Debug, Clone)]
pub struct ValueConfig {
    pub tokens: Vec<Token>,
    pub value: ValueSource,
}

impl ValueConfig {
    /// A literal value
    pub fn literal<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            tokens: Vec::new(),
            value: ValueSource::Literal(Arc::new(value)),
        }
    }

    /// A value computed by `resolver` from the registering scope
    pub fn resolver<F>(resolver: F, cache_syncing: bool) -> Self
    where
        F: Fn(&Injector) -> Result<Instance, CoreError> + Send + Sync + 'static,
    {
        Self {
            tokens: Vec::new(),
            value: ValueSource::Resolver {
                resolver: Arc::new(resolver),
                cache_syncing,
            },
        }
    }

    pub fn with_token(mut self, token: impl Into<Token>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn with_tokens<I, T>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }
}
