//! Resolution algorithm
//!
//! Every request is answered by the nearest scope holding a registration for
//! the type (or the token). That owning scope supplies the cache, the external
//! resolver, the constructor and the metrics; the calling scope only decides
//! where the upward search starts.

use std::sync::Arc;
use std::time::Instant;

use crate::container::autowiring::{Argument, Arguments, Instance, ParamOverride};
use crate::container::binding::{ExternalResolver, Registration, Resolution, Resolved};
use crate::container::boxing;
use crate::container::cache::CacheStrategy;
use crate::container::descriptor::{Target, Token, TypeKey};
use crate::container::factory::AutoFactory;
use crate::container::interceptor::InjectionContext;
use crate::container::ioc_container::Injector;
use crate::container::lazy::LazyInstance;
use crate::container::metadata::{MetadataProvider, RegistrationMetadataProvider};
use crate::errors::CoreError;

/// Per-request resolution options
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolveOptions {
    /// Absence of the direct target yields `None` instead of an error
    pub(crate) optional: bool,
    /// Overrides for the target's own constructor positions
    pub(crate) params: Vec<Option<ParamOverride>>,
}

/// Render an ancestry as `Outer -> Inner` for error messages
pub(crate) fn path_string(ancestry: &[TypeKey]) -> String {
    ancestry
        .iter()
        .map(|key| key.short_name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl Injector {
    /// Resolve `target` starting from this scope
    ///
    /// `ancestry` holds the chain of types currently under construction; the
    /// target is pushed for the duration of the call.
    pub(crate) fn resolve_target(
        &self,
        target: &Target,
        ancestry: &mut Vec<TypeKey>,
        options: &ResolveOptions,
    ) -> Result<Option<Instance>, CoreError> {
        self.ensure_alive()?;

        let owner = self.get_injector_for_target(target);
        let key = match target {
            Target::Type(key) => *key,
            Target::Token(token) => {
                let bound = owner.inner.tokens.read().get_type_for_token(token);
                match bound {
                    Some(key) => key,
                    None if options.optional => return Ok(None),
                    None => return Err(CoreError::token_not_found(token.to_string())),
                }
            }
        };

        if key.is_container() {
            return Ok(Some(Arc::new(self.clone())));
        }

        let started = Instant::now();
        ancestry.push(key);
        let result = owner.resolve_in_owner(key, ancestry, options);
        let caller = ancestry.len().checked_sub(2).map(|index| ancestry[index]);
        ancestry.pop();

        let instance = result?;
        if instance.is_some() {
            owner.record_metrics(key, caller, started);
        }
        Ok(instance)
    }

    /// Cache, then resolution override, then construction; all in this scope
    fn resolve_in_owner(
        &self,
        key: TypeKey,
        ancestry: &mut Vec<TypeKey>,
        options: &ResolveOptions,
    ) -> Result<Option<Instance>, CoreError> {
        if let Some(instance) = self.inner.cache.resolve(&key) {
            tracing::trace!("Resolved {} from cache of scope {}", key, self.id());
            return boxing::unbox(instance).map(Some);
        }

        let registration = self.get_registration_for_type(&key);
        let resolution = match registration.as_ref().and_then(|r| r.resolution().cloned()) {
            Some(resolution) => Some(resolution),
            None => self
                .inner
                .configuration
                .read()
                .external_resolution_strategy
                .clone()
                .map(Resolution::External),
        };

        if registration.is_none() && resolution.is_none() {
            return self.missing(key, ancestry, options.optional);
        }

        if let Some(resolution) = resolution {
            if let Some((instance, cache_syncing)) = self.delegate(key, &resolution, ancestry, options)? {
                if cache_syncing {
                    let strategy = self.cache_strategy_for(registration.as_deref());
                    let teardown = registration.as_ref().and_then(|r| r.teardown());
                    self.inner
                        .cache
                        .update(key, instance.clone(), &strategy, teardown);
                }
                return Ok(Some(instance));
            }
        }

        match registration {
            Some(registration) => self
                .construct(&registration, ancestry, &options.params, true)
                .map(Some),
            None => self.missing(key, ancestry, options.optional),
        }
    }

    /// Run a resolution override; `None` means fall back to local construction
    ///
    /// A substitute type is resolved on the live ancestry so that cycles
    /// through it still hit the depth limit. Its result is always cached.
    fn delegate(
        &self,
        key: TypeKey,
        resolution: &Resolution,
        ancestry: &mut Vec<TypeKey>,
        options: &ResolveOptions,
    ) -> Result<Option<(Instance, bool)>, CoreError> {
        match resolution {
            Resolution::Type(substitute) => {
                let substitute_options = ResolveOptions {
                    optional: false,
                    params: options.params.clone(),
                };
                let instance = self
                    .resolve_target(&Target::Type(*substitute), ancestry, &substitute_options)?
                    .ok_or_else(|| CoreError::not_found(substitute.short_name(), path_string(ancestry)))?;
                tracing::trace!("Resolved {} through substitute {}", key, substitute);
                Ok(Some((instance, true)))
            }
            Resolution::External(external) => {
                match external.resolver.resolve(&key, self, &options.params)? {
                    Resolved::Instance(instance) => {
                        tracing::trace!("Resolved {} through external resolver", key);
                        Ok(Some((instance, external.cache_syncing)))
                    }
                    Resolved::NotFound => Ok(None),
                }
            }
        }
    }

    fn missing(
        &self,
        key: TypeKey,
        ancestry: &[TypeKey],
        optional: bool,
    ) -> Result<Option<Instance>, CoreError> {
        if optional {
            return Ok(None);
        }
        Err(CoreError::not_found(key.short_name(), path_string(ancestry)))
    }

    fn cache_strategy_for(&self, registration: Option<&Registration>) -> CacheStrategy {
        registration
            .and_then(|registration| registration.cache_strategy().cloned())
            .unwrap_or_else(|| self.inner.configuration.read().default_cache_strategy.clone())
    }

    /// Build an instance of `registration` in this scope
    ///
    /// Interceptors registered at the root for the type run around the
    /// constructor call.
    pub(crate) fn construct(
        &self,
        registration: &Registration,
        ancestry: &mut Vec<TypeKey>,
        params: &[Option<ParamOverride>],
        update_cache: bool,
    ) -> Result<Instance, CoreError> {
        let key = registration.key();
        if !registration.is_constructible() {
            return Err(CoreError::NotConstructible {
                type_name: key.short_name().to_string(),
            });
        }

        let (max_depth, mode) = {
            let configuration = self.inner.configuration.read();
            (configuration.max_tree_depth, configuration.metadata_mode)
        };
        if ancestry.len() > max_depth {
            return Err(CoreError::DepthExceeded {
                type_name: key.short_name().to_string(),
                ancestry: path_string(ancestry),
                max_depth,
            });
        }

        let parameter_types =
            RegistrationMetadataProvider::new(mode).constructor_parameter_types(&key, Some(registration));
        let arguments = self.constructor_arguments(key, &parameter_types, params, ancestry)?;

        let interceptors = self.get_interceptors_for_type(&key);
        let context = InjectionContext {
            key,
            registration,
            scope: self,
            arguments: &arguments,
        };
        for interceptor in &interceptors {
            interceptor.before_create(&context);
        }

        let instance = registration.construct(&arguments)?;

        for interceptor in &interceptors {
            interceptor.after_create(&instance, &context);
        }

        if update_cache {
            let strategy = self.cache_strategy_for(Some(registration));
            self.inner
                .cache
                .update(key, instance.clone(), &strategy, registration.teardown());
        }

        tracing::trace!("Constructed {} in scope {}", key, self.id());
        Ok(instance)
    }

    fn constructor_arguments(
        &self,
        owner: TypeKey,
        parameter_types: &[TypeKey],
        params: &[Option<ParamOverride>],
        ancestry: &mut Vec<TypeKey>,
    ) -> Result<Arguments, CoreError> {
        if parameter_types.is_empty() {
            return Ok(Arguments::new(owner, Vec::new()));
        }

        let annotations = self.parameter_annotations(&owner);
        let mut values = Vec::with_capacity(parameter_types.len());

        for (index, parameter) in parameter_types.iter().enumerate() {
            if let Some(Some(value)) = params.get(index) {
                values.push(Argument::from(value.clone()));
                continue;
            }

            if let Some(strategy) = annotations.strategy_at(index) {
                values.push(Argument::Strategies(self.strategy_instances(strategy, ancestry)?));
                continue;
            }

            if let Some(target) = annotations.factory_at(index) {
                values.push(Argument::Factory(AutoFactory::new(target, self)));
                continue;
            }

            if let Some(target) = annotations.lazy_at(index) {
                values.push(Argument::Lazy(LazyInstance::new(Target::Type(target), self)));
                continue;
            }

            let target = match annotations.token_at(index) {
                Some(token) => Target::Token(token.clone()),
                None => Target::Type(*parameter),
            };
            let options = ResolveOptions {
                optional: annotations.is_optional(index),
                params: Vec::new(),
            };

            let value = self.resolve_target(&target, ancestry, &options)?;
            values.push(value.map_or(Argument::Undefined, Argument::Instance));
        }

        Ok(Arguments::new(owner, values))
    }

    /// Consumer types of `strategy` from the nearest scope that has any
    fn strategy_consumers(&self, strategy: &Token) -> Vec<TypeKey> {
        self.lineage()
            .into_iter()
            .map(|scope| {
                let candidates = scope.inner.tokens.read().get_strategy_consumers(strategy);
                let registrations = scope.inner.registrations.read();
                candidates
                    .into_iter()
                    .filter(|key| {
                        registrations
                            .get(key)
                            .map_or(false, |registration| registration.strategy() == Some(strategy))
                    })
                    .collect::<Vec<_>>()
            })
            .find(|consumers| !consumers.is_empty())
            .unwrap_or_default()
    }

    pub(crate) fn strategy_instances(
        &self,
        strategy: &Token,
        ancestry: &mut Vec<TypeKey>,
    ) -> Result<Vec<Instance>, CoreError> {
        let mut instances = Vec::new();
        for consumer in self.strategy_consumers(strategy) {
            let resolved =
                self.resolve_target(&Target::Type(consumer), ancestry, &ResolveOptions::default())?;
            instances.extend(resolved);
        }
        Ok(instances)
    }

    /// Construct a fresh instance of `key` without touching any cache
    pub(crate) fn create_unmanaged(
        &self,
        key: TypeKey,
        params: Vec<Option<ParamOverride>>,
    ) -> Result<Instance, CoreError> {
        self.ensure_alive()?;

        let owner = self.injector_for_key(&key);
        let registration = owner
            .get_registration_for_type(&key)
            .ok_or_else(|| CoreError::not_found(key.short_name(), key.short_name()))?;

        let mut ancestry = vec![key];
        owner.construct(&registration, &mut ancestry, &params, false)
    }

    fn record_metrics(&self, key: TypeKey, caller: Option<TypeKey>, started: Instant) {
        let mode = {
            let configuration = self.inner.configuration.read();
            if !configuration.track_metrics {
                return;
            }
            configuration.metadata_mode
        };

        let dependency_count = self
            .get_registration_for_type(&key)
            .map_or(0, |registration| {
                RegistrationMetadataProvider::new(mode)
                    .constructor_parameter_types(&key, Some(registration.as_ref()))
                    .len()
            });
        self.inner
            .metrics
            .update(key, caller, started.elapsed(), dependency_count);
    }
}
