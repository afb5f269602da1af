//! Integration tests for hierarchical resolution
//!
//! Covers caching, scope shadowing, tokens, parameter annotations, optional
//! dependencies, resolution overrides and depth limiting through the public
//! `Injector` surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lattice_core::container::{Arguments, Resolved};
use lattice_core::{
    CoreError, ExternalResolution, Injectable, InjectionConfig, Injector, Instance,
    ParamOverride, Token, TypeKey, ValueConfig,
};

#[derive(Debug)]
struct Logger;

impl Injectable for Logger {
    fn construct(_args: &Arguments) -> Result<Self, CoreError> {
        Ok(Logger)
    }
}

struct Repository {
    logger: Arc<Logger>,
}

impl Injectable for Repository {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<Logger>()]
    }

    fn construct(args: &Arguments) -> Result<Self, CoreError> {
        Ok(Repository {
            logger: args.instance::<Logger>(0)?,
        })
    }
}

struct Service {
    repository: Arc<Repository>,
    logger: Arc<Logger>,
}

impl Injectable for Service {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<Repository>(), TypeKey::of::<Logger>()]
    }

    fn construct(args: &Arguments) -> Result<Self, CoreError> {
        Ok(Service {
            repository: args.instance::<Repository>(0)?,
            logger: args.instance::<Logger>(1)?,
        })
    }
}

#[derive(Debug)]
struct GrandParent;

impl Injectable for GrandParent {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<Parent>()]
    }

    fn construct(_args: &Arguments) -> Result<Self, CoreError> {
        Ok(GrandParent)
    }
}

struct Parent;

impl Injectable for Parent {
    fn construct(_args: &Arguments) -> Result<Self, CoreError> {
        Ok(Parent)
    }
}

#[derive(Debug)]
struct Recursive;

impl Injectable for Recursive {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<Recursive>()]
    }

    fn construct(_args: &Arguments) -> Result<Self, CoreError> {
        Ok(Recursive)
    }
}

/// Depends on a logger it can live without
#[derive(Debug)]
struct Reporter {
    logger: Option<Arc<Logger>>,
}

impl Injectable for Reporter {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<Logger>()]
    }

    fn construct(args: &Arguments) -> Result<Self, CoreError> {
        Ok(Reporter {
            logger: args.optional::<Logger>(0)?,
        })
    }
}

#[test]
fn test_unregistered_dependency_reports_ancestry() {
    let injector = Injector::new();
    injector.register::<GrandParent>(InjectionConfig::new()).unwrap();

    let error = injector.get::<GrandParent>().unwrap_err();

    assert!(error.is_not_found());
    let message = error.to_string();
    assert!(message.contains("'Parent'"));
    assert!(message.contains("GrandParent -> Parent"));
}

#[test]
fn test_registration_is_idempotent() {
    let injector = Injector::new();
    injector.register::<Logger>(InjectionConfig::new()).unwrap();
    injector.register::<Logger>(InjectionConfig::new()).unwrap();

    assert_eq!(injector.get_registered_types().len(), 1);
}

#[test]
fn test_successive_resolutions_share_instance() {
    let injector = Injector::new();
    injector.register::<Logger>(InjectionConfig::new()).unwrap();

    let first = injector.get::<Logger>().unwrap();
    let second = injector.get::<Logger>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(injector.cache().instance_count(), 1);
}

#[test]
fn test_dependency_graph_shares_singletons() {
    let injector = Injector::new();
    injector
        .register::<Logger>(InjectionConfig::new())
        .and_then(|i| i.register::<Repository>(InjectionConfig::new()))
        .and_then(|i| i.register::<Service>(InjectionConfig::new()))
        .unwrap();

    let service = injector.get::<Service>().unwrap();

    assert!(Arc::ptr_eq(&service.logger, &service.repository.logger));
    assert!(Arc::ptr_eq(
        &service.repository,
        &injector.get::<Repository>().unwrap()
    ));
}

#[test]
fn test_child_registration_shadows_parent() {
    let root = Injector::new();
    root.register::<Logger>(InjectionConfig::new()).unwrap();
    let child = root.create_scope("request").unwrap();
    child.register::<Logger>(InjectionConfig::new()).unwrap();
    let grandchild = child.create_scope("nested").unwrap();

    let from_root = root.get::<Logger>().unwrap();
    let from_child = child.get::<Logger>().unwrap();
    let from_grandchild = grandchild.get::<Logger>().unwrap();

    assert!(!Arc::ptr_eq(&from_root, &from_child));
    assert!(Arc::ptr_eq(&from_child, &from_grandchild));
    assert!(Arc::ptr_eq(&from_root, &root.get::<Logger>().unwrap()));
    assert!(grandchild.cache().instances().is_empty());
}

#[test]
fn test_parent_registration_is_cached_in_parent() {
    let root = Injector::new();
    root.register::<Logger>(InjectionConfig::new()).unwrap();
    let child = root.create_scope("request").unwrap();

    let from_child = child.get::<Logger>().unwrap();

    assert!(Arc::ptr_eq(&from_child, &root.get::<Logger>().unwrap()));
    assert_eq!(root.cache().instance_count(), 1);
    assert_eq!(child.cache().instance_count(), 0);
    assert!(child
        .get_injector_for_target(&TypeKey::of::<Logger>().into())
        .ptr_eq(&root));
}

#[test]
fn test_self_dependency_hits_depth_limit() {
    let injector = Injector::new();
    injector.configure(|c| c.max_tree_depth = 3).unwrap();
    injector.register::<Recursive>(InjectionConfig::new()).unwrap();

    let error = injector.get::<Recursive>().unwrap_err();

    assert!(error.is_depth_exceeded());
    assert!(error.to_string().contains("Recursive -> Recursive"));
}

#[test]
fn test_resolve_by_token() {
    let root = Injector::new();
    root.register::<Logger>(InjectionConfig::new().with_token("logger"))
        .unwrap();
    let child = root.create_scope("child").unwrap();

    let by_token = child.get_by_token::<Logger>("logger").unwrap();

    assert!(Arc::ptr_eq(&by_token, &root.get::<Logger>().unwrap()));
}

#[test]
fn test_symbol_tokens_are_distinct() {
    let injector = Injector::new();
    let first = Token::symbol("logger");
    let second = Token::symbol("logger");
    injector
        .register::<Logger>(InjectionConfig::new().with_token(first.clone()))
        .unwrap();

    assert!(injector.resolve(first).is_ok());
    assert!(matches!(
        injector.resolve(second),
        Err(CoreError::TokenNotFound { .. })
    ));
}

#[test]
fn test_token_parameter_substitution() {
    struct FileLogger;

    impl Injectable for FileLogger {
        fn construct(_args: &Arguments) -> Result<Self, CoreError> {
            Ok(FileLogger)
        }
    }

    struct Audit {
        sink: Arc<FileLogger>,
    }

    impl Injectable for Audit {
        fn dependencies() -> Vec<TypeKey> {
            vec![TypeKey::of::<Logger>()]
        }

        fn construct(args: &Arguments) -> Result<Self, CoreError> {
            Ok(Audit {
                sink: args.instance::<FileLogger>(0)?,
            })
        }
    }

    let injector = Injector::new();
    injector
        .register::<FileLogger>(InjectionConfig::new().with_token("sink"))
        .and_then(|i| i.register::<Audit>(InjectionConfig::new()))
        .unwrap();
    injector.register_param_for_token_injection("sink", TypeKey::of::<Audit>(), 0).unwrap();

    let audit = injector.get::<Audit>().unwrap();
    assert!(Arc::ptr_eq(&audit.sink, &injector.get::<FileLogger>().unwrap()));
}

#[test]
fn test_optional_parameter_becomes_none() {
    let injector = Injector::new();
    injector.register::<Reporter>(InjectionConfig::new()).unwrap();
    injector.register_param_for_optional_injection(TypeKey::of::<Reporter>(), 0).unwrap();

    let reporter = injector.get::<Reporter>().unwrap();
    assert!(reporter.logger.is_none());
}

#[test]
fn test_missing_parameter_without_optional_fails() {
    let injector = Injector::new();
    injector.register::<Reporter>(InjectionConfig::new()).unwrap();

    let error = injector.get::<Reporter>().unwrap_err();
    assert!(error.to_string().contains("Reporter -> Logger"));
}

#[test]
fn test_optional_only_covers_direct_target() {
    let injector = Injector::new();
    injector.register::<GrandParent>(InjectionConfig::new()).unwrap();

    assert!(injector.get_optional::<Parent>().unwrap().is_none());
    assert!(injector.get_optional::<GrandParent>().is_err());
}

#[test]
fn test_param_overrides() {
    let injector = Injector::new();
    injector.register::<Repository>(InjectionConfig::new()).unwrap();

    let supplied = Arc::new(Logger);
    let instance = injector
        .resolve_with_params(
            TypeKey::of::<Repository>(),
            vec![Some(ParamOverride::Value(supplied.clone()))],
        )
        .unwrap();
    let repository = lattice_core::container::downcast::<Repository>(instance).unwrap();

    assert!(Arc::ptr_eq(&repository.logger, &supplied));
}

#[test]
fn test_null_override_reaches_constructor() {
    let injector = Injector::new();
    injector.register::<Reporter>(InjectionConfig::new()).unwrap();

    let instance = injector
        .resolve_with_params(TypeKey::of::<Reporter>(), vec![Some(ParamOverride::Null)])
        .unwrap();
    let reporter = lattice_core::container::downcast::<Reporter>(instance).unwrap();

    assert!(reporter.logger.is_none());
}

#[test]
fn test_external_resolver_is_consulted_first() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let resolver = move |key: &TypeKey,
                         _scope: &Injector,
                         _params: &[Option<ParamOverride>]|
          -> Result<Resolved, CoreError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if key.is::<Logger>() {
            Ok(Resolved::Instance(Arc::new(Logger)))
        } else {
            Ok(Resolved::NotFound)
        }
    };

    let injector = Injector::new();
    injector
        .configure(|c| c.external_resolution_strategy = Some(ExternalResolution::new(resolver)))
        .unwrap();
    injector.register::<Parent>(InjectionConfig::new()).unwrap();

    let first = injector.get::<Logger>().unwrap();
    let second = injector.get::<Logger>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    // Declined by the resolver, constructed locally
    assert!(injector.get::<Parent>().is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_external_resolver_with_cache_syncing() {
    let resolver = |_key: &TypeKey,
                    _scope: &Injector,
                    _params: &[Option<ParamOverride>]|
     -> Result<Resolved, CoreError> {
        Ok(Resolved::Instance(Arc::new(Logger)))
    };

    let injector = Injector::new();
    injector
        .register::<Logger>(
            InjectionConfig::new()
                .with_resolution(ExternalResolution::new(resolver).with_cache_syncing(true)),
        )
        .unwrap();

    let first = injector.get::<Logger>().unwrap();
    assert!(Arc::ptr_eq(&first, &injector.get::<Logger>().unwrap()));
}

#[test]
fn test_external_resolver_errors_propagate() {
    let resolver = |key: &TypeKey,
                    _scope: &Injector,
                    _params: &[Option<ParamOverride>]|
     -> Result<Resolved, CoreError> {
        Err(CoreError::delegate(key.short_name(), "backend unavailable"))
    };

    let injector = Injector::new();
    injector
        .register::<Logger>(InjectionConfig::new().with_resolution(ExternalResolution::new(resolver)))
        .unwrap();

    let error = injector.get::<Logger>().unwrap_err();
    assert!(matches!(error, CoreError::Delegate { .. }));
    assert!(error.to_string().contains("backend unavailable"));
}

#[test]
fn test_substitute_type_resolution() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    impl Injectable for English {
        fn construct(_args: &Arguments) -> Result<Self, CoreError> {
            Ok(English)
        }
    }

    let injector = Injector::new();
    let greeter = TypeKey::of::<dyn Greeter>();
    injector
        .register::<English>(InjectionConfig::new())
        .and_then(|i| {
            i.register_abstract(
                greeter,
                InjectionConfig::new().with_resolution(TypeKey::of::<English>()),
            )
        })
        .unwrap();

    let instance = injector.resolve(greeter).unwrap();
    let english = lattice_core::container::downcast::<English>(instance.clone()).unwrap();

    assert_eq!(english.greet(), "hello");
    assert!(Arc::ptr_eq(&english, &injector.get::<English>().unwrap()));
    assert!(Arc::ptr_eq(&instance, &injector.resolve(greeter).unwrap()));
}

#[test]
fn test_abstract_without_override_is_not_constructible() {
    trait Store: Send + Sync {}

    let injector = Injector::new();
    injector
        .register_abstract(TypeKey::of::<dyn Store>(), InjectionConfig::new())
        .unwrap();

    let error = injector.resolve(TypeKey::of::<dyn Store>()).unwrap_err();
    assert!(matches!(error, CoreError::NotConstructible { .. }));
}

#[test]
fn test_literal_value_by_token() {
    let root = Injector::new();
    root.register_value(ValueConfig::literal(String::from("postgres://db")).with_token("dsn"))
        .unwrap();
    let child = root.create_scope("child").unwrap();

    let dsn = child.get_by_token::<String>("dsn").unwrap();
    assert_eq!(dsn.as_str(), "postgres://db");
}

#[test]
fn test_value_resolver_memoizes_only_when_syncing() {
    let evaluations = Arc::new(AtomicUsize::new(0));

    let counter = evaluations.clone();
    let injector = Injector::new();
    injector
        .register_value(
            ValueConfig::resolver(
                move |_scope| {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(n) as Instance)
                },
                false,
            )
            .with_token("fresh"),
        )
        .unwrap();

    let counter = evaluations.clone();
    injector
        .register_value(
            ValueConfig::resolver(
                move |_scope| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(String::from("synced")) as Instance)
                },
                true,
            )
            .with_token("synced"),
        )
        .unwrap();

    injector.get_by_token::<usize>("fresh").unwrap();
    injector.get_by_token::<usize>("fresh").unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);

    injector.get_by_token::<String>("synced").unwrap();
    injector.get_by_token::<String>("synced").unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 3);
}

#[test]
fn test_value_as_constructor_parameter() {
    struct Connection {
        dsn: Arc<String>,
    }

    impl Injectable for Connection {
        fn dependencies() -> Vec<TypeKey> {
            vec![TypeKey::of::<String>()]
        }

        fn construct(args: &Arguments) -> Result<Self, CoreError> {
            Ok(Connection {
                dsn: args.instance::<String>(0)?,
            })
        }
    }

    let injector = Injector::new();
    injector
        .register_value(ValueConfig::literal(String::from("sqlite::memory:")).with_token("dsn"))
        .and_then(|i| i.register::<Connection>(InjectionConfig::new()))
        .unwrap();
    injector.register_param_for_token_injection("dsn", TypeKey::of::<Connection>(), 0).unwrap();

    let connection = injector.get::<Connection>().unwrap();
    assert_eq!(connection.dsn.as_str(), "sqlite::memory:");
}

#[test]
fn test_explicit_metadata_overrides_reflection() {
    struct Wrapper {
        parent: Arc<Parent>,
    }

    impl Injectable for Wrapper {
        fn dependencies() -> Vec<TypeKey> {
            vec![TypeKey::of::<Logger>()]
        }

        fn construct(args: &Arguments) -> Result<Self, CoreError> {
            Ok(Wrapper {
                parent: args.instance::<Parent>(0)?,
            })
        }
    }

    let injector = Injector::new();
    injector
        .register::<Parent>(InjectionConfig::new())
        .and_then(|i| {
            i.register::<Wrapper>(
                InjectionConfig::new().with_metadata(vec![TypeKey::of::<Parent>()]),
            )
        })
        .unwrap();

    let wrapper = injector.get::<Wrapper>().unwrap();
    assert!(Arc::ptr_eq(&wrapper.parent, &injector.get::<Parent>().unwrap()));
}

#[test]
fn test_resolving_from_destroyed_scope_fails() {
    let root = Injector::new();
    let child = root.create_scope("child").unwrap();
    child.destroy();

    let error = child.resolve(TypeKey::of::<Logger>()).unwrap_err();
    assert!(error.is_destroyed());
    assert!(child.register::<Logger>(InjectionConfig::new()).is_err());
}

/// A request scope whose root handle is dropped on return
fn detached_request_scope() -> Injector {
    let root = Injector::new();
    root.register::<Logger>(InjectionConfig::new()).unwrap();
    root.create_scope("request").unwrap()
}

#[test]
fn test_child_resolves_after_root_handle_dropped() {
    let child = detached_request_scope();

    assert!(child.is_scoped());
    assert!(child.parent().is_some());
    assert!(child.get::<Logger>().is_ok());
    assert!(Arc::ptr_eq(
        &child.get::<Logger>().unwrap(),
        &child.root().get::<Logger>().unwrap()
    ));
}

#[test]
fn test_cycle_through_substitute_hits_depth_limit() {
    trait Service: Send + Sync {}

    struct Decorated;

    impl Injectable for Decorated {
        fn dependencies() -> Vec<TypeKey> {
            vec![TypeKey::of::<dyn Service>()]
        }

        fn construct(_args: &Arguments) -> Result<Self, CoreError> {
            Ok(Decorated)
        }
    }

    let injector = Injector::new();
    injector.configure(|c| c.max_tree_depth = 5).unwrap();
    injector
        .register::<Decorated>(InjectionConfig::new())
        .and_then(|i| {
            i.register_abstract(
                TypeKey::of::<dyn Service>(),
                InjectionConfig::new().with_resolution(TypeKey::of::<Decorated>()),
            )
        })
        .unwrap();

    let error = injector.resolve(TypeKey::of::<dyn Service>()).unwrap_err();

    assert!(error.is_depth_exceeded());
    assert!(error.to_string().contains("Service -> Decorated"));
}
