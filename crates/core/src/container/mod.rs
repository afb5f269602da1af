pub mod autowiring;
pub mod binding;
pub mod boxing;
pub mod cache;
pub mod descriptor;
pub mod factory;
pub mod interceptor;
pub mod ioc_container;
pub mod lazy;
pub mod metadata;
pub mod metrics;
pub mod resolver;
pub mod scope;
pub mod tokens;

pub use autowiring::{downcast, Argument, Arguments, Injectable, Instance, ParamOverride};
pub use binding::{
    ExternalResolution, ExternalResolver, InjectionConfig, Registration, Resolution, Resolved,
    ValueConfig, ValueSource,
};
pub use boxing::BoxedValue;
pub use cache::{CacheStrategy, InstanceCache};
pub use descriptor::{ScopeId, Target, Token, TypeKey};
pub use factory::AutoFactory;
pub use interceptor::{ConstructionInterceptor, InjectionContext};
pub use ioc_container::{Injector, TypeDependencies};
pub use lazy::LazyInstance;
pub use metadata::{MetadataMode, MetadataProvider, RegistrationMetadataProvider};
pub use metrics::{MetricRecord, Metrics};
pub use scope::WeakInjector;
pub use tokens::{ParameterAnnotations, ParameterKind, ParameterToken, TokenBinding, TokenRegistry};
