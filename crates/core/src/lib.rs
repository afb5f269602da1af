pub mod config;
pub mod container;
pub mod errors;

// Re-export key types for convenience
pub use config::{ConfigError, ConfigFormat, ConfigSource, Configuration};
pub use container::{
    AutoFactory, CacheStrategy, ConstructionInterceptor, ExternalResolution, Injectable,
    InjectionConfig, InjectionContext, Injector, Instance, LazyInstance, MetadataMode,
    ParamOverride, Resolved, Target, Token, TypeKey, ValueConfig,
};
pub use container::{Arguments, MetricRecord};
pub use errors::{BoxError, CoreError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
