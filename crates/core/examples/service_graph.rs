//! Builds a small service graph across a root and a request scope
//!
//! Run with `RUST_LOG=lattice_core=trace` to watch registrations, cache hits
//! and constructions.

use std::sync::Arc;
use std::time::Duration;

use lattice_core::container::Arguments;
use lattice_core::{
    CacheStrategy, Configuration, CoreError, Injectable, InjectionConfig, Injector, TypeKey,
    ValueConfig,
};

struct Settings {
    database_url: Arc<String>,
}

impl Injectable for Settings {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    fn construct(args: &Arguments) -> Result<Self, CoreError> {
        Ok(Settings {
            database_url: args.instance::<String>(0)?,
        })
    }
}

struct Database {
    settings: Arc<Settings>,
}

impl Injectable for Database {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<Settings>()]
    }

    fn construct(args: &Arguments) -> Result<Self, CoreError> {
        let settings = args.instance::<Settings>(0)?;
        println!("connecting to {}", settings.database_url);
        Ok(Database { settings })
    }

    fn destroy(&self) {
        println!("closing {}", self.settings.database_url);
    }
}

struct RequestContext {
    id: uuid::Uuid,
}

impl Injectable for RequestContext {
    fn construct(_args: &Arguments) -> Result<Self, CoreError> {
        Ok(RequestContext {
            id: uuid::Uuid::new_v4(),
        })
    }
}

struct UserService {
    database: Arc<Database>,
    context: Arc<RequestContext>,
}

impl Injectable for UserService {
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<Database>(), TypeKey::of::<RequestContext>()]
    }

    fn construct(args: &Arguments) -> Result<Self, CoreError> {
        Ok(UserService {
            database: args.instance::<Database>(0)?,
            context: args.instance::<RequestContext>(1)?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let root = Injector::with_configuration(Configuration::from_env()?);
    root.register_value(
        ValueConfig::literal(String::from("postgres://localhost/app")).with_token("database_url"),
    )?
    .register::<Settings>(InjectionConfig::new())?
    .register::<Database>(
        InjectionConfig::new().with_cache_strategy(CacheStrategy::Idle(Duration::from_secs(30))),
    )?;
    root.register_param_for_token_injection("database_url", TypeKey::of::<Settings>(), 0)?;

    for request in 0..2 {
        let scope = root.create_scope(format!("request-{}", request))?;
        scope
            .register::<RequestContext>(InjectionConfig::new())?
            .register::<UserService>(InjectionConfig::new())?;

        let service = scope.get::<UserService>()?;
        println!(
            "request {} handled by context {} on {}",
            request,
            service.context.id,
            service.database.settings.database_url
        );

        scope.destroy();
    }

    for record in root.metrics().data() {
        println!("{}", serde_json::to_string(&record)?);
    }

    root.destroy();
    Ok(())
}
