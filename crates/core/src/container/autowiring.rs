use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::container::descriptor::TypeKey;
use crate::container::factory::AutoFactory;
use crate::container::lazy::LazyInstance;
use crate::errors::CoreError;

/// Opaque constructed object as stored in caches and passed to constructors
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Downcast an instance to a concrete type
pub fn downcast<T: Send + Sync + 'static>(instance: Instance) -> Result<Arc<T>, CoreError> {
    instance
        .downcast::<T>()
        .map_err(|_| CoreError::type_mismatch(std::any::type_name::<T>()))
}

/// Trait for types the engine can construct
///
/// `dependencies` is the reflected constructor metadata: one key per
/// constructor position, in order. Registrations may supply an explicit list
/// instead (see [`crate::container::metadata::MetadataMode`]).
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Ordered constructor parameter types
    fn dependencies() -> Vec<TypeKey> {
        Vec::new()
    }

    /// Build an instance from resolved constructor arguments
    fn construct(args: &Arguments) -> Result<Self, CoreError>;

    /// Cleanup hook invoked once when the instance is evicted from a cache
    fn destroy(&self) {}
}

/// Caller-supplied value for one constructor position
#[derive(Clone)]
pub enum ParamOverride {
    Value(Instance),
    Null,
    Undefined,
}

impl ParamOverride {
    /// Wrap a concrete value
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        ParamOverride::Value(Arc::new(value))
    }
}

impl fmt::Debug for ParamOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamOverride::Value(_) => write!(f, "Value(<instance>)"),
            ParamOverride::Null => write!(f, "Null"),
            ParamOverride::Undefined => write!(f, "Undefined"),
        }
    }
}

/// One resolved constructor argument
#[derive(Clone)]
pub enum Argument {
    Instance(Instance),
    Strategies(Vec<Instance>),
    Factory(AutoFactory),
    Lazy(LazyInstance),
    Null,
    /// Also produced for an optional dependency that is not registered
    Undefined,
}

impl Argument {
    fn kind(&self) -> &'static str {
        match self {
            Argument::Instance(_) => "instance",
            Argument::Strategies(_) => "strategy list",
            Argument::Factory(_) => "factory",
            Argument::Lazy(_) => "lazy handle",
            Argument::Null => "null",
            Argument::Undefined => "undefined",
        }
    }
}

impl From<ParamOverride> for Argument {
    fn from(value: ParamOverride) -> Self {
        match value {
            ParamOverride::Value(instance) => Argument::Instance(instance),
            ParamOverride::Null => Argument::Null,
            ParamOverride::Undefined => Argument::Undefined,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Strategies(items) => write!(f, "Strategies({})", items.len()),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Resolved constructor arguments handed to [`Injectable::construct`]
#[derive(Clone)]
pub struct Arguments {
    owner: TypeKey,
    values: Vec<Argument>,
}

impl Arguments {
    pub fn new(owner: TypeKey, values: Vec<Argument>) -> Self {
        Self { owner, values }
    }

    /// The type being constructed
    pub fn owner(&self) -> TypeKey {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.values.iter()
    }

    /// Required instance at `index`
    pub fn instance<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, CoreError> {
        match self.values.get(index) {
            Some(Argument::Instance(instance)) => downcast::<T>(instance.clone()),
            _ => Err(self.mismatch(index, "instance")),
        }
    }

    /// Instance at `index`, `None` when the slot is null or undefined
    pub fn optional<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Option<Arc<T>>, CoreError> {
        match self.values.get(index) {
            Some(Argument::Instance(instance)) => downcast::<T>(instance.clone()).map(Some),
            Some(Argument::Null) | Some(Argument::Undefined) | None => Ok(None),
            Some(_) => Err(self.mismatch(index, "optional instance")),
        }
    }

    /// Every strategy consumer resolved for `index`
    pub fn strategies<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Vec<Arc<T>>, CoreError> {
        match self.values.get(index) {
            Some(Argument::Strategies(items)) => items
                .iter()
                .cloned()
                .map(downcast::<T>)
                .collect(),
            _ => Err(self.mismatch(index, "strategy list")),
        }
    }

    /// Strategy consumers at `index` left untyped; consumers rarely share one concrete type
    pub fn strategy_instances(&self, index: usize) -> Result<Vec<Instance>, CoreError> {
        match self.values.get(index) {
            Some(Argument::Strategies(items)) => Ok(items.clone()),
            _ => Err(self.mismatch(index, "strategy list")),
        }
    }

    pub fn factory(&self, index: usize) -> Result<AutoFactory, CoreError> {
        match self.values.get(index) {
            Some(Argument::Factory(factory)) => Ok(factory.clone()),
            _ => Err(self.mismatch(index, "factory")),
        }
    }

    pub fn lazy(&self, index: usize) -> Result<LazyInstance, CoreError> {
        match self.values.get(index) {
            Some(Argument::Lazy(lazy)) => Ok(lazy.clone()),
            _ => Err(self.mismatch(index, "lazy handle")),
        }
    }

    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Argument::Null))
    }

    pub fn is_undefined(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Argument::Undefined) | None)
    }

    fn mismatch(&self, index: usize, expected: &str) -> CoreError {
        let found = self
            .values
            .get(index)
            .map(Argument::kind)
            .unwrap_or("missing");
        CoreError::ArgumentMismatch {
            owner: self.owner.short_name().to_string(),
            index,
            expected: format!("{} (found {})", expected, found),
        }
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner.short_name())
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wheel(u8);

    fn arguments(values: Vec<Argument>) -> Arguments {
        Arguments::new(TypeKey::of::<Wheel>(), values)
    }

    #[test]
    fn test_instance_accessor_downcasts() {
        let args = arguments(vec![Argument::Instance(Arc::new(Wheel(4)))]);
        let wheel = args.instance::<Wheel>(0).unwrap();
        assert_eq!(wheel.0, 4);
    }

    #[test]
    fn test_instance_accessor_reports_wrong_type() {
        let args = arguments(vec![Argument::Instance(Arc::new(7u32))]);
        let result = args.instance::<Wheel>(0);
        assert!(matches!(result, Err(CoreError::TypeMismatch { .. })));
    }

    #[test]
    fn test_optional_accessor_maps_sentinels() {
        let args = arguments(vec![Argument::Null, Argument::Undefined]);

        assert!(args.optional::<Wheel>(0).unwrap().is_none());
        assert!(args.optional::<Wheel>(1).unwrap().is_none());
        assert!(args.optional::<Wheel>(5).unwrap().is_none());
        assert!(args.is_null(0));
        assert!(args.is_undefined(1));
    }

    #[test]
    fn test_kind_mismatch_names_owner_and_position() {
        let args = arguments(vec![Argument::Null]);
        let error = args.factory(0).unwrap_err();
        let message = error.to_string();

        assert!(message.contains("Wheel"));
        assert!(message.contains("argument 0"));
        assert!(message.contains("found null"));
    }

    #[test]
    fn test_strategies_accessor() {
        let items: Vec<Instance> = vec![Arc::new(Wheel(1)), Arc::new(Wheel(2))];
        let args = arguments(vec![Argument::Strategies(items)]);

        let wheels = args.strategies::<Wheel>(0).unwrap();
        assert_eq!(wheels.len(), 2);
        assert_eq!(wheels[1].0, 2);
    }
}
