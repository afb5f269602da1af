use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::container::ioc_container::Injector;

/// Identity behind a [`TypeKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyId {
    /// A Rust type registered with the engine
    Type(TypeId),
    /// A synthetic identity minted for a boxed value
    Value(Uuid),
    /// The injector itself, whichever copy of the crate produced the key
    Container,
}

/// Marker name shared by every build of the injector type
const CONTAINER_NAME: &str = "Injector";

/// Type identity used as the key of every registration, cache entry and metric
///
/// Equality and hashing only consider the identity, never the name.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: KeyId,
    name: &'static str,
}

impl TypeKey {
    /// Create the key of a Rust type
    ///
    /// The injector type maps to [`KeyId::Container`] by its path, so keys
    /// minted by independent copies of this crate still agree.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let name = std::any::type_name::<T>();
        if name == std::any::type_name::<Injector>() {
            return Self::container();
        }
        Self {
            id: KeyId::Type(TypeId::of::<T>()),
            name,
        }
    }

    /// Key under which a scope resolves to itself
    pub fn container() -> Self {
        Self {
            id: KeyId::Container,
            name: CONTAINER_NAME,
        }
    }

    /// Mint a fresh synthetic key for a boxed value
    pub fn value() -> Self {
        Self {
            id: KeyId::Value(Uuid::new_v4()),
            name: "BoxedValue",
        }
    }

    /// Get the underlying identity
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// Get the full type name
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    /// Get the type name without its module path
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(index) => &self.name[index + 2..],
            None => self.name,
        }
    }

    /// Check if this key is the key of a boxed value
    pub fn is_value(&self) -> bool {
        matches!(self.id, KeyId::Value(_))
    }

    /// Check if this key denotes the container itself
    pub fn is_container(&self) -> bool {
        self.id == KeyId::Container
    }

    /// Check if this key denotes `T`
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        *self == TypeKey::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Named token a registration can be looked up by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A plain string token
    Name(Arc<str>),
    /// A unique token; two symbols with the same description never collide
    Symbol { id: Uuid, description: Arc<str> },
}

impl Token {
    /// Create a string token
    pub fn name(name: impl Into<Arc<str>>) -> Self {
        Token::Name(name.into())
    }

    /// Create a unique symbol token
    pub fn symbol(description: impl Into<Arc<str>>) -> Self {
        Token::Symbol {
            id: Uuid::new_v4(),
            description: description.into(),
        }
    }

    /// Check if the token is a symbol
    pub fn is_symbol(&self) -> bool {
        matches!(self, Token::Symbol { .. })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "{}", name),
            Token::Symbol { description, .. } => write!(f, "Symbol({})", description),
        }
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::name(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::name(value)
    }
}

/// What a caller asks the engine for: a type or a token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Type(TypeKey),
    Token(Token),
}

impl Target {
    /// Create a type target for `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Target::Type(TypeKey::of::<T>())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Type(key) => write!(f, "{}", key),
            Target::Token(token) => write!(f, "{}", token),
        }
    }
}

impl From<TypeKey> for Target {
    fn from(value: TypeKey) -> Self {
        Target::Type(value)
    }
}

impl From<Token> for Target {
    fn from(value: Token) -> Self {
        Target::Token(value)
    }
}

impl From<&Token> for Target {
    fn from(value: &Token) -> Self {
        Target::Token(value.clone())
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::Token(Token::name(value))
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Target::Token(Token::name(value))
    }
}

/// Identifier of a scope in the injector tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Uuid);

impl ScopeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine;
    struct Wrapper<T>(T);

    #[test]
    fn test_type_key_identity() {
        assert_eq!(TypeKey::of::<Engine>(), TypeKey::of::<Engine>());
        assert_ne!(TypeKey::of::<Engine>(), TypeKey::of::<String>());
        assert_ne!(TypeKey::value(), TypeKey::value());
    }

    #[test]
    fn test_short_name_strips_path() {
        assert_eq!(TypeKey::of::<Engine>().short_name(), "Engine");
        assert!(TypeKey::of::<Wrapper<Engine>>()
            .short_name()
            .starts_with("Wrapper<"));
    }

    #[test]
    fn test_container_marker() {
        assert!(TypeKey::of::<Injector>().is_container());
        assert!(TypeKey::container().is_container());
        assert_eq!(TypeKey::of::<Injector>(), TypeKey::container());
        assert_eq!(TypeKey::container().short_name(), "Injector");
        assert!(!TypeKey::of::<Engine>().is_container());
        assert!(!TypeKey::value().is_container());
    }

    #[test]
    fn test_symbols_are_unique() {
        let first = Token::symbol("config");
        let second = Token::symbol("config");

        assert_ne!(first, second);
        assert_eq!(Token::from("config"), Token::name("config"));
        assert_eq!(first.to_string(), "Symbol(config)");
    }

    #[test]
    fn test_target_conversions() {
        assert_eq!(Target::from("db"), Target::Token(Token::name("db")));
        assert_eq!(Target::of::<Engine>(), Target::Type(TypeKey::of::<Engine>()));
    }
}
