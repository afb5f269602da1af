//! Token registry backing token substitution and parameter annotations
//!
//! Each scope owns one registry. Type-level bindings associate an owner type
//! with a token (lookup by token) or with a strategy key (lookup of every
//! consumer). Parameter annotations are keyed by owner type and constructor
//! position and steer how that position is resolved.
//!
//! The registry only ever appends; the most recently registered owner of a
//! token wins on lookup.

use std::collections::HashMap;

use crate::container::descriptor::{Token, TypeKey};
use crate::errors::CoreError;

/// How a constructor position is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// Substitute the position's type with the owner of a token
    Token(Token),
    /// Inject every consumer registered under a strategy key
    Strategy(Token),
    /// Inject an [`AutoFactory`](crate::container::factory::AutoFactory) for the type
    Factory(TypeKey),
    /// Inject a [`LazyInstance`](crate::container::lazy::LazyInstance) for the type
    Lazy(TypeKey),
    /// Resolve to undefined instead of failing when nothing is registered
    Optional,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Token(_) => "token",
            ParameterKind::Strategy(_) => "strategy",
            ParameterKind::Factory(_) => "factory",
            ParameterKind::Lazy(_) => "lazy",
            ParameterKind::Optional => "optional",
        }
    }
}

/// Annotation attached to one constructor position of an owner type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterToken {
    pub owner: TypeKey,
    pub index: usize,
    pub kind: ParameterKind,
}

impl ParameterToken {
    pub fn new(owner: TypeKey, index: usize, kind: ParameterKind) -> Self {
        Self { owner, index, kind }
    }
}

/// Type-level association between an owner type and a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenBinding {
    /// The owner can be resolved by `token`
    Type { owner: TypeKey, token: Token },
    /// The owner is one consumer of the strategy key `token`
    Strategy { owner: TypeKey, token: Token },
}

/// Anything the registry can record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenMetadata {
    Parameter(ParameterToken),
    Binding(TokenBinding),
}

impl From<ParameterToken> for TokenMetadata {
    fn from(value: ParameterToken) -> Self {
        TokenMetadata::Parameter(value)
    }
}

impl From<TokenBinding> for TokenMetadata {
    fn from(value: TokenBinding) -> Self {
        TokenMetadata::Binding(value)
    }
}

/// Every parameter annotation recorded for one owner, taken as a unit
#[derive(Debug, Clone, Default)]
pub struct ParameterAnnotations {
    pub inject: Vec<ParameterToken>,
    pub strategy: Vec<ParameterToken>,
    pub factory: Vec<ParameterToken>,
    pub lazy: Vec<ParameterToken>,
    pub optional: Vec<ParameterToken>,
}

impl ParameterAnnotations {
    pub fn is_empty(&self) -> bool {
        self.inject.is_empty()
            && self.strategy.is_empty()
            && self.factory.is_empty()
            && self.lazy.is_empty()
            && self.optional.is_empty()
    }

    /// Token substituted at `index`
    pub fn token_at(&self, index: usize) -> Option<&Token> {
        self.inject.iter().find(|p| p.index == index).and_then(|p| match &p.kind {
            ParameterKind::Token(token) => Some(token),
            _ => None,
        })
    }

    /// Strategy key injected at `index`
    pub fn strategy_at(&self, index: usize) -> Option<&Token> {
        self.strategy.iter().find(|p| p.index == index).and_then(|p| match &p.kind {
            ParameterKind::Strategy(token) => Some(token),
            _ => None,
        })
    }

    /// Factory target at `index`
    pub fn factory_at(&self, index: usize) -> Option<TypeKey> {
        self.factory.iter().find(|p| p.index == index).and_then(|p| match p.kind {
            ParameterKind::Factory(key) => Some(key),
            _ => None,
        })
    }

    /// Lazy target at `index`
    pub fn lazy_at(&self, index: usize) -> Option<TypeKey> {
        self.lazy.iter().find(|p| p.index == index).and_then(|p| match p.kind {
            ParameterKind::Lazy(key) => Some(key),
            _ => None,
        })
    }

    pub fn is_optional(&self, index: usize) -> bool {
        self.optional.iter().any(|p| p.index == index)
    }
}

/// Per-scope registry of tokens, strategy keys and parameter annotations
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    inject_tokens: HashMap<TypeKey, Vec<ParameterToken>>,
    strategy_tokens: HashMap<TypeKey, Vec<ParameterToken>>,
    factory_tokens: HashMap<TypeKey, Vec<ParameterToken>>,
    lazy_tokens: HashMap<TypeKey, Vec<ParameterToken>>,
    optional_tokens: HashMap<TypeKey, Vec<ParameterToken>>,
    type_to_tokens: HashMap<TypeKey, Vec<Token>>,
    tokens_to_types: HashMap<Token, Vec<TypeKey>>,
    strategy_consumers: HashMap<Token, Vec<TypeKey>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parameter annotation or a type-level binding
    pub fn register(&mut self, metadata: impl Into<TokenMetadata>) {
        match metadata.into() {
            TokenMetadata::Parameter(parameter) => self.register_parameter(parameter),
            TokenMetadata::Binding(binding) => self.register_binding(binding),
        }
    }

    /// Fail if `token` is already claimed by a type other than `owner`
    pub fn ensure_unclaimed(&self, owner: TypeKey, token: &Token) -> Result<(), CoreError> {
        let owners = self.get_types_for_token(token);
        if owners.iter().all(|existing| *existing == owner) {
            return Ok(());
        }

        let existing = owners
            .iter()
            .map(|key| key.short_name())
            .collect::<Vec<_>>()
            .join(" -> ");
        Err(CoreError::configuration(format!(
            "Cannot register Type [{}] with token '{}'. Duplicate token found for the following type [{}]",
            owner.short_name(),
            token,
            existing
        )))
    }

    pub fn get_inject_tokens(&self, owner: &TypeKey) -> Vec<ParameterToken> {
        self.inject_tokens.get(owner).cloned().unwrap_or_default()
    }

    pub fn get_strategy_tokens(&self, owner: &TypeKey) -> Vec<ParameterToken> {
        self.strategy_tokens.get(owner).cloned().unwrap_or_default()
    }

    pub fn get_factory_tokens(&self, owner: &TypeKey) -> Vec<ParameterToken> {
        self.factory_tokens.get(owner).cloned().unwrap_or_default()
    }

    pub fn get_lazy_tokens(&self, owner: &TypeKey) -> Vec<ParameterToken> {
        self.lazy_tokens.get(owner).cloned().unwrap_or_default()
    }

    pub fn get_optional_tokens(&self, owner: &TypeKey) -> Vec<ParameterToken> {
        self.optional_tokens.get(owner).cloned().unwrap_or_default()
    }

    /// All annotations recorded for `owner` in this registry
    pub fn parameter_annotations(&self, owner: &TypeKey) -> ParameterAnnotations {
        ParameterAnnotations {
            inject: self.get_inject_tokens(owner),
            strategy: self.get_strategy_tokens(owner),
            factory: self.get_factory_tokens(owner),
            lazy: self.get_lazy_tokens(owner),
            optional: self.get_optional_tokens(owner),
        }
    }

    pub fn get_tokens_for_type(&self, owner: &TypeKey) -> Vec<Token> {
        self.type_to_tokens.get(owner).cloned().unwrap_or_default()
    }

    pub fn get_types_for_token(&self, token: &Token) -> Vec<TypeKey> {
        self.tokens_to_types.get(token).cloned().unwrap_or_default()
    }

    /// Most recently registered owner of `token`
    pub fn get_type_for_token(&self, token: &Token) -> Option<TypeKey> {
        self.tokens_to_types
            .get(token)
            .and_then(|owners| owners.last().copied())
    }

    pub fn get_strategy_consumers(&self, token: &Token) -> Vec<TypeKey> {
        self.strategy_consumers.get(token).cloned().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.inject_tokens.clear();
        self.strategy_tokens.clear();
        self.factory_tokens.clear();
        self.lazy_tokens.clear();
        self.optional_tokens.clear();
        self.type_to_tokens.clear();
        self.tokens_to_types.clear();
        self.strategy_consumers.clear();
    }

    fn register_parameter(&mut self, parameter: ParameterToken) {
        let map = match parameter.kind {
            ParameterKind::Token(_) => &mut self.inject_tokens,
            ParameterKind::Strategy(_) => &mut self.strategy_tokens,
            ParameterKind::Factory(_) => &mut self.factory_tokens,
            ParameterKind::Lazy(_) => &mut self.lazy_tokens,
            ParameterKind::Optional => &mut self.optional_tokens,
        };

        let entries = map.entry(parameter.owner).or_default();
        if !entries.contains(&parameter) {
            entries.push(parameter);
        }
    }

    fn register_binding(&mut self, binding: TokenBinding) {
        match binding {
            TokenBinding::Type { owner, token } => {
                let owners = self.tokens_to_types.entry(token.clone()).or_default();
                if owners.last() == Some(&owner) {
                    return;
                }
                owners.push(owner);
                self.type_to_tokens.entry(owner).or_default().push(token);
            }
            TokenBinding::Strategy { owner, token } => {
                let consumers = self.strategy_consumers.entry(token).or_default();
                if !consumers.contains(&owner) {
                    consumers.push(owner);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Car;
    struct Truck;
    struct Garage;

    fn bind(owner: TypeKey, token: &str) -> TokenBinding {
        TokenBinding::Type {
            owner,
            token: Token::name(token),
        }
    }

    #[test]
    fn test_last_registered_owner_wins() {
        let mut registry = TokenRegistry::new();
        registry.register(bind(TypeKey::of::<Car>(), "vehicle"));
        registry.register(bind(TypeKey::of::<Truck>(), "vehicle"));

        let token = Token::name("vehicle");
        assert_eq!(registry.get_type_for_token(&token), Some(TypeKey::of::<Truck>()));
        assert_eq!(registry.get_types_for_token(&token).len(), 2);
        assert_eq!(
            registry.get_tokens_for_type(&TypeKey::of::<Car>()),
            vec![token]
        );
    }

    #[test]
    fn test_unknown_lookups_are_empty() {
        let registry = TokenRegistry::new();
        let token = Token::name("missing");

        assert!(registry.get_type_for_token(&token).is_none());
        assert!(registry.get_strategy_consumers(&token).is_empty());
        assert!(registry.parameter_annotations(&TypeKey::of::<Car>()).is_empty());
    }

    #[test]
    fn test_duplicate_token_names_both_types() {
        let mut registry = TokenRegistry::new();
        registry.register(bind(TypeKey::of::<Car>(), "vehicle"));

        let error = registry
            .ensure_unclaimed(TypeKey::of::<Truck>(), &Token::name("vehicle"))
            .unwrap_err();
        let message = error.to_string();

        assert!(message.contains("Truck"));
        assert!(message.contains("Car"));
        assert!(registry
            .ensure_unclaimed(TypeKey::of::<Car>(), &Token::name("vehicle"))
            .is_ok());
    }

    #[test]
    fn test_parameter_annotations_by_position() {
        let mut registry = TokenRegistry::new();
        let owner = TypeKey::of::<Garage>();
        registry.register(ParameterToken::new(owner, 0, ParameterKind::Token(Token::name("vehicle"))));
        registry.register(ParameterToken::new(owner, 1, ParameterKind::Strategy(Token::name("tools"))));
        registry.register(ParameterToken::new(owner, 2, ParameterKind::Factory(TypeKey::of::<Car>())));
        registry.register(ParameterToken::new(owner, 3, ParameterKind::Lazy(TypeKey::of::<Truck>())));
        registry.register(ParameterToken::new(owner, 4, ParameterKind::Optional));

        let annotations = registry.parameter_annotations(&owner);
        assert_eq!(annotations.token_at(0), Some(&Token::name("vehicle")));
        assert_eq!(annotations.strategy_at(1), Some(&Token::name("tools")));
        assert_eq!(annotations.factory_at(2), Some(TypeKey::of::<Car>()));
        assert_eq!(annotations.lazy_at(3), Some(TypeKey::of::<Truck>()));
        assert!(annotations.is_optional(4));
        assert!(!annotations.is_optional(0));
    }

    #[test]
    fn test_strategy_consumers_are_deduplicated() {
        let mut registry = TokenRegistry::new();
        let binding = TokenBinding::Strategy {
            owner: TypeKey::of::<Car>(),
            token: Token::name("fleet"),
        };
        registry.register(binding.clone());
        registry.register(binding);

        assert_eq!(registry.get_strategy_consumers(&Token::name("fleet")).len(), 1);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut registry = TokenRegistry::new();
        registry.register(bind(TypeKey::of::<Car>(), "vehicle"));
        registry.register(ParameterToken::new(TypeKey::of::<Garage>(), 0, ParameterKind::Optional));

        registry.clear();

        assert!(registry.get_type_for_token(&Token::name("vehicle")).is_none());
        assert!(registry.get_optional_tokens(&TypeKey::of::<Garage>()).is_empty());
    }
}
