use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error type used by external resolvers and eviction predicates
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Core error type for the lattice engine
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Cannot construct Type '{type_name}' with ancestry '{ancestry}' the type is not registered with any injector and the constructor param is not marked optional")]
    NotFound { type_name: String, ancestry: String },

    #[error("Cannot resolve Type with token '{token}' as no types have been registered against that token value")]
    TokenNotFound { token: String },

    #[error("Cannot construct Type '{type_name}' with ancestry '{ancestry}' as max tree depth of {max_depth} has been reached")]
    DepthExceeded {
        type_name: String,
        ancestry: String,
        max_depth: usize,
    },

    #[error("Invalid operation, the current injector instance is marked as destroyed. Injector Id: [{scope_id}]")]
    DestroyedScope { scope_id: String },

    #[error("External resolution failed for '{type_name}': {source}")]
    Delegate {
        type_name: String,
        source: BoxError,
    },

    #[error("Type '{type_name}' has no constructor; register it with a resolution override or as an Injectable")]
    NotConstructible { type_name: String },

    #[error("Resolved instance is not of the requested type '{expected}'")]
    TypeMismatch { expected: String },

    #[error("Constructor argument {index} of '{owner}' is not a {expected}")]
    ArgumentMismatch {
        owner: String,
        index: usize,
        expected: String,
    },

    #[error("Construction of '{type_name}' failed: {message}")]
    Construction { type_name: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new not found error for a type and the ancestry that led to it
    pub fn not_found(type_name: impl Into<String>, ancestry: impl Into<String>) -> Self {
        Self::NotFound {
            type_name: type_name.into(),
            ancestry: ancestry.into(),
        }
    }

    /// Create a new token not found error
    pub fn token_not_found(token: impl Into<String>) -> Self {
        Self::TokenNotFound {
            token: token.into(),
        }
    }

    /// Wrap an external resolver failure
    pub fn delegate(type_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Delegate {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// Create a construction failure raised from inside a constructor
    pub fn construction(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create a type mismatch error for a failed downcast
    pub fn type_mismatch(expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
        }
    }

    /// Check if the error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Config(_))
    }

    /// Check if the error signals a missing registration (by type or token)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::TokenNotFound { .. })
    }

    /// Check if the error is a depth cutoff
    pub fn is_depth_exceeded(&self) -> bool {
        matches!(self, Self::DepthExceeded { .. })
    }

    /// Check if the error was raised against a destroyed scope
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::DestroyedScope { .. })
    }
}
