use std::time::Duration;

use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Environment variable error: {message}")]
    EnvironmentError { message: String },

    #[error("Parsing error: {message}")]
    ParsingError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create an environment error
    pub fn environment_error(message: impl Into<String>) -> Self {
        Self::EnvironmentError {
            message: message.into(),
        }
    }

    /// Create a parsing error
    pub fn parsing_error(message: impl Into<String>) -> Self {
        Self::ParsingError {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Inclusive range validator for counts such as the tree depth
pub struct RangeValidator {
    pub field: &'static str,
    pub min: usize,
    pub max: usize,
}

impl RangeValidator {
    pub fn at_least(field: &'static str, min: usize) -> Self {
        Self {
            field,
            min,
            max: usize::MAX,
        }
    }
}

impl ConfigValidator<usize> for RangeValidator {
    fn validate(&self, value: &usize) -> Result<(), ConfigError> {
        if *value < self.min || *value > self.max {
            let expected = if self.max == usize::MAX {
                format!("a value of at least {}", self.min)
            } else {
                format!("a value between {} and {}", self.min, self.max)
            };
            return Err(ConfigError::invalid_value(self.field, value.to_string(), expected));
        }
        Ok(())
    }
}

/// Rejects zero durations
pub struct NonZeroDurationValidator {
    pub field: &'static str,
}

impl ConfigValidator<Duration> for NonZeroDurationValidator {
    fn validate(&self, value: &Duration) -> Result<(), ConfigError> {
        if value.is_zero() {
            return Err(ConfigError::invalid_value(
                self.field,
                format!("{:?}", value),
                "a duration greater than zero",
            ));
        }
        Ok(())
    }
}
