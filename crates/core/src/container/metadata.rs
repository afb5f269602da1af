use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::container::binding::Registration;
use crate::container::descriptor::TypeKey;

/// Where constructor parameter types are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    /// Only the explicit list supplied with the registration
    Explicit,
    /// Only [`Injectable::dependencies`](crate::container::autowiring::Injectable::dependencies)
    Reflection,
    /// The explicit list when present, otherwise the reflected one
    #[default]
    Both,
}

impl MetadataMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataMode::Explicit => "explicit",
            MetadataMode::Reflection => "reflection",
            MetadataMode::Both => "both",
        }
    }
}

impl fmt::Display for MetadataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetadataMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "explicit" => Ok(MetadataMode::Explicit),
            "reflection" => Ok(MetadataMode::Reflection),
            "both" => Ok(MetadataMode::Both),
            _ => Err(ConfigError::invalid_value(
                "metadata_mode",
                s,
                "explicit, reflection or both",
            )),
        }
    }
}

/// Source of ordered constructor parameter types
pub trait MetadataProvider: Send + Sync {
    fn constructor_parameter_types(
        &self,
        key: &TypeKey,
        registration: Option<&Registration>,
    ) -> Vec<TypeKey>;
}

/// Reads parameter types off the registration, honoring a [`MetadataMode`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationMetadataProvider {
    mode: MetadataMode,
}

impl RegistrationMetadataProvider {
    pub fn new(mode: MetadataMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MetadataMode {
        self.mode
    }
}

impl MetadataProvider for RegistrationMetadataProvider {
    fn constructor_parameter_types(
        &self,
        _key: &TypeKey,
        registration: Option<&Registration>,
    ) -> Vec<TypeKey> {
        let Some(registration) = registration else {
            return Vec::new();
        };

        let explicit = registration.config().metadata.as_ref();
        match self.mode {
            MetadataMode::Explicit => explicit.cloned().unwrap_or_default(),
            MetadataMode::Reflection => registration.reflected_dependencies(),
            MetadataMode::Both => explicit
                .cloned()
                .unwrap_or_else(|| registration.reflected_dependencies()),
        }
    }
}
