use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{
    ConfigError, ConfigFormat, ConfigSource, ConfigValidator, NonZeroDurationValidator,
    RangeValidator,
};
use crate::container::binding::ExternalResolution;
use crate::container::cache::CacheStrategy;
use crate::container::metadata::MetadataMode;

pub const ENV_MAX_TREE_DEPTH: &str = "LATTICE_MAX_TREE_DEPTH";
pub const ENV_ALLOW_DUPLICATE_TOKENS: &str = "LATTICE_ALLOW_DUPLICATE_TOKENS";
pub const ENV_TRACK_METRICS: &str = "LATTICE_TRACK_METRICS";
pub const ENV_METADATA_MODE: &str = "LATTICE_METADATA_MODE";
pub const ENV_DEFAULT_CACHE_STRATEGY: &str = "LATTICE_DEFAULT_CACHE_STRATEGY";

const DEFAULT_MAX_TREE_DEPTH: usize = 100;

const SETTINGS: [&str; 6] = [
    "max_tree_depth",
    "external_resolution_strategy",
    "allow_duplicate_tokens",
    "track_metrics",
    "metadata_mode",
    "default_cache_strategy",
];

/// Engine-wide behavioral settings shared by a root scope and all its descendants
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Longest ancestry allowed while constructing
    pub max_tree_depth: usize,
    /// Resolver consulted for every type without its own resolution override
    pub external_resolution_strategy: Option<ExternalResolution>,
    pub allow_duplicate_tokens: bool,
    pub track_metrics: bool,
    pub metadata_mode: MetadataMode,
    pub default_cache_strategy: CacheStrategy,
    sources: HashMap<&'static str, ConfigSource>,
}

impl Configuration {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            external_resolution_strategy: None,
            allow_duplicate_tokens: false,
            track_metrics: true,
            metadata_mode: MetadataMode::Both,
            default_cache_strategy: CacheStrategy::Persistent,
            sources: HashMap::new(),
        }
    }

    /// Load configuration from `LATTICE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Some(value) = read_env(ENV_MAX_TREE_DEPTH)? {
            config.max_tree_depth = value.trim().parse().map_err(|_| {
                ConfigError::invalid_value("max_tree_depth", &value, "a positive integer")
            })?;
            config.mark("max_tree_depth", ConfigSource::EnvVar(ENV_MAX_TREE_DEPTH));
        }

        if let Some(value) = read_env(ENV_ALLOW_DUPLICATE_TOKENS)? {
            config.allow_duplicate_tokens = parse_bool("allow_duplicate_tokens", &value)?;
            config.mark("allow_duplicate_tokens", ConfigSource::EnvVar(ENV_ALLOW_DUPLICATE_TOKENS));
        }

        if let Some(value) = read_env(ENV_TRACK_METRICS)? {
            config.track_metrics = parse_bool("track_metrics", &value)?;
            config.mark("track_metrics", ConfigSource::EnvVar(ENV_TRACK_METRICS));
        }

        if let Some(value) = read_env(ENV_METADATA_MODE)? {
            config.metadata_mode = value.parse()?;
            config.mark("metadata_mode", ConfigSource::EnvVar(ENV_METADATA_MODE));
        }

        if let Some(value) = read_env(ENV_DEFAULT_CACHE_STRATEGY)? {
            config.default_cache_strategy = value.parse()?;
            config.mark("default_cache_strategy", ConfigSource::EnvVar(ENV_DEFAULT_CACHE_STRATEGY));
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::from_document(ConfigFormat::Yaml, contents)
    }

    /// Parse a JSON document
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Self::from_document(ConfigFormat::Json, contents)
    }

    fn from_document(format: ConfigFormat, contents: &str) -> Result<Self, ConfigError> {
        format
            .parse(contents)?
            .into_configuration(ConfigSource::Document(format))
    }

    /// Load a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;

        format.parse(&contents)?.into_configuration(ConfigSource::File {
            path: path.to_path_buf(),
            format,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        RangeValidator::at_least("max_tree_depth", 1).validate(&self.max_tree_depth)?;

        if let CacheStrategy::Idle(timeout) = &self.default_cache_strategy {
            NonZeroDurationValidator {
                field: "default_cache_strategy",
            }
            .validate(timeout)?;
        }

        Ok(())
    }

    /// Where each setting came from
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        SETTINGS
            .iter()
            .map(|field| {
                let source = self
                    .sources
                    .get(field)
                    .cloned()
                    .unwrap_or(ConfigSource::Default);
                (field.to_string(), source)
            })
            .collect()
    }

    /// Restore every setting to its default
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn with_max_tree_depth(mut self, max_tree_depth: usize) -> Self {
        self.max_tree_depth = max_tree_depth;
        self.mark("max_tree_depth", ConfigSource::Programmatic);
        self
    }

    pub fn with_external_resolution(mut self, resolution: ExternalResolution) -> Self {
        self.external_resolution_strategy = Some(resolution);
        self.mark("external_resolution_strategy", ConfigSource::Programmatic);
        self
    }

    pub fn with_duplicate_tokens(mut self, allow: bool) -> Self {
        self.allow_duplicate_tokens = allow;
        self.mark("allow_duplicate_tokens", ConfigSource::Programmatic);
        self
    }

    pub fn with_metrics(mut self, track_metrics: bool) -> Self {
        self.track_metrics = track_metrics;
        self.mark("track_metrics", ConfigSource::Programmatic);
        self
    }

    pub fn with_metadata_mode(mut self, metadata_mode: MetadataMode) -> Self {
        self.metadata_mode = metadata_mode;
        self.mark("metadata_mode", ConfigSource::Programmatic);
        self
    }

    pub fn with_default_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.default_cache_strategy = strategy;
        self.mark("default_cache_strategy", ConfigSource::Programmatic);
        self
    }

    fn mark(&mut self, field: &'static str, source: ConfigSource) {
        self.sources.insert(field, source);
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable form of [`Configuration`] used by file loading
///
/// Resolvers and predicates cannot be expressed in a file and must be set in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigurationFile {
    pub max_tree_depth: Option<usize>,
    pub allow_duplicate_tokens: Option<bool>,
    pub track_metrics: Option<bool>,
    pub metadata_mode: Option<MetadataMode>,
    /// `persistent`, `no-cache`, `weak-reference` or `idle:<ms>`
    pub default_cache_strategy: Option<String>,
}

impl ConfigurationFile {
    fn into_configuration(self, source: ConfigSource) -> Result<Configuration, ConfigError> {
        let mut config = Configuration::new();

        if let Some(depth) = self.max_tree_depth {
            config.max_tree_depth = depth;
            config.mark("max_tree_depth", source.clone());
        }
        if let Some(allow) = self.allow_duplicate_tokens {
            config.allow_duplicate_tokens = allow;
            config.mark("allow_duplicate_tokens", source.clone());
        }
        if let Some(track) = self.track_metrics {
            config.track_metrics = track;
            config.mark("track_metrics", source.clone());
        }
        if let Some(mode) = self.metadata_mode {
            config.metadata_mode = mode;
            config.mark("metadata_mode", source.clone());
        }
        if let Some(strategy) = self.default_cache_strategy {
            config.default_cache_strategy = strategy.parse()?;
            config.mark("default_cache_strategy", source);
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_env(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::environment_error(format!(
            "{} is not valid unicode",
            name
        ))),
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(field, value, "true or false")),
    }
}
