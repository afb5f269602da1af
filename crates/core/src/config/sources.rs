use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, ConfigurationFile};

/// Serialization format of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a `.yaml`, `.yml` or `.json` extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::parsing_error(format!(
                "unsupported configuration file '{}', expected .yaml, .yml or .json",
                path.display()
            ))),
        }
    }

    pub(crate) fn parse(self, contents: &str) -> Result<ConfigurationFile, ConfigError> {
        match self {
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(contents)?),
            ConfigFormat::Json => Ok(serde_json::from_str(contents)?),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Yaml => write!(f, "yaml"),
            ConfigFormat::Json => write!(f, "json"),
        }
    }
}

/// Where one engine setting came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default
    Default,
    /// `LATTICE_*` environment variable
    EnvVar(&'static str),
    /// Configuration file on disk
    File { path: PathBuf, format: ConfigFormat },
    /// In-memory document passed to `from_yaml_str` / `from_json_str`
    Document(ConfigFormat),
    /// Builder method or `Injector::configure`
    Programmatic,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::EnvVar(name) => write!(f, "environment variable {}", name),
            ConfigSource::File { path, format } => write!(f, "{} file {}", format, path.display()),
            ConfigSource::Document(format) => write!(f, "{} document", format),
            ConfigSource::Programmatic => write!(f, "set in code"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("lattice.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("lattice.json")).unwrap(), ConfigFormat::Json);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("lattice.toml")),
            Err(ConfigError::ParsingError { .. })
        ));
    }

    #[test]
    fn test_source_display() {
        let file = ConfigSource::File {
            path: PathBuf::from("/etc/lattice.yaml"),
            format: ConfigFormat::Yaml,
        };
        assert_eq!(file.to_string(), "yaml file /etc/lattice.yaml");
        assert_eq!(
            ConfigSource::EnvVar("LATTICE_MAX_TREE_DEPTH").to_string(),
            "environment variable LATTICE_MAX_TREE_DEPTH"
        );
    }
}
