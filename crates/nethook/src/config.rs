//! TOML configuration of an [`Inspector`](crate::Inspector).
//!
//! ```toml
//! registry = "schemas/steam.json"
//!
//! [projection]
//! expand_depth = 3
//! collapse_repeated_over = 32
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{Registry, RegistryError};
use crate::tree::ProjectionConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InspectorConfig {
    /// Registry document to use instead of the bundled one. Relative paths
    /// are resolved against the config file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
    pub projection: ProjectionConfig,
}

impl InspectorConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        if let (Some(registry), Some(dir)) = (&config.registry, path.parent()) {
            if registry.is_relative() {
                config.registry = Some(dir.join(registry));
            }
        }
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// The configured registry, or the bundled one.
    pub fn load_registry(&self) -> Result<Registry, ConfigError> {
        let registry = match &self.registry {
            Some(path) => Registry::from_path(path)?,
            None => Registry::builtin()?,
        };
        Ok(registry)
    }
}
