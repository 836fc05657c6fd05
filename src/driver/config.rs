use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ir::canonicalizer::CanonicalizerConfig,
    platform::{BarrierSetKind, StaticPlatformConfiguration},
};

/// The file looked up in the working directory when no config is given.
pub const DEFAULT_CONFIG_FILE: &str = "seagraph.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// The compiler config file. Namely seagraph.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Bounds of the canonicalizer.
    pub canonicalizer: CanonicalizerConfig,
    /// The target platform.
    pub platform: PlatformConfig,
}

/// Defines the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    /// The garbage collector barrier strategy.
    pub barrier_set: BarrierSetKind,
    /// Whether wide byte array accesses may be virtualized.
    pub can_virtualize_large_byte_array_access: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            barrier_set: BarrierSetKind::default(),
            can_virtualize_large_byte_array_access: true,
        }
    }
}

impl PlatformConfig {
    pub fn build(&self) -> StaticPlatformConfiguration {
        StaticPlatformConfiguration::new(
            self.barrier_set.build(),
            self.can_virtualize_large_byte_array_access,
        )
    }
}

impl Config {
    pub fn from_toml(source: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the config at `path`. A missing file means the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_toml(&source, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
