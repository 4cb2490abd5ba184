//! Configuration of the event processor.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::JAVA_PLATFORM;
use crate::resolver::DirectoryResolver;

/// Errors when loading a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file")]
    Io(#[from] io::Error),
    /// The configuration file is not valid JSON.
    #[error("failed to parse config file")]
    Json(#[from] serde_json::Error),
}

fn default_platform() -> String {
    JAVA_PLATFORM.to_owned()
}

/// Processor configuration, usually loaded from a JSON file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories searched for mapping files, in order.
    pub mapping_dirs: Vec<PathBuf>,
    /// The platform of frames that are deobfuscated.
    pub platform: String,
    /// Index the mapping directories by content UUID.
    pub scan: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mapping_dirs: Vec::new(),
            platform: default_platform(),
            scan: false,
        }
    }
}

impl Config {
    /// Loads the configuration from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = fs::read(path)?;
        Self::from_slice(&data)
    }

    /// Parses the configuration from JSON.
    pub fn from_slice(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Creates the resolver described by this configuration.
    ///
    /// Scanning requires the `uuid` feature and is ignored without it.
    pub fn resolver(&self) -> DirectoryResolver {
        #[cfg(feature = "uuid")]
        if self.scan {
            return DirectoryResolver::scan(self.mapping_dirs.iter().cloned());
        }

        DirectoryResolver::new(self.mapping_dirs.iter().cloned())
    }
}
