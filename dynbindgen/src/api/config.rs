//! Generator settings read from a TOML file.
//!
//! ```toml
//! library_name = "calc"
//! target = "x86_64-unknown-linux-gnu"
//! edition = "2021"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::RustEdition;

/// Every field is optional; unset fields keep the builder defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base name of the native library, without prefix or suffix
    pub library_name: Option<String>,
    /// Target triple of the machine the bindings run on
    pub target: Option<String>,
    pub edition: Option<RustEdition>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid target: {0}")]
    Target(String),
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}
