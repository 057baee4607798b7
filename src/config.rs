//! Runtime configuration types.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Runtime configuration for the VM.
///
/// Loaded from a TOML file such as:
///
/// ```toml
/// trace = true
/// profile_opcodes = false
/// ```
///
/// Missing keys fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Print a `[trace]` line to stderr before every instruction
    pub trace: bool,
    /// Print per-opcode execution counts to stderr after the run
    pub profile_opcodes: bool,
}

impl RuntimeConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save a configuration file.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let content = toml::to_string_pretty(self).map_err(Error::ConfigWrite)?;
        fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
