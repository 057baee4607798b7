//! Errors surfaced by the library pipeline and the `mypl` binary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::CodegenError;
use crate::vm::VmError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid syntax tree in {}: {source}", .path.display())]
    Tree {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    ConfigWrite(#[source] toml::ser::Error),

    #[error("Code generation error: {0}")]
    Codegen(#[from] CodegenError),

    #[error("VM Error: {0}")]
    Vm(#[from] VmError),
}

pub type Result<T> = std::result::Result<T, Error>;
