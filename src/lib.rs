//! MyPL - bytecode back end for a small imperative language
//!
//! This library provides the code generator, which lowers a checked syntax
//! tree into per-function bytecode, and the stack VM that runs it.

pub mod compiler;
pub mod config;
pub mod error;
pub mod vm;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use vm::{Chunk, VM, Value};
