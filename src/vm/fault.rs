//! Runtime faults raised by the VM.
//!
//! A fault is fatal: the VM stops at the faulting instruction and the error
//! propagates out of [`VM::run`](super::VM::run). Faults raised while a frame
//! is executing carry the site (function, instruction index, instruction
//! text) so the report points at the exact instruction.

use std::fmt;

use thiserror::Error;

/// Classification of a runtime fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A null value was dereferenced or used as an operand.
    NullReference,
    /// Array or text index outside of `[0, length)`.
    OutOfBounds,
    /// No zero-parameter `main` function registered.
    MissingEntryPoint,
    /// Text could not be parsed as the requested numeric type.
    Conversion,
    /// Integer division by zero.
    DivisionByZero,
    /// CALL names a function that is not registered.
    UnknownFunction,
    /// Missing operand, operand of the wrong variant, or dangling object id.
    Operand,
    /// Reading input or writing output failed.
    Io,
}

/// Where a fault happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultSite {
    pub function: String,
    pub pc: usize,
    pub instruction: String,
}

impl fmt::Display for FaultSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " (in {} at {}: {})",
            self.function, self.pc, self.instruction
        )
    }
}

/// A fault before it is attached to an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn null_reference() -> Self {
        Self::new(FaultKind::NullReference, "null reference")
    }

    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::new(FaultKind::OutOfBounds, message)
    }

    pub fn operand(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Operand, message)
    }

    pub fn stack_underflow() -> Self {
        Self::operand("operand stack underflow")
    }

    /// Attach the executing instruction to this fault.
    pub fn at(self, site: FaultSite) -> VmError {
        VmError {
            kind: self.kind,
            message: self.message,
            site: Some(site),
        }
    }
}

/// A fault as reported to the caller of `run`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", .site.as_ref().map(ToString::to_string).unwrap_or_default())]
pub struct VmError {
    pub kind: FaultKind,
    pub message: String,
    pub site: Option<FaultSite>,
}

impl From<Fault> for VmError {
    fn from(fault: Fault) -> Self {
        VmError {
            kind: fault.kind,
            message: fault.message,
            site: None,
        }
    }
}

impl VmError {
    pub fn missing_entry_point() -> Self {
        VmError {
            kind: FaultKind::MissingEntryPoint,
            message: "No 'main' function".to_string(),
            site: None,
        }
    }
}
