mod fault;
mod heap;
mod ops;
mod value;
mod vm;

use std::collections::BTreeMap;

pub use fault::{Fault, FaultKind, FaultSite, VmError};
pub use heap::{FIRST_OBJECT_ID, Heap, ObjectId};
pub use ops::Op;
pub use value::Value;
pub use vm::VM;

/// A compiled function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    pub code: Vec<Op>,
}

impl Function {
    pub fn new(name: impl Into<String>, arity: usize, code: Vec<Op>) -> Self {
        Self {
            name: name.into(),
            arity,
            code,
        }
    }
}

/// A compiled program: every function, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub functions: BTreeMap<String, Function>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, returning the one it replaced if the name was taken.
    pub fn add(&mut self, function: Function) -> Option<Function> {
        self.functions.insert(function.name.clone(), function)
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Functions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }
}
