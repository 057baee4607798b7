//! Linear bytecode listing for debugging the code generator.
//!
//! ```text
//! Frame 'main'
//!   0: PUSH(3)
//!   1: STORE(0)
//! ```
//!
//! Frames appear in name order, separated by a blank line.

use crate::vm::{Chunk, Function, Op};

/// Disassembler for bytecode.
pub struct Disassembler<'a> {
    chunk: &'a Chunk,
    output: String,
}

impl<'a> Disassembler<'a> {
    pub fn new(chunk: &'a Chunk) -> Self {
        Self {
            chunk,
            output: String::new(),
        }
    }

    pub fn disassemble(&mut self) -> &str {
        for (i, func) in self.chunk.iter().enumerate() {
            if i > 0 {
                self.output.push('\n');
            }
            self.disassemble_function(func);
        }
        &self.output
    }

    fn disassemble_function(&mut self, func: &Function) {
        self.output.push_str(&format!("Frame '{}'\n", func.name));
        self.disassemble_code(&func.code);
    }

    fn disassemble_code(&mut self, code: &[Op]) {
        for (pc, op) in code.iter().enumerate() {
            self.output.push_str(&format!("  {}: {}\n", pc, op));
        }
    }
}

/// Format a chunk as a disassembled bytecode string.
pub fn format_bytecode(chunk: &Chunk) -> String {
    let mut disassembler = Disassembler::new(chunk);
    disassembler.disassemble().to_string()
}
