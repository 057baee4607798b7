use std::fmt;

use super::Value;

/// Bytecode operations for the MyPL VM.
///
/// Each operation carries at most one immediate operand. Jump targets and
/// slot numbers are instruction/slot indices; field and function references
/// are names.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // ========================================
    // Literals and Variables
    // ========================================
    Push(Value),
    Pop,
    Load(usize),
    Store(usize),

    // ========================================
    // Arithmetic / Logic
    // ========================================
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Not,

    // ========================================
    // Comparison → bool
    // ========================================
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,

    // ========================================
    // Control Flow
    // ========================================
    Jmp(usize),
    JmpIfFalse(usize),
    Call(String),
    Ret,

    // ========================================
    // Builtins
    // ========================================
    Write,
    Read,
    StrLen,
    ArrayLen,
    GetChar,
    ToInt,
    ToDouble,
    ToStr,
    Concat,

    // ========================================
    // Heap Operations
    // ========================================
    AllocStruct,
    AllocArray,
    /// [columns, rows, fill] → [id]
    AllocArray2D,
    AddField(String),
    SetField(String),
    GetField(String),
    SetIndex,
    GetIndex,
    /// [id, row, column, value] → []
    SetIndex2D,
    /// [id, row, column] → [value]
    GetIndex2D,

    // ========================================
    // Special
    // ========================================
    Dup,
    Nop,
}

impl Op {
    /// Returns the mnemonic of the opcode, as shown in dumps and fault reports.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Push(_) => "PUSH",
            Op::Pop => "POP",
            Op::Load(_) => "LOAD",
            Op::Store(_) => "STORE",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::Lt => "CMPLT",
            Op::Le => "CMPLE",
            Op::Gt => "CMPGT",
            Op::Ge => "CMPGE",
            Op::Eq => "CMPEQ",
            Op::Ne => "CMPNE",
            Op::Jmp(_) => "JMP",
            Op::JmpIfFalse(_) => "JMPF",
            Op::Call(_) => "CALL",
            Op::Ret => "RET",
            Op::Write => "WRITE",
            Op::Read => "READ",
            Op::StrLen => "SLEN",
            Op::ArrayLen => "ALEN",
            Op::GetChar => "GETC",
            Op::ToInt => "TOINT",
            Op::ToDouble => "TODBL",
            Op::ToStr => "TOSTR",
            Op::Concat => "CONCAT",
            Op::AllocStruct => "ALLOCS",
            Op::AllocArray => "ALLOCA",
            Op::AllocArray2D => "ALLOCA2D",
            Op::AddField(_) => "ADDF",
            Op::SetField(_) => "SETF",
            Op::GetField(_) => "GETF",
            Op::SetIndex => "SETI",
            Op::GetIndex => "GETI",
            Op::SetIndex2D => "SETI2D",
            Op::GetIndex2D => "GETI2D",
            Op::Dup => "DUP",
            Op::Nop => "NOP",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic();
        match self {
            Op::Push(value) => write!(f, "{}({})", name, value),
            Op::Load(slot) | Op::Store(slot) => write!(f, "{}({})", name, slot),
            Op::Jmp(target) | Op::JmpIfFalse(target) => write!(f, "{}({})", name, target),
            Op::Call(func) => write!(f, "{}({})", name, func),
            Op::AddField(field) | Op::SetField(field) | Op::GetField(field) => {
                write!(f, "{}({})", name, field)
            }
            _ => write!(f, "{}()", name),
        }
    }
}
