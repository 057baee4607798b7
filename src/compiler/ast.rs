//! Checked syntax tree handed to the back end.
//!
//! The tree is produced by the external front end after type checking, so
//! every name is resolved and every operand has a known static type. It is
//! exchanged as JSON: enum variants are snake_case and externally tagged,
//! e.g. `{"literal": {"int": 3}}` or `"null"`.

use serde::{Deserialize, Serialize};

/// Name the checker substitutes for `length` when its argument is an array.
pub const ARRAY_LENGTH: &str = "length@array";

/// A complete program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub structs: Vec<StructDef>,
    pub functions: Vec<FnDef>,
}

/// A declared type: a base type name, optionally as an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    #[serde(default)]
    pub is_array: bool,
}

impl DataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_array: false,
        }
    }

    pub fn array_of(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_array: true,
        }
    }

    pub fn void() -> Self {
        Self::new("void")
    }
}

/// A typed name: struct field, parameter or local variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDef {
    pub name: String,
    pub data_type: DataType,
}

impl VarDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A struct definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<VarDef>,
}

/// A function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDef {
    pub name: String,
    pub return_type: DataType,
    #[serde(default)]
    pub params: Vec<VarDef>,
    pub body: Vec<Statement>,
}

/// Statements in the language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    VarDecl(VarDeclStmt),
    Assign(AssignStmt),
    Call(CallExpr),
    If {
        if_part: BasicIf,
        #[serde(default)]
        else_ifs: Vec<BasicIf>,
        #[serde(default)]
        else_body: Vec<Statement>,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
    },
    For {
        init: VarDeclStmt,
        condition: Expr,
        step: AssignStmt,
        body: Vec<Statement>,
    },
    Return(Expr),
}

/// `T name = init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDeclStmt {
    pub var: VarDef,
    pub init: Expr,
}

/// `a.b[i].c = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignStmt {
    pub target: Vec<VarRef>,
    pub value: Expr,
}

/// One guarded branch of an if statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicIf {
    pub condition: Expr,
    pub body: Vec<Statement>,
}

/// A function or builtin call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expr>,
}

/// One segment of a dotted path, optionally subscripted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscript: Option<Subscript>,
}

impl VarRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscript: None,
        }
    }

    pub fn indexed(name: impl Into<String>, index: Expr) -> Self {
        Self {
            name: name.into(),
            subscript: Some(Subscript::One(Box::new(index))),
        }
    }

    pub fn indexed_2d(name: impl Into<String>, row: Expr, column: Expr) -> Self {
        Self {
            name: name.into(),
            subscript: Some(Subscript::Two(Box::new(row), Box::new(column))),
        }
    }
}

/// `[i]` or `[row][column]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscript {
    One(Box<Expr>),
    Two(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    /// Raw character lexeme, escapes not yet resolved
    Char(String),
    Null,
}

/// Expressions in the language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Literal),
    /// Variable, field or element read
    Path(Vec<VarRef>),
    Call(CallExpr),
    /// `new T[n]` or `new T[rows][columns]`
    NewArray {
        elem_type: String,
        size: Subscript,
    },
    /// `new S`
    NewStruct {
        name: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
}

impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Literal(Literal::Int(n))
    }

    pub fn double(f: f64) -> Self {
        Expr::Literal(Literal::Double(f))
    }

    pub fn bool(b: bool) -> Self {
        Expr::Literal(Literal::Bool(b))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::Str(s.into()))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    /// A plain variable read.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Path(vec![VarRef::new(name)])
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr {
            name: name.into(),
            args,
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn new_array(elem_type: impl Into<String>, length: Expr) -> Self {
        Expr::NewArray {
            elem_type: elem_type.into(),
            size: Subscript::One(Box::new(length)),
        }
    }

    pub fn new_array_2d(elem_type: impl Into<String>, rows: Expr, columns: Expr) -> Self {
        Expr::NewArray {
            elem_type: elem_type.into(),
            size: Subscript::Two(Box::new(rows), Box::new(columns)),
        }
    }
}

impl Statement {
    pub fn decl(name: impl Into<String>, data_type: DataType, init: Expr) -> Self {
        Statement::VarDecl(VarDeclStmt {
            var: VarDef::new(name, data_type),
            init,
        })
    }

    pub fn assign(target: Vec<VarRef>, value: Expr) -> Self {
        Statement::Assign(AssignStmt { target, value })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Statement::Call(CallExpr {
            name: name.into(),
            args,
        })
    }

    /// `print(e)`
    pub fn print(expr: Expr) -> Self {
        Self::call("print", vec![expr])
    }
}
