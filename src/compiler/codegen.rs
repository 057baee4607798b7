use std::collections::HashMap;

use thiserror::Error;

use crate::compiler::ast::{
    ARRAY_LENGTH, AssignStmt, BasicIf, BinaryOp, CallExpr, Expr, FnDef, Literal, Program,
    Statement, Subscript, VarDeclStmt, VarRef,
};
use crate::vm::{Chunk, Function, Op, Value};

/// Errors raised while lowering a tree. Only reachable if the tree was not
/// produced by the checker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("use of undeclared variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown struct type '{0}'")]
    UnknownStruct(String),
    #[error("function '{0}' is defined more than once")]
    DuplicateFunction(String),
    #[error("empty variable path")]
    EmptyPath,
}

/// Calls that lower to a single instruction instead of CALL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Print,
    Input,
    Get,
    Length,
    ArrayLength,
    ToString,
    ToInt,
    ToDouble,
    Concat,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "print" => Builtin::Print,
            "input" => Builtin::Input,
            "get" => Builtin::Get,
            "length" => Builtin::Length,
            ARRAY_LENGTH => Builtin::ArrayLength,
            "to_string" => Builtin::ToString,
            "to_int" => Builtin::ToInt,
            "to_double" => Builtin::ToDouble,
            "concat" => Builtin::Concat,
            _ => return None,
        })
    }

    fn op(self) -> Op {
        match self {
            Builtin::Print => Op::Write,
            Builtin::Input => Op::Read,
            Builtin::Get => Op::GetChar,
            Builtin::Length => Op::StrLen,
            Builtin::ArrayLength => Op::ArrayLen,
            Builtin::ToString => Op::ToStr,
            Builtin::ToInt => Op::ToInt,
            Builtin::ToDouble => Op::ToDouble,
            Builtin::Concat => Op::Concat,
        }
    }
}

/// Code generator that compiles a checked tree to bytecode.
pub struct Codegen {
    /// Struct name -> field names in declaration order
    struct_layouts: HashMap<String, Vec<String>>,
    /// Lexical scopes of the function being compiled: name -> slot
    scopes: Vec<HashMap<String, usize>>,
    /// Next unused slot in the function being compiled
    next_slot: usize,
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}

impl Codegen {
    pub fn new() -> Self {
        Self {
            struct_layouts: HashMap::new(),
            scopes: Vec::new(),
            next_slot: 0,
        }
    }

    /// Field names of a registered struct, in declaration order.
    pub fn struct_fields(&self, name: &str) -> Option<&[String]> {
        self.struct_layouts.get(name).map(Vec::as_slice)
    }

    pub fn compile(&mut self, program: &Program) -> Result<Chunk, CodegenError> {
        // Layouts first, so any function may allocate any struct
        for def in &program.structs {
            let fields = def.fields.iter().map(|f| f.name.clone()).collect();
            self.struct_layouts.insert(def.name.clone(), fields);
        }

        let mut chunk = Chunk::new();
        for func in &program.functions {
            if chunk.contains(&func.name) {
                return Err(CodegenError::DuplicateFunction(func.name.clone()));
            }
            let compiled = self.compile_function(func)?;
            chunk.add(compiled);
        }

        Ok(chunk)
    }

    fn compile_function(&mut self, func: &FnDef) -> Result<Function, CodegenError> {
        self.scopes = vec![HashMap::new()];
        self.next_slot = 0;

        let mut ops = Vec::new();

        // Arguments arrive on the operand stack, first argument on top
        for param in &func.params {
            let slot = self.declare(&param.name);
            ops.push(Op::Store(slot));
        }

        for stmt in &func.body {
            self.compile_statement(stmt, &mut ops)?;
        }

        // Implicit return null
        if !matches!(ops.last(), Some(Op::Ret)) {
            ops.push(Op::Push(Value::Null));
            ops.push(Op::Ret);
        }

        self.scopes.clear();

        Ok(Function::new(func.name.clone(), func.params.len(), ops))
    }

    // ---------------------------------------------------------------------
    // Scopes
    // ---------------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind `name` in the innermost scope to a fresh slot.
    fn declare(&mut self, name: &str) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        slot
    }

    fn lookup(&self, name: &str) -> Result<usize, CodegenError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| CodegenError::UnknownVariable(name.to_string()))
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn compile_block(&mut self, body: &[Statement], ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        self.push_scope();
        for stmt in body {
            self.compile_statement(stmt, ops)?;
        }
        self.pop_scope();
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement, ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        match stmt {
            Statement::VarDecl(decl) => self.compile_var_decl(decl, ops)?,
            Statement::Assign(assign) => self.compile_assign(assign, ops)?,
            Statement::Call(call) => {
                self.compile_call(call, ops)?;
                // Discard the result; WRITE leaves nothing behind
                if Builtin::from_name(&call.name) != Some(Builtin::Print) {
                    ops.push(Op::Pop);
                }
            }
            Statement::If {
                if_part,
                else_ifs,
                else_body,
            } => self.compile_if(if_part, else_ifs, else_body, ops)?,
            Statement::While { condition, body } => {
                let loop_start = ops.len();

                self.compile_expr(condition, ops)?;

                let jump_to_end = ops.len();
                ops.push(Op::JmpIfFalse(0)); // Placeholder

                self.compile_block(body, ops)?;

                ops.push(Op::Jmp(loop_start));

                let loop_end = ops.len();
                ops.push(Op::Nop);
                ops[jump_to_end] = Op::JmpIfFalse(loop_end);
            }
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                // The loop variable lives in its own scope around the body
                self.push_scope();
                self.compile_var_decl(init, ops)?;

                let loop_start = ops.len();

                self.compile_expr(condition, ops)?;

                let jump_to_end = ops.len();
                ops.push(Op::JmpIfFalse(0)); // Placeholder

                self.compile_block(body, ops)?;
                self.compile_assign(step, ops)?;

                ops.push(Op::Jmp(loop_start));

                let loop_end = ops.len();
                ops.push(Op::Nop);
                ops[jump_to_end] = Op::JmpIfFalse(loop_end);

                self.pop_scope();
            }
            Statement::Return(expr) => {
                self.compile_expr(expr, ops)?;
                ops.push(Op::Ret);
            }
        }
        Ok(())
    }

    fn compile_var_decl(&mut self, decl: &VarDeclStmt, ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        // Initializer sees the enclosing binding of a shadowed name
        self.compile_expr(&decl.init, ops)?;
        let slot = self.declare(&decl.var.name);
        ops.push(Op::Store(slot));
        Ok(())
    }

    fn compile_if(
        &mut self,
        if_part: &BasicIf,
        else_ifs: &[BasicIf],
        else_body: &[Statement],
        ops: &mut Vec<Op>,
    ) -> Result<(), CodegenError> {
        let mut exit_jumps = Vec::new();
        let mut jump_to_next: Option<usize> = None;

        for branch in std::iter::once(if_part).chain(else_ifs) {
            if let Some(jump) = jump_to_next {
                let branch_start = ops.len();
                ops[jump] = Op::JmpIfFalse(branch_start);
            }

            self.compile_expr(&branch.condition, ops)?;

            jump_to_next = Some(ops.len());
            ops.push(Op::JmpIfFalse(0)); // Placeholder

            self.compile_block(&branch.body, ops)?;

            exit_jumps.push(ops.len());
            ops.push(Op::Jmp(0)); // Placeholder
        }

        if !else_body.is_empty() {
            if let Some(jump) = jump_to_next.take() {
                let else_start = ops.len();
                ops[jump] = Op::JmpIfFalse(else_start);
            }
            self.compile_block(else_body, ops)?;
        }

        let exit = ops.len();
        ops.push(Op::Nop);

        if let Some(jump) = jump_to_next {
            ops[jump] = Op::JmpIfFalse(exit);
        }
        for jump in exit_jumps {
            ops[jump] = Op::Jmp(exit);
        }

        Ok(())
    }

    fn compile_assign(&mut self, assign: &AssignStmt, ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        let (base, rest) = assign
            .target
            .split_first()
            .ok_or(CodegenError::EmptyPath)?;
        let slot = self.lookup(&base.name)?;

        let Some((last, middle)) = rest.split_last() else {
            match &base.subscript {
                None => {
                    self.compile_expr(&assign.value, ops)?;
                    ops.push(Op::Store(slot));
                }
                Some(subscript) => {
                    ops.push(Op::Load(slot));
                    self.compile_subscript_set(subscript, &assign.value, ops)?;
                }
            }
            return Ok(());
        };

        ops.push(Op::Load(slot));
        self.compile_subscript_get(base.subscript.as_ref(), ops)?;
        for segment in middle {
            ops.push(Op::GetField(segment.name.clone()));
            self.compile_subscript_get(segment.subscript.as_ref(), ops)?;
        }

        match &last.subscript {
            Some(subscript) => {
                ops.push(Op::GetField(last.name.clone()));
                self.compile_subscript_set(subscript, &assign.value, ops)?;
            }
            None => {
                self.compile_expr(&assign.value, ops)?;
                ops.push(Op::SetField(last.name.clone()));
            }
        }

        Ok(())
    }

    /// Index expressions, row before column for 2D.
    fn compile_indices(&mut self, subscript: &Subscript, ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        match subscript {
            Subscript::One(index) => self.compile_expr(index, ops),
            Subscript::Two(row, column) => {
                self.compile_expr(row, ops)?;
                self.compile_expr(column, ops)
            }
        }
    }

    fn compile_subscript_get(
        &mut self,
        subscript: Option<&Subscript>,
        ops: &mut Vec<Op>,
    ) -> Result<(), CodegenError> {
        let Some(subscript) = subscript else {
            return Ok(());
        };
        self.compile_indices(subscript, ops)?;
        ops.push(match subscript {
            Subscript::One(_) => Op::GetIndex,
            Subscript::Two(..) => Op::GetIndex2D,
        });
        Ok(())
    }

    fn compile_subscript_set(
        &mut self,
        subscript: &Subscript,
        value: &Expr,
        ops: &mut Vec<Op>,
    ) -> Result<(), CodegenError> {
        self.compile_indices(subscript, ops)?;
        self.compile_expr(value, ops)?;
        ops.push(match subscript {
            Subscript::One(_) => Op::SetIndex,
            Subscript::Two(..) => Op::SetIndex2D,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr, ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        match expr {
            Expr::Literal(literal) => ops.push(Op::Push(literal_value(literal))),
            Expr::Path(path) => self.compile_path_read(path, ops)?,
            Expr::Call(call) => self.compile_call(call, ops)?,
            Expr::NewArray { size, .. } => match size {
                Subscript::One(length) => {
                    self.compile_expr(length, ops)?;
                    ops.push(Op::Push(Value::Null));
                    ops.push(Op::AllocArray);
                }
                Subscript::Two(rows, columns) => {
                    self.compile_expr(columns, ops)?;
                    self.compile_expr(rows, ops)?;
                    ops.push(Op::Push(Value::Null));
                    ops.push(Op::AllocArray2D);
                }
            },
            Expr::NewStruct { name } => {
                let fields = self
                    .struct_layouts
                    .get(name)
                    .ok_or_else(|| CodegenError::UnknownStruct(name.clone()))?;
                ops.push(Op::AllocStruct);
                for field in fields {
                    ops.push(Op::Dup);
                    ops.push(Op::AddField(field.clone()));
                    ops.push(Op::Dup);
                    ops.push(Op::Push(Value::Null));
                    ops.push(Op::SetField(field.clone()));
                }
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left, ops)?;
                self.compile_expr(right, ops)?;
                ops.push(binary_op(*op));
            }
            Expr::Not(operand) => {
                self.compile_expr(operand, ops)?;
                ops.push(Op::Not);
            }
        }
        Ok(())
    }

    fn compile_path_read(&mut self, path: &[VarRef], ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        let (base, rest) = path.split_first().ok_or(CodegenError::EmptyPath)?;
        ops.push(Op::Load(self.lookup(&base.name)?));
        self.compile_subscript_get(base.subscript.as_ref(), ops)?;
        for segment in rest {
            ops.push(Op::GetField(segment.name.clone()));
            self.compile_subscript_get(segment.subscript.as_ref(), ops)?;
        }
        Ok(())
    }

    fn compile_call(&mut self, call: &CallExpr, ops: &mut Vec<Op>) -> Result<(), CodegenError> {
        for arg in &call.args {
            self.compile_expr(arg, ops)?;
        }
        match Builtin::from_name(&call.name) {
            Some(builtin) => ops.push(builtin.op()),
            None => ops.push(Op::Call(call.name.clone())),
        }
        Ok(())
    }
}

fn binary_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Eq => Op::Eq,
        BinaryOp::Ne => Op::Ne,
        BinaryOp::Lt => Op::Lt,
        BinaryOp::Le => Op::Le,
        BinaryOp::Gt => Op::Gt,
        BinaryOp::Ge => Op::Ge,
        BinaryOp::And => Op::And,
        BinaryOp::Or => Op::Or,
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(n) => Value::Int(*n),
        Literal::Double(f) => Value::Double(*f),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Str(s) | Literal::Char(s) => Value::Str(unescape(s)),
        Literal::Null => Value::Null,
    }
}

/// Resolve the `\n`, `\t` and `\'` escapes the lexer leaves in place.
fn unescape(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\'", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{DataType, StructDef, VarDef};

    fn int_type() -> DataType {
        DataType::new("int")
    }

    fn main_with(body: Vec<Statement>) -> Program {
        Program {
            structs: vec![],
            functions: vec![FnDef {
                name: "main".to_string(),
                return_type: DataType::void(),
                params: vec![],
                body,
            }],
        }
    }

    fn compile(program: &Program) -> Result<Chunk, CodegenError> {
        Codegen::new().compile(program)
    }

    fn main_code(body: Vec<Statement>) -> Vec<Op> {
        let chunk = compile(&main_with(body)).unwrap();
        chunk.get("main").unwrap().code.clone()
    }

    fn push_int(n: i64) -> Op {
        Op::Push(Value::Int(n))
    }

    /// Every jump must land inside its function.
    fn assert_jumps_in_range(code: &[Op]) {
        for op in code {
            if let Op::Jmp(t) | Op::JmpIfFalse(t) = op {
                assert!(*t < code.len(), "{} escapes", op);
            }
        }
    }

    #[test]
    fn test_declare_and_print() {
        let code = main_code(vec![
            Statement::decl(
                "x",
                int_type(),
                Expr::binary(BinaryOp::Add, Expr::int(3), Expr::int(4)),
            ),
            Statement::print(Expr::var("x")),
        ]);
        assert_eq!(
            code,
            vec![
                push_int(3),
                push_int(4),
                Op::Add,
                Op::Store(0),
                Op::Load(0),
                Op::Write,
                Op::Push(Value::Null),
                Op::Ret,
            ]
        );
    }

    #[test]
    fn test_explicit_return_skips_epilogue() {
        let code = main_code(vec![Statement::Return(Expr::int(1))]);
        assert_eq!(code, vec![push_int(1), Op::Ret]);
    }

    #[test]
    fn test_params_prologue() {
        let program = Program {
            structs: vec![],
            functions: vec![FnDef {
                name: "f".to_string(),
                return_type: int_type(),
                params: vec![VarDef::new("a", int_type()), VarDef::new("b", int_type())],
                body: vec![Statement::Return(Expr::var("b"))],
            }],
        };
        let chunk = compile(&program).unwrap();
        let f = chunk.get("f").unwrap();
        assert_eq!(f.arity, 2);
        assert_eq!(f.code, vec![Op::Store(0), Op::Store(1), Op::Load(1), Op::Ret]);
    }

    #[test]
    fn test_call_statement_pops_result() {
        let code = main_code(vec![
            Statement::call("f", vec![Expr::int(1)]),
            Statement::call("input", vec![]),
            Statement::print(Expr::str("x")),
        ]);
        assert_eq!(
            &code[..7],
            &[
                push_int(1),
                Op::Call("f".to_string()),
                Op::Pop,
                Op::Read,
                Op::Pop,
                Op::Push(Value::from("x")),
                Op::Write,
            ]
        );
    }

    #[test]
    fn test_builtins() {
        let code = main_code(vec![Statement::decl(
            "n",
            int_type(),
            Expr::call(ARRAY_LENGTH, vec![Expr::null()]),
        )]);
        assert_eq!(code[1], Op::ArrayLen);
        let code = main_code(vec![Statement::decl(
            "c",
            DataType::new("char"),
            Expr::call("get", vec![Expr::int(0), Expr::str("ab")]),
        )]);
        assert_eq!(code[..3], [push_int(0), Op::Push(Value::from("ab")), Op::GetChar]);
    }

    #[test]
    fn test_while_lowering() {
        let code = main_code(vec![Statement::While {
            condition: Expr::bool(true),
            body: vec![],
        }]);
        assert_eq!(
            code,
            vec![
                Op::Push(Value::Bool(true)),
                Op::JmpIfFalse(3),
                Op::Jmp(0),
                Op::Nop,
                Op::Push(Value::Null),
                Op::Ret,
            ]
        );
    }

    #[test]
    fn test_if_elseif_without_else_patches_every_jump() {
        let code = main_code(vec![Statement::If {
            if_part: BasicIf {
                condition: Expr::bool(false),
                body: vec![Statement::print(Expr::int(1))],
            },
            else_ifs: vec![BasicIf {
                condition: Expr::bool(false),
                body: vec![Statement::print(Expr::int(2))],
            }],
            else_body: vec![],
        }]);
        // 0 PUSH 1 JMPF 2 PUSH 3 WRITE 4 JMP | 5 PUSH 6 JMPF 7 PUSH 8 WRITE 9 JMP | 10 NOP
        assert_eq!(code[1], Op::JmpIfFalse(5));
        assert_eq!(code[4], Op::Jmp(10));
        assert_eq!(code[6], Op::JmpIfFalse(10));
        assert_eq!(code[9], Op::Jmp(10));
        assert_eq!(code[10], Op::Nop);
        assert!(!code.contains(&Op::JmpIfFalse(0)));
        assert_jumps_in_range(&code);
    }

    #[test]
    fn test_if_else() {
        let code = main_code(vec![Statement::If {
            if_part: BasicIf {
                condition: Expr::bool(true),
                body: vec![],
            },
            else_ifs: vec![],
            else_body: vec![Statement::print(Expr::int(2))],
        }]);
        // 0 PUSH 1 JMPF 2 JMP | 3 PUSH 4 WRITE | 5 NOP
        assert_eq!(code[1], Op::JmpIfFalse(3));
        assert_eq!(code[2], Op::Jmp(5));
        assert_eq!(code[5], Op::Nop);
        assert_jumps_in_range(&code);
    }

    #[test]
    fn test_for_lowering() {
        let i = || Expr::var("i");
        let code = main_code(vec![Statement::For {
            init: VarDeclStmt {
                var: VarDef::new("i", int_type()),
                init: Expr::int(0),
            },
            condition: Expr::binary(BinaryOp::Lt, i(), Expr::int(3)),
            step: AssignStmt {
                target: vec![VarRef::new("i")],
                value: Expr::binary(BinaryOp::Add, i(), Expr::int(1)),
            },
            body: vec![Statement::print(i())],
        }]);
        assert_eq!(
            code[..14],
            [
                push_int(0),
                Op::Store(0),
                Op::Load(0),
                push_int(3),
                Op::Lt,
                Op::JmpIfFalse(13),
                Op::Load(0),
                Op::Write,
                Op::Load(0),
                push_int(1),
                Op::Add,
                Op::Store(0),
                Op::Jmp(2),
                Op::Nop,
            ]
        );
    }

    #[test]
    fn test_slots_not_reused_across_sibling_scopes() {
        let branch = |name: &str| BasicIf {
            condition: Expr::bool(true),
            body: vec![Statement::decl(name, int_type(), Expr::int(1))],
        };
        let code = main_code(vec![
            Statement::If {
                if_part: branch("a"),
                else_ifs: vec![],
                else_body: vec![],
            },
            Statement::If {
                if_part: branch("b"),
                else_ifs: vec![],
                else_body: vec![],
            },
            Statement::decl("c", int_type(), Expr::int(2)),
        ]);
        let stores: Vec<_> = code
            .iter()
            .filter_map(|op| match op {
                Op::Store(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec![0, 1, 2]);
    }

    #[test]
    fn test_shadowing_initializer_reads_outer() {
        let code = main_code(vec![
            Statement::decl("x", int_type(), Expr::int(1)),
            Statement::While {
                condition: Expr::bool(false),
                body: vec![Statement::decl("x", int_type(), Expr::var("x"))],
            },
        ]);
        // inner `x = x` loads slot 0, stores slot 1
        assert_eq!(code[4..6], [Op::Load(0), Op::Store(1)]);
    }

    #[test]
    fn test_out_of_scope_variable() {
        let err = compile(&main_with(vec![
            Statement::While {
                condition: Expr::bool(false),
                body: vec![Statement::decl("y", int_type(), Expr::int(1))],
            },
            Statement::print(Expr::var("y")),
        ]))
        .unwrap_err();
        assert_eq!(err, CodegenError::UnknownVariable("y".to_string()));
    }

    #[test]
    fn test_new_array_2d_pushes_columns_first() {
        let code = main_code(vec![Statement::decl(
            "xs",
            DataType::array_of("int"),
            Expr::new_array_2d("int", Expr::int(2), Expr::int(4)),
        )]);
        assert_eq!(
            code[..4],
            [push_int(4), push_int(2), Op::Push(Value::Null), Op::AllocArray2D]
        );
    }

    #[test]
    fn test_new_struct_initializes_fields() {
        let mut program = main_with(vec![Statement::decl(
            "p",
            DataType::new("Point"),
            Expr::NewStruct {
                name: "Point".to_string(),
            },
        )]);
        program.structs.push(StructDef {
            name: "Point".to_string(),
            fields: vec![VarDef::new("x", int_type()), VarDef::new("y", int_type())],
        });
        let mut codegen = Codegen::new();
        let chunk = codegen.compile(&program).unwrap();
        assert_eq!(
            codegen.struct_fields("Point"),
            Some(&["x".to_string(), "y".to_string()][..])
        );
        let code = &chunk.get("main").unwrap().code;
        assert_eq!(
            code[..6],
            [
                Op::AllocStruct,
                Op::Dup,
                Op::AddField("x".to_string()),
                Op::Dup,
                Op::Push(Value::Null),
                Op::SetField("x".to_string()),
            ]
        );
        assert_eq!(code[10], Op::SetField("y".to_string()));
    }

    #[test]
    fn test_unknown_struct() {
        let err = compile(&main_with(vec![Statement::decl(
            "p",
            DataType::new("Nope"),
            Expr::NewStruct {
                name: "Nope".to_string(),
            },
        )]))
        .unwrap_err();
        assert_eq!(err, CodegenError::UnknownStruct("Nope".to_string()));
    }

    #[test]
    fn test_duplicate_function() {
        let mut program = main_with(vec![]);
        program.functions.push(program.functions[0].clone());
        assert_eq!(
            compile(&program).unwrap_err(),
            CodegenError::DuplicateFunction("main".to_string())
        );
    }

    #[test]
    fn test_2d_assign_through_field_pushes_row_then_column() {
        let code = main_code(vec![
            Statement::decl("g", DataType::new("Grid"), Expr::null()),
            Statement::assign(
                vec![
                    VarRef::new("g"),
                    VarRef::indexed_2d("cells", Expr::int(1), Expr::int(2)),
                ],
                Expr::int(9),
            ),
        ]);
        assert_eq!(
            code[2..8],
            [
                Op::Load(0),
                Op::GetField("cells".to_string()),
                push_int(1),
                push_int(2),
                push_int(9),
                Op::SetIndex2D,
            ]
        );
    }

    #[test]
    fn test_path_read_with_middle_subscript() {
        let code = main_code(vec![
            Statement::decl("xs", DataType::array_of("Node"), Expr::null()),
            Statement::print(Expr::Path(vec![
                VarRef::indexed("xs", Expr::int(0)),
                VarRef::new("next"),
                VarRef::new("val"),
            ])),
        ]);
        assert_eq!(
            code[2..8],
            [
                Op::Load(0),
                push_int(0),
                Op::GetIndex,
                Op::GetField("next".to_string()),
                Op::GetField("val".to_string()),
                Op::Write,
            ]
        );
    }

    #[test]
    fn test_field_assign() {
        let code = main_code(vec![
            Statement::decl("p", DataType::new("P"), Expr::null()),
            Statement::assign(vec![VarRef::new("p"), VarRef::new("x")], Expr::int(5)),
        ]);
        assert_eq!(
            code[2..5],
            [Op::Load(0), push_int(5), Op::SetField("x".to_string())]
        );
    }

    #[test]
    fn test_string_escapes() {
        let code = main_code(vec![Statement::print(Expr::str("a\\nb\\t\\'c"))]);
        assert_eq!(code[0], Op::Push(Value::from("a\nb\t'c")));
    }
}
