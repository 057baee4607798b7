use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use crate::config::RuntimeConfig;
use crate::vm::{Chunk, Fault, FaultKind, FaultSite, Function, Heap, ObjectId, Op, Value, VmError};

/// A call frame for the VM.
#[derive(Debug)]
struct Frame<'a> {
    function: &'a Function,
    /// Program counter
    pc: usize,
    /// Operand stack
    stack: Vec<Value>,
    /// Local variable slots
    locals: Vec<Value>,
}

impl<'a> Frame<'a> {
    fn new(function: &'a Function, stack: Vec<Value>) -> Self {
        Self {
            function,
            pc: 0,
            stack,
            locals: Vec::new(),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, Fault> {
        self.stack.pop().ok_or_else(Fault::stack_underflow)
    }

    /// Pop a value that must not be null.
    fn pop_non_null(&mut self) -> Result<Value, Fault> {
        match self.pop()? {
            Value::Null => Err(Fault::null_reference()),
            value => Ok(value),
        }
    }

    fn pop_int(&mut self) -> Result<i64, Fault> {
        let value = self.pop_non_null()?;
        value.as_int().ok_or_else(|| expected("int", &value))
    }

    fn pop_bool(&mut self) -> Result<bool, Fault> {
        let value = self.pop_non_null()?;
        value.as_bool().ok_or_else(|| expected("bool", &value))
    }

    fn pop_str(&mut self) -> Result<String, Fault> {
        match self.pop_non_null()? {
            Value::Str(s) => Ok(s),
            value => Err(expected("string", &value)),
        }
    }

    fn pop_object(&mut self) -> Result<ObjectId, Fault> {
        let value = self.pop_non_null()?;
        value.as_object().ok_or_else(|| expected("object", &value))
    }
}

fn expected(what: &str, found: &Value) -> Fault {
    Fault::operand(format!("expected {}, found {}", what, found.type_name()))
}

/// What the dispatch loop does after an instruction.
enum ControlFlow<'a> {
    Continue,
    Call(Frame<'a>),
    Return(Value),
}

/// The MyPL virtual machine.
pub struct VM {
    heap: Heap,
    /// Output stream for WRITE
    output: Box<dyn Write>,
    /// Input stream for READ
    input: Box<dyn BufRead>,
    trace: bool,
    profile_opcodes: bool,
    /// Executions per mnemonic, filled when profiling
    opcode_counts: HashMap<&'static str, u64>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    pub fn new() -> Self {
        Self::with_io(Box::new(io::stdout()), Box::new(io::BufReader::new(io::stdin())))
    }

    /// Create a VM with a custom output stream.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self::with_io(output, Box::new(io::empty()))
    }

    /// Create a VM with custom output and input streams.
    pub fn with_io(output: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        Self {
            heap: Heap::new(),
            output,
            input,
            trace: false,
            profile_opcodes: false,
            opcode_counts: HashMap::new(),
        }
    }

    /// Apply diagnostic settings.
    pub fn set_config(&mut self, config: &RuntimeConfig) {
        self.trace = config.trace;
        self.profile_opcodes = config.profile_opcodes;
    }

    /// Get immutable reference to the heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Opcode execution counts, most frequent first. Empty unless profiling.
    pub fn opcode_counts(&self) -> Vec<(&'static str, u64)> {
        let mut counts: Vec<_> = self.opcode_counts.iter().map(|(k, v)| (*k, *v)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        counts
    }

    /// Run a chunk starting at its `main` function until the call stack empties.
    pub fn run(&mut self, chunk: &Chunk) -> Result<(), VmError> {
        let main = chunk
            .get("main")
            .filter(|f| f.arity == 0)
            .ok_or_else(VmError::missing_entry_point)?;

        let mut frames = vec![Frame::new(main, Vec::new())];

        loop {
            let depth = frames.len();
            let Some(frame) = frames.last_mut() else {
                break;
            };
            let function = frame.function;
            let pc = frame.pc;
            let Some(op) = function.code.get(pc) else {
                // Ran past the last instruction
                break;
            };
            frame.pc += 1;

            if self.trace {
                let top = frame
                    .stack
                    .last()
                    .map(|v| format!("{:?}", v))
                    .unwrap_or_else(|| "-".to_string());
                eprintln!(
                    "[trace] {}:{} {} top={} depth={}",
                    function.name, pc, op, top, depth
                );
            }
            if self.profile_opcodes {
                *self.opcode_counts.entry(op.mnemonic()).or_insert(0) += 1;
            }

            let control = self.execute_op(op, frame, chunk).map_err(|fault| {
                fault.at(FaultSite {
                    function: function.name.clone(),
                    pc,
                    instruction: op.to_string(),
                })
            })?;

            match control {
                ControlFlow::Continue => {}
                ControlFlow::Call(callee) => frames.push(callee),
                ControlFlow::Return(value) => {
                    frames.pop();
                    if let Some(caller) = frames.last_mut() {
                        caller.push(value);
                    }
                }
            }
        }

        self.output
            .flush()
            .map_err(|e| Fault::new(FaultKind::Io, format!("failed to flush output: {}", e)))?;

        if self.profile_opcodes {
            for (mnemonic, count) in self.opcode_counts() {
                eprintln!("[profile] {:<8} {}", mnemonic, count);
            }
        }

        Ok(())
    }

    fn execute_op<'a>(
        &mut self,
        op: &Op,
        frame: &mut Frame<'a>,
        chunk: &'a Chunk,
    ) -> Result<ControlFlow<'a>, Fault> {
        match op {
            // ========================================
            // Literals and Variables
            // ========================================
            Op::Push(value) => frame.push(value.clone()),
            Op::Pop => {
                frame.pop()?;
            }
            Op::Load(slot) => {
                let value = frame
                    .locals
                    .get(*slot)
                    .cloned()
                    .ok_or_else(|| Fault::operand(format!("slot {} was never stored", slot)))?;
                frame.push(value);
            }
            Op::Store(slot) => {
                let value = frame.pop()?;
                if *slot >= frame.locals.len() {
                    frame.locals.resize(*slot + 1, Value::Null);
                }
                frame.locals[*slot] = value;
            }

            // ========================================
            // Arithmetic / Logic
            // ========================================
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let right = frame.pop_non_null()?;
                let left = frame.pop_non_null()?;
                frame.push(arithmetic(op, left, right)?);
            }
            Op::And => {
                let right = frame.pop_bool()?;
                let left = frame.pop_bool()?;
                frame.push(Value::Bool(left && right));
            }
            Op::Or => {
                let right = frame.pop_bool()?;
                let left = frame.pop_bool()?;
                frame.push(Value::Bool(left || right));
            }
            Op::Not => {
                let value = frame.pop_bool()?;
                frame.push(Value::Bool(!value));
            }

            // ========================================
            // Comparison
            // ========================================
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                let right = frame.pop_non_null()?;
                let left = frame.pop_non_null()?;
                let ordering = compare(&left, &right)?;
                let result = match op {
                    Op::Lt => ordering.is_some_and(|o| o.is_lt()),
                    Op::Le => ordering.is_some_and(|o| o.is_le()),
                    Op::Gt => ordering.is_some_and(|o| o.is_gt()),
                    _ => ordering.is_some_and(|o| o.is_ge()),
                };
                frame.push(Value::Bool(result));
            }
            Op::Eq => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                frame.push(Value::Bool(left == right));
            }
            Op::Ne => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                frame.push(Value::Bool(left != right));
            }

            // ========================================
            // Control Flow
            // ========================================
            Op::Jmp(target) => frame.pc = *target,
            Op::JmpIfFalse(target) => {
                if !frame.pop_bool()? {
                    frame.pc = *target;
                }
            }
            Op::Call(name) => {
                let callee = chunk.get(name).ok_or_else(|| {
                    Fault::new(
                        FaultKind::UnknownFunction,
                        format!("undefined function '{}'", name),
                    )
                })?;
                let split = frame.stack.len().checked_sub(callee.arity).ok_or_else(|| {
                    Fault::operand(format!(
                        "function '{}' expects {} arguments, only {} on the stack",
                        name,
                        callee.arity,
                        frame.stack.len()
                    ))
                })?;
                // First argument ends up on top, ready for the STORE(0) prologue
                let mut args = frame.stack.split_off(split);
                args.reverse();
                return Ok(ControlFlow::Call(Frame::new(callee, args)));
            }
            Op::Ret => {
                let value = frame.stack.pop().unwrap_or(Value::Null);
                return Ok(ControlFlow::Return(value));
            }

            // ========================================
            // Builtins
            // ========================================
            Op::Write => {
                let value = frame.pop()?;
                write!(self.output, "{}", value).map_err(|e| {
                    Fault::new(FaultKind::Io, format!("failed to write output: {}", e))
                })?;
            }
            Op::Read => {
                let mut line = String::new();
                self.input.read_line(&mut line).map_err(|e| {
                    Fault::new(FaultKind::Io, format!("failed to read input: {}", e))
                })?;
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                frame.push(Value::Str(line));
            }
            Op::StrLen => {
                let s = frame.pop_str()?;
                frame.push(Value::Int(s.chars().count() as i64));
            }
            Op::ArrayLen => {
                let id = frame.pop_object()?;
                let len = self.heap.array_len(id)?;
                frame.push(Value::Int(len as i64));
            }
            Op::GetChar => {
                let s = frame.pop_str()?;
                let index = frame.pop_int()?;
                let c = usize::try_from(index)
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .ok_or_else(|| Fault::out_of_bounds("out-of-bounds string index"))?;
                frame.push(Value::Str(c.to_string()));
            }
            Op::ToInt => {
                let value = match frame.pop_non_null()? {
                    Value::Int(n) => n,
                    Value::Double(f) => f as i64,
                    Value::Str(s) => parse_int_prefix(&s)?,
                    other => return Err(expected("double or string", &other)),
                };
                frame.push(Value::Int(value));
            }
            Op::ToDouble => {
                let value = match frame.pop_non_null()? {
                    Value::Int(n) => n as f64,
                    Value::Double(f) => f,
                    Value::Str(s) => parse_double_prefix(&s)?,
                    other => return Err(expected("int or string", &other)),
                };
                frame.push(Value::Double(value));
            }
            Op::ToStr => {
                let value = frame.pop_non_null()?;
                if let Value::Object(_) = value {
                    return Err(expected("int, double, bool or char", &value));
                }
                frame.push(Value::Str(value.to_string()));
            }
            Op::Concat => {
                let right = frame.pop_str()?;
                let left = frame.pop_str()?;
                frame.push(Value::Str(left + &right));
            }

            // ========================================
            // Heap Operations
            // ========================================
            Op::AllocStruct => {
                let id = self.heap.alloc_struct();
                frame.push(Value::Object(id));
            }
            Op::AddField(field) => {
                let id = frame.pop_object()?;
                self.heap.add_field(id, field)?;
            }
            Op::SetField(field) => {
                let value = frame.pop()?;
                let id = frame.pop_object()?;
                self.heap.set_field(id, field, value)?;
            }
            Op::GetField(field) => {
                let id = frame.pop_object()?;
                let value = self.heap.get_field(id, field)?;
                frame.push(value);
            }
            Op::AllocArray => {
                let fill = frame.pop()?;
                let length = frame.pop_int()?;
                let id = self.heap.alloc_array(length, fill)?;
                frame.push(Value::Object(id));
            }
            Op::GetIndex => {
                let index = frame.pop_int()?;
                let id = frame.pop_object()?;
                let value = self.heap.get_index(id, index)?;
                frame.push(value);
            }
            Op::SetIndex => {
                let value = frame.pop()?;
                let index = frame.pop_int()?;
                let id = frame.pop_object()?;
                self.heap.set_index(id, index, value)?;
            }
            Op::AllocArray2D => {
                let fill = frame.pop()?;
                let rows = frame.pop_int()?;
                let columns = frame.pop_int()?;
                let id = self.heap.alloc_array_2d(rows, columns, fill)?;
                frame.push(Value::Object(id));
            }
            Op::GetIndex2D => {
                let column = frame.pop_int()?;
                let row = frame.pop_int()?;
                let id = frame.pop_object()?;
                let value = self.heap.get_index_2d(id, row, column)?;
                frame.push(value);
            }
            Op::SetIndex2D => {
                let value = frame.pop()?;
                let column = frame.pop_int()?;
                let row = frame.pop_int()?;
                let id = frame.pop_object()?;
                self.heap.set_index_2d(id, row, column, value)?;
            }

            // ========================================
            // Special
            // ========================================
            Op::Dup => {
                let value = frame.stack.last().cloned().ok_or_else(Fault::stack_underflow)?;
                frame.push(value);
            }
            Op::Nop => {}
        }

        Ok(ControlFlow::Continue)
    }
}

/// ADD, SUB, MUL and DIV over two non-null operands of the same numeric variant.
fn arithmetic(op: &Op, left: Value, right: Value) -> Result<Value, Fault> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                Op::Add => a.wrapping_add(b),
                Op::Sub => a.wrapping_sub(b),
                Op::Mul => a.wrapping_mul(b),
                _ => {
                    if b == 0 {
                        return Err(Fault::new(FaultKind::DivisionByZero, "division by zero"));
                    }
                    a.wrapping_div(b)
                }
            };
            Ok(Value::Int(result))
        }
        (Value::Double(a), Value::Double(b)) => {
            let result = match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                _ => a / b,
            };
            Ok(Value::Double(result))
        }
        (left, right) => Err(Fault::operand(format!(
            "cannot apply {} to {} and {}",
            op.mnemonic(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Ordering of two non-null values of the same variant. `None` for unordered doubles.
fn compare(left: &Value, right: &Value) -> Result<Option<std::cmp::Ordering>, Fault> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Double(a), Value::Double(b)) => Ok(a.partial_cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        _ => Err(Fault::operand(format!(
            "cannot compare {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Length in bytes of an optional sign followed by ASCII digits.
fn digits_prefix(s: &str) -> (usize, usize) {
    let bytes = s.as_bytes();
    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let digits = bytes[sign..].iter().take_while(|b| b.is_ascii_digit()).count();
    (sign, digits)
}

fn parse_int_prefix(s: &str) -> Result<i64, Fault> {
    let (sign, digits) = digits_prefix(s);
    if digits == 0 {
        return Err(Fault::new(FaultKind::Conversion, "cannot convert string to int"));
    }
    s[..sign + digits]
        .parse()
        .map_err(|_| Fault::new(FaultKind::Conversion, "cannot convert string to int"))
}

/// Sign, digits, optional fraction and optional exponent. The exponent only
/// counts when at least one digit follows the `e`.
fn parse_double_prefix(s: &str) -> Result<f64, Fault> {
    let (sign, digits) = digits_prefix(s);
    if digits == 0 {
        return Err(Fault::new(FaultKind::Conversion, "cannot convert string to double"));
    }
    let bytes = s.as_bytes();
    let count_digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut end = sign + digits;
    if bytes.get(end) == Some(&b'.') {
        end += 1 + count_digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let exp_sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_digits = count_digits(end + 1 + exp_sign);
        if exp_digits > 0 {
            end += 1 + exp_sign + exp_digits;
        }
    }
    s[..end]
        .parse()
        .map_err(|_| Fault::new(FaultKind::Conversion, "cannot convert string to double"))
}
