use std::io::Write;

use log::{debug, log_enabled, trace};

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::vm::chunk::{Chunk, OpCode};
use crate::vm::stack::Stack;
use crate::vm::table::Table;
use crate::vm::value::Value;

/// Read position inside the chunk being executed.
struct Cursor<'c> {
    chunk: &'c Chunk,
    ip: usize,
    /// Offset of the instruction currently executing.
    start: usize,
}

impl<'c> Cursor<'c> {
    fn new(chunk: &'c Chunk) -> Self {
        Self {
            chunk,
            ip: 0,
            start: 0,
        }
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeErrorKind> {
        let byte = self
            .chunk
            .code
            .get(self.ip)
            .copied()
            .ok_or(RuntimeErrorKind::TruncatedInstruction)?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<usize, RuntimeErrorKind> {
        let value = self
            .chunk
            .read_u16(self.ip)
            .ok_or(RuntimeErrorKind::TruncatedInstruction)?;
        self.ip += 2;
        Ok(usize::from(value))
    }

    fn read_constant(&mut self) -> Result<&'c Value, RuntimeErrorKind> {
        let idx = self.read_byte()?;
        self.chunk
            .constants
            .get(usize::from(idx))
            .ok_or(RuntimeErrorKind::MissingConstant(idx))
    }

    fn read_name(&mut self) -> Result<&'c str, RuntimeErrorKind> {
        match self.read_constant()? {
            Value::Str(name) => Ok(name.as_str()),
            _ => Err(RuntimeErrorKind::NameNotString),
        }
    }

    fn jump_forward(&mut self, offset: usize) -> Result<(), RuntimeErrorKind> {
        let target = self.ip + offset;
        if target > self.chunk.code.len() {
            return Err(RuntimeErrorKind::JumpOutOfRange(self.start));
        }
        self.ip = target;
        Ok(())
    }

    fn jump_back(&mut self, offset: usize) -> Result<(), RuntimeErrorKind> {
        self.ip = self
            .ip
            .checked_sub(offset)
            .ok_or(RuntimeErrorKind::JumpOutOfRange(self.start))?;
        Ok(())
    }
}

/// The bytecode interpreter.
///
/// Globals live as long as the `Vm`, so consecutive [`Vm::run`] calls (one
/// per REPL line) see each other's definitions.
pub struct Vm {
    stack: Stack,
    globals: Table,
    writer: Box<dyn Write>,
    output: Vec<String>,
    capture: bool,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A VM printing to stdout.
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        Self {
            stack: Stack::new(),
            globals: Table::new(),
            writer,
            output: Vec::new(),
            capture: false,
        }
    }

    /// A VM that records printed lines instead of writing them anywhere;
    /// read them back with [`Vm::output`].
    pub fn capturing() -> Self {
        let mut vm = Self::with_writer(Box::new(std::io::sink()));
        vm.capture = true;
        vm
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn globals(&self) -> &Table {
        &self.globals
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Execute `chunk` to completion. On failure the stack is emptied and
    /// the error carries the source line of the faulting instruction.
    pub fn run(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        debug!(
            "running chunk: {} bytes, {} constants",
            chunk.code.len(),
            chunk.constants.len()
        );
        let mut cursor = Cursor::new(chunk);
        match self.execute(&mut cursor) {
            Ok(()) => Ok(()),
            Err(kind) => {
                self.stack.reset();
                Err(RuntimeError::new(kind, chunk.line_at(cursor.start)))
            }
        }
    }

    fn execute(&mut self, cursor: &mut Cursor<'_>) -> Result<(), RuntimeErrorKind> {
        loop {
            cursor.start = cursor.ip;
            // Running off the end is an implicit return.
            if cursor.ip >= cursor.chunk.code.len() {
                return Ok(());
            }
            let byte = cursor.read_byte()?;
            let op = OpCode::try_from(byte).map_err(RuntimeErrorKind::UnknownOpcode)?;

            if log_enabled!(log::Level::Trace) {
                trace!("{:04} {:<16} {}", cursor.start, op.as_ref(), self.stack);
            }

            match op {
                OpCode::Constant => {
                    let value = cursor.read_constant()?.clone();
                    self.stack.push(value)?;
                }
                OpCode::Nil => self.stack.push(Value::Nil)?,
                OpCode::True => self.stack.push(Value::Bool(true))?,
                OpCode::False => self.stack.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.stack.pop()?;
                }
                OpCode::GetLocal => {
                    let slot = usize::from(cursor.read_byte()?);
                    let value = self.stack.get(slot)?.clone();
                    self.stack.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = usize::from(cursor.read_byte()?);
                    let value = self.stack.peek(0)?.clone();
                    self.stack.set(slot, value)?;
                }
                OpCode::GetGlobal => {
                    let name = cursor.read_name()?;
                    let value = self
                        .globals
                        .get(name)
                        .cloned()
                        .ok_or_else(|| RuntimeErrorKind::UndefinedVariable(name.to_string()))?;
                    self.stack.push(value)?;
                }
                OpCode::DefineGlobal => {
                    let name = cursor.read_name()?;
                    let value = self.stack.peek(0)?.clone();
                    self.globals.set(name, value);
                    self.stack.pop()?;
                }
                OpCode::SetGlobal => {
                    let name = cursor.read_name()?;
                    let value = self.stack.peek(0)?.clone();
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        return Err(RuntimeErrorKind::UndefinedVariable(name.to_string()));
                    }
                }
                OpCode::Equal => {
                    let b = self.stack.pop()?;
                    let a = self.stack.pop()?;
                    self.stack.push(Value::Bool(a == b))?;
                }
                OpCode::Greater => {
                    let (a, b) = self.pop_integers()?;
                    self.stack.push(Value::Bool(a > b))?;
                }
                OpCode::Less => {
                    let (a, b) = self.pop_integers()?;
                    self.stack.push(Value::Bool(a < b))?;
                }
                OpCode::Add => {
                    let (a, b) = self.pop_integers()?;
                    self.stack.push(Value::I64(a.wrapping_add(b)))?;
                }
                OpCode::Subtract => {
                    let (a, b) = self.pop_integers()?;
                    self.stack.push(Value::I64(a.wrapping_sub(b)))?;
                }
                OpCode::Multiply => {
                    let (a, b) = self.pop_integers()?;
                    self.stack.push(Value::I64(a.wrapping_mul(b)))?;
                }
                OpCode::Divide => {
                    let (a, b) = self.pop_integers()?;
                    if b == 0 {
                        return Err(RuntimeErrorKind::DivisionByZero);
                    }
                    let quotient = a
                        .checked_div(b)
                        .ok_or(RuntimeErrorKind::IntegerOverflow)?;
                    self.stack.push(Value::I64(quotient))?;
                }
                OpCode::Not => {
                    let value = self.stack.pop()?;
                    self.stack.push(Value::Bool(value.is_falsey()))?;
                }
                OpCode::Negate => {
                    let n = match self.stack.peek(0)? {
                        Value::I64(n) => *n,
                        _ => return Err(RuntimeErrorKind::OperandMustBeNumber),
                    };
                    self.stack.pop()?;
                    self.stack.push(Value::I64(n.wrapping_neg()))?;
                }
                OpCode::Print => {
                    let text = self.stack.pop()?.to_string();
                    writeln!(self.writer, "{text}")?;
                    if self.capture {
                        self.output.push(text);
                    }
                }
                OpCode::Jump => {
                    let offset = cursor.read_u16()?;
                    cursor.jump_forward(offset)?;
                }
                OpCode::JumpIfFalse => {
                    let offset = cursor.read_u16()?;
                    if self.stack.peek(0)?.is_falsey() {
                        cursor.jump_forward(offset)?;
                    }
                }
                OpCode::Loop => {
                    let offset = cursor.read_u16()?;
                    cursor.jump_back(offset)?;
                }
                OpCode::Return => return Ok(()),
            }
        }
    }

    /// Pop the two `i64` operands of a binary instruction. The operands
    /// stay on the stack when either has another type.
    fn pop_integers(&mut self) -> Result<(i64, i64), RuntimeErrorKind> {
        let operands = match (self.stack.peek(1)?, self.stack.peek(0)?) {
            (Value::I64(a), Value::I64(b)) => (*a, *b),
            _ => return Err(RuntimeErrorKind::OperandsMustBeNumbers),
        };
        self.stack.pop()?;
        self.stack.pop()?;
        Ok(operands)
    }
}
