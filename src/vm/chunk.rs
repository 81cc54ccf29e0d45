use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vm::value::Value;

/// A bytecode instruction. The discriminant is the byte in the code stream.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::AsRefStr,
    strum::FromRepr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum OpCode {
    Constant,
    Nil,
    True,
    False,
    Pop,
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Jump,
    JumpIfFalse,
    Loop,
    Return,
}

impl OpCode {
    /// Number of operand bytes following the opcode.
    pub fn operand_len(self) -> usize {
        match self {
            Self::Constant
            | Self::GetLocal
            | Self::SetLocal
            | Self::GetGlobal
            | Self::DefineGlobal
            | Self::SetGlobal => 1,
            Self::Jump | Self::JumpIfFalse | Self::Loop => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(byte)
    }
}

/// Largest constant pool a one-byte operand can address.
pub const MAX_CONSTANTS: usize = u8::MAX as usize + 1;

/// A chunk of bytecode: instructions + constant pool + line info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    pub lines: Vec<usize>,
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.code.push(op as u8);
        self.lines.push(line);
    }

    pub fn write_byte(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_u16(&mut self, value: u16, line: usize) {
        for byte in value.to_be_bytes() {
            self.write_byte(byte, line);
        }
    }

    /// Append a constant and return its index, or `None` once the pool
    /// already holds [`MAX_CONSTANTS`] entries.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        let index = u8::try_from(self.constants.len()).ok()?;
        self.constants.push(value);
        Some(index)
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let hi = *self.code.get(offset)?;
        let lo = *self.code.get(offset + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Source line of the instruction byte at `offset`, 0 when unknown.
    pub fn line_at(&self, offset: usize) -> usize {
        self.lines.get(offset).copied().unwrap_or(0)
    }
}

/// Leading bytes of a saved bytecode file.
pub const BYTECODE_MAGIC: &[u8; 4] = b"cmlb";

impl Chunk {
    /// Encode as a bytecode file: [`BYTECODE_MAGIC`] then the MessagePack
    /// encoded chunk.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = BYTECODE_MAGIC.to_vec();
        bytes.extend(rmp_serde::to_vec(self).context("encode chunk")?);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(body) = bytes.strip_prefix(BYTECODE_MAGIC.as_slice()) else {
            bail!("not a camel bytecode file (bad magic)");
        };
        rmp_serde::from_slice(body).context("decode chunk")
    }
}

/// Disassemble a chunk into human-readable text: the constant pool followed
/// by one line per instruction.
///
/// `source_name` is shown in the header (e.g. a file path or `"<script>"`).
pub fn disassemble(chunk: &Chunk, source_name: &str) -> Result<String> {
    let mut out = String::new();
    out.push_str(&format!("Compiled from \"{source_name}\"\n"));

    if !chunk.constants.is_empty() {
        out.push_str("  Constants:\n");
        for (i, constant) in chunk.constants.iter().enumerate() {
            out.push_str(&format!(
                "    {:>4} = {:<8} {}\n",
                format!("#{i}"),
                constant.type_name(),
                pool_value(constant)
            ));
        }
        out.push('\n');
    }

    out.push_str("  Code:\n");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, &mut out)?;
    }
    Ok(out)
}

fn pool_value(constant: &Value) -> String {
    match constant {
        Value::Str(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

/// Format a single instruction into `out`, returning the next offset.
fn disassemble_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> Result<usize> {
    let byte = chunk.code[offset];
    let op = OpCode::try_from(byte)
        .map_err(|b| anyhow::anyhow!("invalid opcode {b} at offset {offset}"))?;
    let name = op.as_ref();
    let line = chunk.line_at(offset);
    let same_line = offset > 0 && chunk.line_at(offset - 1) == line;
    let line_col = if same_line {
        "   |".to_string()
    } else {
        format!("{line:>4}")
    };
    let operand = |at: usize| {
        chunk
            .code
            .get(at)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("{name} at offset {offset} is missing its operand"))
    };

    match op {
        OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal => {
            let idx = operand(offset + 1)?;
            let comment = chunk
                .constants
                .get(idx as usize)
                .map(pool_value)
                .unwrap_or_else(|| "<missing>".to_string());
            out.push_str(&format!(
                "    {offset:04} {line_col} {name:<16} #{idx:<4} // {comment}\n"
            ));
            Ok(offset + 2)
        }
        OpCode::GetLocal | OpCode::SetLocal => {
            let slot = operand(offset + 1)?;
            out.push_str(&format!("    {offset:04} {line_col} {name:<16} {slot}\n"));
            Ok(offset + 2)
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
            let jump = chunk.read_u16(offset + 1).ok_or_else(|| {
                anyhow::anyhow!("{name} at offset {offset} is missing its operand")
            })? as usize;
            let next = offset + 3;
            let target = if op == OpCode::Loop {
                next.checked_sub(jump).ok_or_else(|| {
                    anyhow::anyhow!("loop at offset {offset} jumps before the chunk start")
                })?
            } else {
                next + jump
            };
            out.push_str(&format!("    {offset:04} {line_col} {name:<16} -> {target}\n"));
            Ok(next)
        }
        _ => {
            out.push_str(&format!("    {offset:04} {line_col} {name}\n"));
            Ok(offset + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn write_and_read_constant() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::I64(12)).expect("room in pool");
        chunk.write_op(OpCode::Constant, 1);
        chunk.write_byte(idx, 1);

        assert_eq!(chunk.code.len(), 2);
        assert_eq!(chunk.code[0], OpCode::Constant as u8);
        assert_eq!(chunk.constants[idx as usize], Value::I64(12));
    }

    #[test]
    fn serialize_deserialize_chunk() {
        let mut chunk = Chunk::new();
        chunk.add_constant(Value::F64(2.5));
        chunk.add_constant(Value::Str("name".into()));
        chunk.write_op(OpCode::Constant, 1);
        chunk.write_byte(0, 1);
        chunk.write_op(OpCode::Return, 2);

        let serialized = rmp_serde::to_vec(&chunk).expect("serialize");
        let deserialized: Chunk = rmp_serde::from_slice(&serialized).expect("deserialize");
        assert_eq!(chunk, deserialized);
    }

    #[test]
    fn bytecode_file_has_magic() {
        let mut chunk = Chunk::new();
        chunk.add_constant(Value::U8(3));
        chunk.write_op(OpCode::Return, 1);

        let bytes = chunk.to_bytes().expect("encode");
        assert_eq!(&bytes[..4], b"cmlb");
        assert_eq!(Chunk::from_bytes(&bytes).expect("decode"), chunk);
    }

    #[test]
    fn bytecode_without_magic_is_rejected() {
        let err = Chunk::from_bytes(b"nope").expect_err("bad magic");
        assert!(err.to_string().contains("bad magic"));

        let err = Chunk::from_bytes(b"cmlb\xc1").expect_err("bad body");
        assert!(err.to_string().contains("decode chunk"));
    }

    #[test]
    fn new_chunk_is_empty() {
        let chunk = Chunk::default();
        assert!(chunk.code.is_empty());
        assert!(chunk.constants.is_empty());
        assert!(chunk.lines.is_empty());
    }

    #[test]
    fn line_numbers_tracked_per_byte() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Constant, 1);
        chunk.write_byte(0, 1);
        chunk.write_op(OpCode::Jump, 2);
        chunk.write_u16(7, 2);
        chunk.write_op(OpCode::Return, 3);

        assert_eq!(chunk.lines, vec![1, 1, 2, 2, 2, 3]);
        assert_eq!(chunk.line_at(5), 3);
        assert_eq!(chunk.line_at(99), 0);
    }

    #[test]
    fn constant_pool_holds_256() {
        let mut chunk = Chunk::new();
        for i in 0..MAX_CONSTANTS {
            assert_eq!(chunk.add_constant(Value::I64(i as i64)), Some(i as u8));
        }
        assert_eq!(chunk.add_constant(Value::Nil), None);
        assert_eq!(chunk.constants.len(), MAX_CONSTANTS);
    }

    #[test]
    fn u16_is_big_endian() {
        let mut chunk = Chunk::new();
        chunk.write_u16(0xABCD, 1);
        assert_eq!(chunk.code, vec![0xAB, 0xCD]);
        assert_eq!(chunk.read_u16(0), Some(0xABCD));
        assert_eq!(chunk.read_u16(1), None);
    }

    #[test]
    fn opcode_bytes_follow_declaration_order() {
        assert_eq!(OpCode::Constant as u8, 0);
        assert_eq!(OpCode::SetGlobal as u8, 9);
        assert_eq!(OpCode::Print as u8, 19);
        assert_eq!(OpCode::Return as u8, 23);
        for op in OpCode::iter() {
            assert_eq!(OpCode::try_from(op as u8), Ok(op));
        }
        assert_eq!(OpCode::try_from(24), Err(24));
        assert_eq!(OpCode::try_from(255), Err(255));
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(OpCode::JumpIfFalse.as_ref(), "jump_if_false");
        assert_eq!(OpCode::DefineGlobal.as_ref(), "define_global");
        assert_eq!(OpCode::Return.as_ref(), "return");
    }

    #[test]
    fn disassemble_constants_and_code() {
        let mut chunk = Chunk::new();
        chunk.add_constant(Value::I64(42));
        chunk.add_constant(Value::Str("x".into()));
        chunk.write_op(OpCode::Constant, 1);
        chunk.write_byte(0, 1);
        chunk.write_op(OpCode::DefineGlobal, 1);
        chunk.write_byte(1, 1);
        chunk.write_op(OpCode::Return, 2);

        let text = disassemble(&chunk, "test.cml").expect("valid bytecode");
        assert!(text.contains("Compiled from \"test.cml\""));
        assert!(text.contains("#0 = i64"));
        assert!(text.contains("#1 = string"));
        assert!(text.contains("define_global"));
        assert!(text.contains("// \"x\""));
        assert!(text.contains("return"));
    }

    #[test]
    fn disassemble_jump_targets() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::JumpIfFalse, 1);
        chunk.write_u16(2, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.write_op(OpCode::Loop, 1);
        chunk.write_u16(8, 1);

        let text = disassemble(&chunk, "test").expect("valid bytecode");
        assert!(text.contains("jump_if_false    -> 5"));
        assert!(text.contains("loop             -> 0"));
    }

    #[test]
    fn disassemble_rejects_bad_bytes() {
        let chunk = Chunk {
            code: vec![200],
            constants: vec![],
            lines: vec![1],
        };
        assert!(disassemble(&chunk, "bad").is_err());

        let mut truncated = Chunk::new();
        truncated.write_op(OpCode::Constant, 1);
        assert!(disassemble(&truncated, "bad").is_err());
    }
}
