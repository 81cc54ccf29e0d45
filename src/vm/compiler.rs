use crate::ast::*;
use crate::error::CompileError;
use crate::scanner::token::Span;
use crate::vm::chunk::{Chunk, OpCode};
use crate::vm::table::Table;
use crate::vm::value::Value;

#[derive(Debug, Clone)]
struct Local {
    name: String,
    depth: usize,
}

/// Strip any parentheses around `expr`.
fn ungrouped(mut expr: &Expr) -> &Expr {
    while let Expr::Grouping(g) = expr {
        expr = &*g.expression;
    }
    expr
}

/// A numeric literal, possibly parenthesized and behind a single unary
/// minus, as written in the source.
#[derive(Debug, Clone, Copy)]
enum NumericLiteral {
    Integer { negative: bool, magnitude: u64 },
    Float(f64),
}

impl NumericLiteral {
    fn from_expr(expr: &Expr) -> Option<Self> {
        match ungrouped(expr) {
            Expr::Literal(l) => Self::from_literal(&l.value, false),
            Expr::Unary(UnaryExpr {
                operator: UnaryOp::Negate,
                operand,
                ..
            }) => match ungrouped(operand) {
                Expr::Literal(l) => Self::from_literal(&l.value, true),
                _ => None,
            },
            _ => None,
        }
    }

    fn from_literal(value: &LiteralValue, negative: bool) -> Option<Self> {
        match value {
            LiteralValue::Integer(magnitude) => Some(Self::Integer {
                negative,
                magnitude: *magnitude,
            }),
            LiteralValue::Float(n) => Some(Self::Float(if negative { -n } else { *n })),
            _ => None,
        }
    }

    fn wide(negative: bool, magnitude: u64) -> i128 {
        let n = i128::from(magnitude);
        if negative { -n } else { n }
    }

    /// The value this literal denotes when stored as `ty`.
    fn convert(self, ty: TypeName) -> Result<Value, String> {
        match self {
            Self::Integer {
                negative,
                magnitude,
            } => {
                let n = Self::wide(negative, magnitude);
                let out_of_range = || format!("literal {n} is out of range for {ty}");
                match ty {
                    TypeName::I8 => i8::try_from(n).map(Value::I8).map_err(|_| out_of_range()),
                    TypeName::I16 => i16::try_from(n).map(Value::I16).map_err(|_| out_of_range()),
                    TypeName::I32 => i32::try_from(n).map(Value::I32).map_err(|_| out_of_range()),
                    TypeName::I64 => i64::try_from(n).map(Value::I64).map_err(|_| out_of_range()),
                    TypeName::U8 => u8::try_from(n).map(Value::U8).map_err(|_| out_of_range()),
                    TypeName::U16 => u16::try_from(n).map(Value::U16).map_err(|_| out_of_range()),
                    TypeName::U32 => u32::try_from(n).map(Value::U32).map_err(|_| out_of_range()),
                    TypeName::U64 => u64::try_from(n).map(Value::U64).map_err(|_| out_of_range()),
                    TypeName::F32 => Ok(Value::F32(n as f32)),
                    TypeName::F64 => Ok(Value::F64(n as f64)),
                    TypeName::String | TypeName::Bool => {
                        Err(format!("cannot initialize {ty} variable with a number"))
                    }
                }
            }
            Self::Float(n) => match ty {
                TypeName::F32 => Ok(Value::F32(n as f32)),
                TypeName::F64 => Ok(Value::F64(n)),
                TypeName::String | TypeName::Bool => {
                    Err(format!("cannot initialize {ty} variable with a number"))
                }
                _ => Err(format!("expected an integer literal for {ty}")),
            },
        }
    }

    /// The value of an unannotated literal: `i64` or `f64`.
    fn default_value(self) -> Result<Value, String> {
        match self {
            Self::Integer { .. } => self.convert(TypeName::I64),
            Self::Float(n) => Ok(Value::F64(n)),
        }
    }
}

/// Lowers a [`Program`] to a single [`Chunk`].
///
/// Top-level `define`s become globals; anything declared inside a body is a
/// local living in the stack slot matching its declaration index.
pub struct Compiler {
    chunk: Chunk,
    locals: Vec<Local>,
    scope_depth: usize,
    names: Table<u8>,
    line: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            locals: Vec::new(),
            scope_depth: 0,
            names: Table::new(),
            line: 1,
        }
    }

    pub fn compile(mut self, program: &Program) -> Result<Chunk, CompileError> {
        for decl in &program.declarations {
            self.compile_decl(decl)?;
        }
        self.emit_op(OpCode::Return);
        Ok(self.chunk)
    }

    fn emit_op(&mut self, op: OpCode) {
        self.chunk.write_op(op, self.line);
    }

    fn emit_byte(&mut self, byte: u8) {
        self.chunk.write_byte(byte, self.line);
    }

    fn error(&self, message: impl Into<String>, span: Span) -> CompileError {
        CompileError::codegen(message, span.line, span.offset, span.len)
    }

    fn make_constant(&mut self, value: Value, span: Span) -> Result<u8, CompileError> {
        self.chunk
            .add_constant(value)
            .ok_or_else(|| self.error("too many constants in one chunk", span))
    }

    fn emit_constant(&mut self, value: Value, span: Span) -> Result<(), CompileError> {
        let idx = self.make_constant(value, span)?;
        self.emit_op(OpCode::Constant);
        self.emit_byte(idx);
        Ok(())
    }

    /// Constant-pool index of a variable name, shared by every use of the
    /// same name in this chunk.
    fn name_constant(&mut self, name: &str, span: Span) -> Result<u8, CompileError> {
        if let Some(&idx) = self.names.get(name) {
            return Ok(idx);
        }
        let idx = self.make_constant(Value::Str(name.to_string()), span)?;
        self.names.set(name, idx);
        Ok(idx)
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.chunk.write_u16(u16::MAX, self.line);
        self.chunk.code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize, span: Span) -> Result<(), CompileError> {
        let jump = self.chunk.code.len() - offset - 2;
        let jump =
            u16::try_from(jump).map_err(|_| self.error("too much code to jump over", span))?;
        let [hi, lo] = jump.to_be_bytes();
        self.chunk.code[offset] = hi;
        self.chunk.code[offset + 1] = lo;
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize, span: Span) -> Result<(), CompileError> {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk.code.len() - loop_start + 2;
        let offset = u16::try_from(offset).map_err(|_| self.error("loop body too large", span))?;
        self.chunk.write_u16(offset, self.line);
        Ok(())
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth <= self.scope_depth {
                break;
            }
            self.emit_op(OpCode::Pop);
            self.locals.pop();
        }
    }

    /// Declare a local in the current scope, returning its stack slot.
    fn add_local(&mut self, name: &str, span: Span) -> Result<u8, CompileError> {
        let redeclared = self
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth == self.scope_depth)
            .any(|local| local.name == name);
        if redeclared {
            return Err(self.error(
                format!("variable '{name}' is already defined in this scope"),
                span,
            ));
        }
        let slot = u8::try_from(self.locals.len())
            .map_err(|_| self.error("too many local variables", span))?;
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
        });
        Ok(slot)
    }

    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals
            .iter()
            .rposition(|local| local.name == name)
            .and_then(|slot| u8::try_from(slot).ok())
    }

    fn compile_body(&mut self, body: &[Decl]) -> Result<(), CompileError> {
        self.begin_scope();
        for decl in body {
            self.compile_decl(decl)?;
        }
        self.end_scope();
        Ok(())
    }

    fn compile_decl(&mut self, decl: &Decl) -> Result<(), CompileError> {
        match decl {
            Decl::Define(d) => self.compile_define(d),
            Decl::Statement(s) => self.compile_stmt(s),
        }
    }

    fn compile_define(&mut self, d: &DefineDecl) -> Result<(), CompileError> {
        self.line = d.span.line;
        match d.type_annotation {
            Some(ty) => self.compile_annotated(ty, &d.initializer)?,
            None => self.compile_expr(&d.initializer)?,
        }
        self.line = d.span.line;
        if self.scope_depth > 0 {
            self.add_local(&d.name, d.span)?;
            Ok(())
        } else {
            let idx = self.name_constant(&d.name, d.span)?;
            self.emit_op(OpCode::DefineGlobal);
            self.emit_byte(idx);
            Ok(())
        }
    }

    /// Literal initializers are checked against the declared type and
    /// stored at that width; other initializers are compiled as-is.
    fn compile_annotated(&mut self, ty: TypeName, init: &Expr) -> Result<(), CompileError> {
        let span = init.span();
        if let Some(literal) = NumericLiteral::from_expr(init) {
            self.line = span.line;
            let value = literal.convert(ty).map_err(|msg| self.error(msg, span))?;
            return self.emit_constant(value, span);
        }
        if let Expr::Literal(l) = ungrouped(init) {
            let matches = matches!(
                (&l.value, ty),
                (LiteralValue::String(_), TypeName::String) | (LiteralValue::Bool(_), TypeName::Bool)
            );
            if !matches {
                let kind = match l.value {
                    LiteralValue::String(_) => "a string",
                    LiteralValue::Bool(_) => "a bool",
                    _ => "nil",
                };
                return Err(self.error(format!("cannot initialize {ty} variable with {kind}"), span));
            }
        }
        self.compile_expr(init)
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Print(p) => {
                self.compile_expr(&p.expression)?;
                self.line = p.span.line;
                self.emit_op(OpCode::Print);
                Ok(())
            }
            Stmt::Set(s) => {
                self.compile_expr(&s.value)?;
                self.line = s.span.line;
                match self.resolve_local(&s.name) {
                    Some(slot) => {
                        self.emit_op(OpCode::SetLocal);
                        self.emit_byte(slot);
                    }
                    None => {
                        let idx = self.name_constant(&s.name, s.span)?;
                        self.emit_op(OpCode::SetGlobal);
                        self.emit_byte(idx);
                    }
                }
                self.emit_op(OpCode::Pop);
                Ok(())
            }
            Stmt::Block(b) => self.compile_body(&b.declarations),
            Stmt::If(i) => {
                self.compile_expr(&i.condition)?;
                self.line = i.span.line;
                let then_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_op(OpCode::Pop);
                self.compile_body(&i.then_branch)?;
                let else_jump = self.emit_jump(OpCode::Jump);
                self.patch_jump(then_jump, i.span)?;
                self.emit_op(OpCode::Pop);
                if let Some(ref else_branch) = i.else_branch {
                    self.compile_body(else_branch)?;
                }
                self.patch_jump(else_jump, i.span)
            }
            Stmt::While(w) => {
                let loop_start = self.chunk.code.len();
                self.compile_expr(&w.condition)?;
                self.line = w.span.line;
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_op(OpCode::Pop);
                self.compile_body(&w.body)?;
                self.line = w.span.line;
                self.emit_loop(loop_start, w.span)?;
                self.patch_jump(exit_jump, w.span)?;
                self.emit_op(OpCode::Pop);
                Ok(())
            }
            Stmt::For(f) => self.compile_for(f),
        }
    }

    /// `for v from a to b` keeps the counter and the bound in two hidden
    /// locals; each iteration copies the counter into a fresh `v`, so
    /// assigning to `v` in the body does not change the iteration count.
    /// The range is checked once on entry and the loop leaves as soon as
    /// the counter reaches the bound, so the counter never steps past it.
    fn compile_for(&mut self, f: &ForStmt) -> Result<(), CompileError> {
        self.begin_scope();
        self.compile_expr(&f.start)?;
        let counter = self.add_local(" for counter", f.span)?;
        self.compile_expr(&f.end)?;
        let limit = self.add_local(" for limit", f.span)?;
        self.line = f.span.line;

        // counter <= limit
        self.emit_op(OpCode::GetLocal);
        self.emit_byte(counter);
        self.emit_op(OpCode::GetLocal);
        self.emit_byte(limit);
        self.emit_op(OpCode::Greater);
        self.emit_op(OpCode::Not);
        let empty_range_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);

        let body_start = self.chunk.code.len();
        self.begin_scope();
        self.emit_op(OpCode::GetLocal);
        self.emit_byte(counter);
        self.add_local(&f.variable, f.span)?;
        for decl in &f.body {
            self.compile_decl(decl)?;
        }
        self.line = f.span.line;
        self.end_scope();

        // counter != limit
        self.emit_op(OpCode::GetLocal);
        self.emit_byte(counter);
        self.emit_op(OpCode::GetLocal);
        self.emit_byte(limit);
        self.emit_op(OpCode::Equal);
        self.emit_op(OpCode::Not);
        let last_iteration_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);

        self.emit_op(OpCode::GetLocal);
        self.emit_byte(counter);
        self.emit_constant(Value::I64(1), f.span)?;
        self.emit_op(OpCode::Add);
        self.emit_op(OpCode::SetLocal);
        self.emit_byte(counter);
        self.emit_op(OpCode::Pop);
        self.emit_loop(body_start, f.span)?;

        // Both exits arrive with the failed condition on the stack.
        self.patch_jump(empty_range_jump, f.span)?;
        self.patch_jump(last_iteration_jump, f.span)?;
        self.emit_op(OpCode::Pop);
        self.end_scope();
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let span = expr.span();
        if let Some(literal) = NumericLiteral::from_expr(expr) {
            self.line = span.line;
            let value = literal.default_value().map_err(|msg| self.error(msg, span))?;
            return self.emit_constant(value, span);
        }

        match expr {
            Expr::Literal(l) => {
                self.line = span.line;
                match &l.value {
                    LiteralValue::String(s) => self.emit_constant(Value::Str(s.clone()), span)?,
                    LiteralValue::Bool(true) => self.emit_op(OpCode::True),
                    LiteralValue::Bool(false) => self.emit_op(OpCode::False),
                    LiteralValue::Nil => self.emit_op(OpCode::Nil),
                    LiteralValue::Integer(_) | LiteralValue::Float(_) => {
                        unreachable!("numeric literals are folded above")
                    }
                }
                Ok(())
            }
            Expr::Grouping(g) => self.compile_expr(&g.expression),
            Expr::Unary(u) => {
                self.compile_expr(&u.operand)?;
                self.line = span.line;
                match u.operator {
                    UnaryOp::Negate => self.emit_op(OpCode::Negate),
                    UnaryOp::Not => self.emit_op(OpCode::Not),
                }
                Ok(())
            }
            Expr::Binary(b) => {
                self.compile_expr(&b.left)?;
                self.compile_expr(&b.right)?;
                self.line = span.line;
                match b.operator {
                    BinaryOp::Add => self.emit_op(OpCode::Add),
                    BinaryOp::Subtract => self.emit_op(OpCode::Subtract),
                    BinaryOp::Multiply => self.emit_op(OpCode::Multiply),
                    BinaryOp::Divide => self.emit_op(OpCode::Divide),
                    BinaryOp::Equal => self.emit_op(OpCode::Equal),
                    BinaryOp::NotEqual => {
                        self.emit_op(OpCode::Equal);
                        self.emit_op(OpCode::Not);
                    }
                    BinaryOp::Less => self.emit_op(OpCode::Less),
                    BinaryOp::LessEqual => {
                        self.emit_op(OpCode::Greater);
                        self.emit_op(OpCode::Not);
                    }
                    BinaryOp::Greater => self.emit_op(OpCode::Greater),
                    BinaryOp::GreaterEqual => {
                        self.emit_op(OpCode::Less);
                        self.emit_op(OpCode::Not);
                    }
                }
                Ok(())
            }
            Expr::Variable(v) => {
                self.line = span.line;
                match self.resolve_local(&v.name) {
                    Some(slot) => {
                        self.emit_op(OpCode::GetLocal);
                        self.emit_byte(slot);
                    }
                    None => {
                        let idx = self.name_constant(&v.name, span)?;
                        self.emit_op(OpCode::GetGlobal);
                        self.emit_byte(idx);
                    }
                }
                Ok(())
            }
            Expr::Logical(l) => {
                self.compile_expr(&l.left)?;
                self.line = span.line;
                match l.operator {
                    LogicalOp::And => {
                        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
                        self.emit_op(OpCode::Pop);
                        self.compile_expr(&l.right)?;
                        self.patch_jump(end_jump, span)
                    }
                    LogicalOp::Or => {
                        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
                        let end_jump = self.emit_jump(OpCode::Jump);
                        self.patch_jump(else_jump, span)?;
                        self.emit_op(OpCode::Pop);
                        self.compile_expr(&l.right)?;
                        self.patch_jump(end_jump, span)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::vm::stack::STACK_MAX;
    use rstest::rstest;

    fn compile(source: &str) -> Result<Chunk, CompileError> {
        let program = Parser::from_source(source)
            .parse()
            .expect("parse should succeed");
        Compiler::new().compile(&program)
    }

    fn compile_ok(source: &str) -> Chunk {
        compile(source).expect("compile should succeed")
    }

    fn compile_err(source: &str) -> String {
        compile(source)
            .expect_err("compile should fail")
            .message()
            .to_string()
    }

    fn ops(chunk: &Chunk) -> Vec<OpCode> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < chunk.code.len() {
            let op = OpCode::try_from(chunk.code[offset]).expect("valid opcode");
            out.push(op);
            offset += 1 + op.operand_len();
        }
        out
    }

    fn has_opcode(chunk: &Chunk, op: OpCode) -> bool {
        ops(chunk).contains(&op)
    }

    fn count_opcode(chunk: &Chunk, op: OpCode) -> usize {
        ops(chunk).iter().filter(|&&o| o == op).count()
    }

    #[test]
    fn compile_integer_literal() {
        let chunk = compile_ok("print 42");
        assert_eq!(
            ops(&chunk),
            vec![OpCode::Constant, OpCode::Print, OpCode::Return]
        );
        assert_eq!(chunk.constants, vec![Value::I64(42)]);
    }

    #[test]
    fn compile_float_literal() {
        let chunk = compile_ok("print 2.5");
        assert_eq!(chunk.constants, vec![Value::F64(2.5)]);
    }

    #[test]
    fn compile_string_literal() {
        let chunk = compile_ok("print \"hello\"");
        assert_eq!(chunk.constants, vec![Value::Str("hello".into())]);
    }

    #[rstest]
    #[case("true", OpCode::True)]
    #[case("false", OpCode::False)]
    #[case("nil", OpCode::Nil)]
    fn compile_keyword_literals(#[case] source: &str, #[case] op: OpCode) {
        let chunk = compile_ok(&format!("print {source}"));
        assert_eq!(ops(&chunk), vec![op, OpCode::Print, OpCode::Return]);
    }

    #[test]
    fn negated_literal_folds_to_one_constant() {
        let chunk = compile_ok("print -5");
        assert_eq!(chunk.constants, vec![Value::I64(-5)]);
        assert!(!has_opcode(&chunk, OpCode::Negate));

        let chunk = compile_ok("print -9223372036854775808");
        assert_eq!(chunk.constants, vec![Value::I64(i64::MIN)]);
    }

    #[test]
    fn negated_variable_emits_negate() {
        let chunk = compile_ok("define x = 1 print -x");
        assert!(has_opcode(&chunk, OpCode::Negate));
    }

    #[test]
    fn integer_literal_out_of_range() {
        let message = compile_err("print 9223372036854775808");
        assert_eq!(message, "literal 9223372036854775808 is out of range for i64");
    }

    #[rstest]
    #[case("+", vec![OpCode::Add])]
    #[case("-", vec![OpCode::Subtract])]
    #[case("*", vec![OpCode::Multiply])]
    #[case("/", vec![OpCode::Divide])]
    #[case("==", vec![OpCode::Equal])]
    #[case("!=", vec![OpCode::Equal, OpCode::Not])]
    #[case("<", vec![OpCode::Less])]
    #[case("<=", vec![OpCode::Greater, OpCode::Not])]
    #[case(">", vec![OpCode::Greater])]
    #[case(">=", vec![OpCode::Less, OpCode::Not])]
    fn compile_binary_operators(#[case] op: &str, #[case] expected: Vec<OpCode>) {
        let chunk = compile_ok(&format!("print 1 {op} 2"));
        let mut want = vec![OpCode::Constant, OpCode::Constant];
        want.extend(expected);
        want.extend([OpCode::Print, OpCode::Return]);
        assert_eq!(ops(&chunk), want);
    }

    #[test]
    fn compile_global_define_and_set() {
        let chunk = compile_ok("define x = 1\nset x to 2\nprint x");
        assert_eq!(
            ops(&chunk),
            vec![
                OpCode::Constant,
                OpCode::DefineGlobal,
                OpCode::Constant,
                OpCode::SetGlobal,
                OpCode::Pop,
                OpCode::GetGlobal,
                OpCode::Print,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn name_constants_are_shared() {
        let chunk = compile_ok("define x = 1\nset x to x\nprint x");
        let names = chunk
            .constants
            .iter()
            .filter(|c| **c == Value::Str("x".into()))
            .count();
        assert_eq!(names, 1);
    }

    #[test]
    fn compile_locals_in_block() {
        let chunk = compile_ok("{ define a = 1 define b = 2 set a to b print a }");
        assert_eq!(
            ops(&chunk),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::GetLocal,
                OpCode::SetLocal,
                OpCode::Pop,
                OpCode::GetLocal,
                OpCode::Print,
                OpCode::Pop,
                OpCode::Pop,
                OpCode::Return,
            ]
        );
        assert!(!has_opcode(&chunk, OpCode::DefineGlobal));
    }

    #[test]
    fn redeclaring_local_in_same_scope_fails() {
        let message = compile_err("{ define a = 1 define a = 2 }");
        assert_eq!(message, "variable 'a' is already defined in this scope");
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        let chunk = compile_ok("{ define a = 1 { define a = 2 print a } }");
        assert_eq!(count_opcode(&chunk, OpCode::Pop), 2);
    }

    #[test]
    fn too_many_locals() {
        let mut source = String::from("{\n");
        for i in 0..=STACK_MAX {
            source.push_str(&format!("define v{i} = nil\n"));
        }
        source.push('}');
        assert_eq!(compile_err(&source), "too many local variables");
    }

    #[test]
    fn too_many_constants() {
        let source: String = (0..300).map(|i| format!("print \"s{i}\"\n")).collect();
        assert_eq!(compile_err(&source), "too many constants in one chunk");
    }

    #[test]
    fn compile_if_else() {
        let chunk = compile_ok("if true print 1 else print 2 end");
        assert_eq!(
            ops(&chunk),
            vec![
                OpCode::True,
                OpCode::JumpIfFalse,
                OpCode::Pop,
                OpCode::Constant,
                OpCode::Print,
                OpCode::Jump,
                OpCode::Pop,
                OpCode::Constant,
                OpCode::Print,
                OpCode::Return,
            ]
        );
        // then-jump lands on the else-path POP
        assert_eq!(chunk.read_u16(2), Some(7));
    }

    #[test]
    fn compile_while_loop() {
        let chunk = compile_ok("while false print 1 end");
        assert_eq!(
            ops(&chunk),
            vec![
                OpCode::False,
                OpCode::JumpIfFalse,
                OpCode::Pop,
                OpCode::Constant,
                OpCode::Print,
                OpCode::Loop,
                OpCode::Pop,
                OpCode::Return,
            ]
        );
        // LOOP at offset 8 jumps back to offset 0
        assert_eq!(chunk.read_u16(9), Some(11));
    }

    #[test]
    fn compile_for_loop() {
        let chunk = compile_ok("for i from 1 to 3 print i end");
        assert!(has_opcode(&chunk, OpCode::Loop));
        assert!(has_opcode(&chunk, OpCode::Add));
        assert!(!has_opcode(&chunk, OpCode::DefineGlobal));
        assert_eq!(ops(&chunk).last(), Some(&OpCode::Return));
        // Entry check and last-iteration check.
        assert_eq!(count_opcode(&chunk, OpCode::JumpIfFalse), 2);
        assert_eq!(count_opcode(&chunk, OpCode::Equal), 1);
    }

    #[test]
    fn compile_logical_operators() {
        let chunk = compile_ok("print true and false");
        assert_eq!(count_opcode(&chunk, OpCode::JumpIfFalse), 1);
        assert!(!has_opcode(&chunk, OpCode::Jump));

        let chunk = compile_ok("print true or false");
        assert_eq!(count_opcode(&chunk, OpCode::JumpIfFalse), 1);
        assert_eq!(count_opcode(&chunk, OpCode::Jump), 1);
    }

    #[rstest]
    #[case("define x: u8 = 200", Value::U8(200))]
    #[case("define x: i8 = -128", Value::I8(-128))]
    #[case("define x: u64 = 18446744073709551615", Value::U64(u64::MAX))]
    #[case("define x: i32 = 7", Value::I32(7))]
    #[case("define x: f32 = 1.5", Value::F32(1.5))]
    #[case("define x: f64 = 3", Value::F64(3.0))]
    #[case("define x: string = \"s\"", Value::Str("s".into()))]
    #[case("define x: u8 = (200)", Value::U8(200))]
    #[case("define x: i8 = -(128)", Value::I8(-128))]
    #[case("define x: i16 = ((-7))", Value::I16(-7))]
    fn annotated_literals_take_declared_width(#[case] source: &str, #[case] expected: Value) {
        let chunk = compile_ok(source);
        assert_eq!(chunk.constants[0], expected);
    }

    #[rstest]
    #[case("define x: u8 = 256", "literal 256 is out of range for u8")]
    #[case("define x: u32 = -1", "literal -1 is out of range for u32")]
    #[case("define x: i16 = 1.5", "expected an integer literal for i16")]
    #[case("define x: bool = 1", "cannot initialize bool variable with a number")]
    #[case("define x: i64 = \"s\"", "cannot initialize i64 variable with a string")]
    #[case("define x: string = true", "cannot initialize string variable with a bool")]
    #[case("define x: u8 = (300)", "literal 300 is out of range for u8")]
    #[case("define x: u8 = -(1)", "literal -1 is out of range for u8")]
    #[case("define x: bool = (\"s\")", "cannot initialize bool variable with a string")]
    fn annotation_mismatches(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(compile_err(source), expected);
    }

    #[test]
    fn non_literal_initializer_is_not_checked() {
        let chunk = compile_ok("define y = 1\ndefine x: u8 = y + 1000");
        assert!(has_opcode(&chunk, OpCode::Add));
    }

    #[test]
    fn instructions_carry_source_lines() {
        let chunk = compile_ok("define x = 1\n\nprint x");
        assert_eq!(chunk.line_at(0), 1);
        let print_at = chunk.code.len() - 2;
        assert_eq!(chunk.line_at(print_at), 3);
    }

    #[test]
    fn chunk_always_ends_with_return() {
        let chunk = compile_ok("");
        assert_eq!(chunk.code, vec![OpCode::Return as u8]);
    }
}
