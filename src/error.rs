use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::vm::stack::StackError;

// ============= Compile-time errors (with miette diagnostics) =============

#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error("[line {line}] Error: {message}")]
    #[diagnostic(code(camel::lex))]
    Lex {
        message: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("[line {line}] Error{location}: {message}")]
    #[diagnostic(code(camel::parse))]
    Parse {
        message: String,
        location: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("[line {line}] Error: {message}")]
    #[diagnostic(code(camel::codegen))]
    Codegen {
        message: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl CompileError {
    pub fn lex(message: impl Into<String>, line: usize, offset: usize, len: usize) -> Self {
        Self::Lex {
            message: message.into(),
            line,
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    /// A syntax error; `location` is rendered right after "Error", e.g.
    /// `" at 'x'"` or `" at end"`.
    pub fn parse(
        message: impl Into<String>,
        location: impl Into<String>,
        line: usize,
        offset: usize,
        len: usize,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            location: location.into(),
            line,
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    pub fn codegen(message: impl Into<String>, line: usize, offset: usize, len: usize) -> Self {
        Self::Codegen {
            message: message.into(),
            line,
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::Lex { line, .. } | Self::Parse { line, .. } | Self::Codegen { line, .. } => {
                *line
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lex { message, .. }
            | Self::Parse { message, .. }
            | Self::Codegen { message, .. } => message,
        }
    }

    /// Attach source code for fancy miette diagnostics
    pub fn with_source_code(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let src = miette::NamedSource::new(name.into(), source.into());
        match self {
            Self::Lex {
                message,
                line,
                span,
                ..
            } => Self::Lex {
                message,
                line,
                span,
                src,
            },
            Self::Parse {
                message,
                location,
                line,
                span,
                ..
            } => Self::Parse {
                message,
                location,
                line,
                span,
                src,
            },
            Self::Codegen {
                message,
                line,
                span,
                ..
            } => Self::Codegen {
                message,
                line,
                span,
                src,
            },
        }
    }
}

// ============= Runtime errors (simple, no miette) =============

#[derive(Error, Debug)]
pub enum RuntimeErrorKind {
    #[error("Operands must be numbers")]
    OperandsMustBeNumbers,

    #[error("Operand must be a number")]
    OperandMustBeNumber,

    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow")]
    IntegerOverflow,

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("Unexpected end of bytecode")]
    TruncatedInstruction,

    #[error("Jump target out of range at offset {0}")]
    JumpOutOfRange(usize),

    #[error("Constant index {0} out of range")]
    MissingConstant(u8),

    #[error("Variable name must be a string constant")]
    NameNotString,

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// A failed execution, tagged with the source line of the faulting
/// instruction.
#[derive(Error, Debug)]
#[error("[line {line}] {kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub line: usize,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, line: usize) -> Self {
        Self { kind, line }
    }
}

// ============= Pipeline result =============

#[derive(Error, Debug)]
pub enum InterpretError {
    #[error("{} compile error(s)", .0.len())]
    Compile(Vec<CompileError>),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InterpretError {
    /// Process exit status conventionally used for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Compile(_) => 65,
            Self::Runtime(_) => 70,
        }
    }
}

impl From<Vec<CompileError>> for InterpretError {
    fn from(errors: Vec<CompileError>) -> Self {
        Self::Compile(errors)
    }
}

// ============= Tests =============

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_implements_diagnostic() {
        let err = CompileError::lex("Unexpected character", 1, 0, 1);
        let diag: &dyn Diagnostic = &err;
        assert!(diag.code().is_some());
    }

    #[test]
    fn compile_error_with_source() {
        let err = CompileError::parse("expected expression", " at end", 1, 10, 1)
            .with_source_code("test.cml", "define x =");
        assert!(matches!(err, CompileError::Parse { .. }));
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn compile_error_display_has_line_prefix() {
        let err = CompileError::parse("expected 'end'", " at 'print'", 3, 20, 5);
        assert_eq!(err.to_string(), "[line 3] Error at 'print': expected 'end'");

        let err = CompileError::lex("Unterminated string", 2, 4, 1);
        assert_eq!(err.to_string(), "[line 2] Error: Unterminated string");

        let err = CompileError::codegen("too many constants in one chunk", 9, 0, 1);
        assert_eq!(err.message(), "too many constants in one chunk");
    }

    #[test]
    fn runtime_error_display() {
        let err = RuntimeError::new(RuntimeErrorKind::UndefinedVariable("y".into()), 4);
        assert_eq!(err.to_string(), "[line 4] Undefined variable 'y'");
    }

    #[test]
    fn stack_faults_are_transparent() {
        let err = RuntimeError::new(StackError::Overflow.into(), 1);
        assert_eq!(err.to_string(), "[line 1] Stack overflow");
    }

    #[test]
    fn exit_codes() {
        let compile = InterpretError::Compile(vec![]);
        let runtime =
            InterpretError::from(RuntimeError::new(RuntimeErrorKind::OperandsMustBeNumbers, 1));
        assert_eq!(compile.exit_code(), 65);
        assert_eq!(runtime.exit_code(), 70);
    }
}
