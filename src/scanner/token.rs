use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    // Single-character tokens
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Colon,
    Comma,
    Minus,
    Plus,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    I64,
    F64,

    // Keywords
    And,
    Builtin,
    Call,
    Define,
    Else,
    End,
    False,
    For,
    From,
    Function,
    If,
    Namespace,
    Nil,
    Not,
    Or,
    Parameter,
    Print,
    Private,
    Public,
    Return,
    ReturnType,
    Set,
    To,
    True,
    Variable,
    While,

    // Type keywords
    TypeI8,
    TypeI16,
    TypeI32,
    TypeI64,
    TypeU8,
    TypeU16,
    TypeU32,
    TypeU64,
    TypeF32,
    TypeF64,
    TypeString,
    TypeBool,
    TypeVoid,

    Error,
    Eof,
}

impl TokenKind {
    /// Keywords that are reserved by the language but have no implementation.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            Self::Builtin
                | Self::Call
                | Self::Function
                | Self::Namespace
                | Self::Parameter
                | Self::Private
                | Self::Public
                | Self::Return
                | Self::ReturnType
                | Self::Variable
        )
    }
}

/// Location of a syntax element: byte range plus the 1-based line it is
/// reported on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
    pub line: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize, line: usize) -> Self {
        Self { offset, len, line }
    }

    /// Smallest span covering both `self` and `other`, reported on the line
    /// where `self` starts.
    pub fn to(self, other: Span) -> Span {
        let end = (other.offset + other.len).max(self.offset + self.len);
        Span::new(self.offset, end.saturating_sub(self.offset), self.line)
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::new(span.offset.into(), span.len)
    }
}

/// A lexical token borrowing its text from the source buffer.
///
/// For [`TokenKind::Error`] the lexeme is the diagnostic message rather than
/// source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub line: usize,
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, line: usize, offset: usize) -> Self {
        Self {
            kind,
            lexeme,
            line,
            offset,
        }
    }

    /// Width of the token in the source, never zero so labels stay visible.
    pub fn width(&self) -> usize {
        match self.kind {
            TokenKind::Error | TokenKind::Eof => 1,
            _ => self.lexeme.len().max(1),
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.offset, self.width(), self.line)
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4} {} '{}'", self.line, self.kind, self.lexeme)
    }
}

pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    match ident {
        "and" => Some(TokenKind::And),
        "builtin" => Some(TokenKind::Builtin),
        "call" => Some(TokenKind::Call),
        "define" => Some(TokenKind::Define),
        "else" => Some(TokenKind::Else),
        "end" => Some(TokenKind::End),
        "false" => Some(TokenKind::False),
        "for" => Some(TokenKind::For),
        "from" => Some(TokenKind::From),
        "function" => Some(TokenKind::Function),
        "if" => Some(TokenKind::If),
        "namespace" => Some(TokenKind::Namespace),
        "nil" => Some(TokenKind::Nil),
        "not" => Some(TokenKind::Not),
        "or" => Some(TokenKind::Or),
        "parameter" => Some(TokenKind::Parameter),
        "print" => Some(TokenKind::Print),
        "private" => Some(TokenKind::Private),
        "public" => Some(TokenKind::Public),
        "return" => Some(TokenKind::Return),
        "return_type" => Some(TokenKind::ReturnType),
        "set" => Some(TokenKind::Set),
        "to" => Some(TokenKind::To),
        "true" => Some(TokenKind::True),
        "variable" => Some(TokenKind::Variable),
        "while" => Some(TokenKind::While),
        "i8" => Some(TokenKind::TypeI8),
        "i16" => Some(TokenKind::TypeI16),
        "i32" => Some(TokenKind::TypeI32),
        "i64" => Some(TokenKind::TypeI64),
        "u8" => Some(TokenKind::TypeU8),
        "u16" => Some(TokenKind::TypeU16),
        "u32" => Some(TokenKind::TypeU32),
        "u64" => Some(TokenKind::TypeU64),
        "f32" => Some(TokenKind::TypeF32),
        "f64" => Some(TokenKind::TypeF64),
        "string" => Some(TokenKind::TypeString),
        "bool" => Some(TokenKind::TypeBool),
        "void" => Some(TokenKind::TypeVoid),
        _ => None,
    }
}
