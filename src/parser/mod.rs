use crate::ast::*;
use crate::error::CompileError;
use crate::scanner::Lexer;
use crate::scanner::token::{Span, Token, TokenKind};

/// Deepest allowed nesting of parenthesized/unary expressions and
/// statement bodies combined.
const MAX_NESTING: usize = 128;

/// Recursive-descent parser pulling tokens on demand from a [`Lexer`].
///
/// Every error is collected; after the first one the parser stays in panic
/// mode, suppressing further reports, until it resynchronizes at the next
/// statement boundary.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
    previous: Token<'a>,
    errors: Vec<CompileError>,
    panic_mode: bool,
    depth: usize,
    nesting: usize,
    halted: bool,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        let placeholder = Token::new(TokenKind::Eof, "", 1, 0);
        let mut parser = Self {
            lexer,
            current: placeholder,
            previous: placeholder,
            errors: Vec::new(),
            panic_mode: false,
            depth: 0,
            nesting: 0,
            halted: false,
        };
        parser.advance();
        parser
    }

    pub fn from_source(source: &'a str) -> Self {
        Self::new(Lexer::new(source))
    }

    pub fn parse(mut self) -> Result<Program, Vec<CompileError>> {
        let mut declarations = Vec::new();
        while !self.is_at_end() {
            if let Some(decl) = self.declaration_recovering() {
                declarations.push(decl);
            }
        }
        if self.errors.is_empty() {
            Ok(Program { declarations })
        } else {
            Err(self.errors)
        }
    }

    fn declaration_recovering(&mut self) -> Option<Decl> {
        let start = self.current.offset;
        match self.declaration() {
            Ok(decl) => {
                self.panic_mode = self.halted;
                Some(decl)
            }
            Err(e) => {
                self.report(e);
                self.synchronize(start);
                None
            }
        }
    }

    fn declaration(&mut self) -> Result<Decl, CompileError> {
        if self.check(TokenKind::Define) {
            self.define_declaration()
        } else {
            self.statement().map(Decl::Statement)
        }
    }

    fn define_declaration(&mut self) -> Result<Decl, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'define'
        let name = self.expect_identifier("variable name after 'define'")?;

        let type_annotation = if self.match_token(TokenKind::Colon) {
            Some(self.type_name()?)
        } else {
            None
        };

        self.consume(TokenKind::Equal, "'=' after variable name")?;
        let initializer = self.expression()?;
        let span = self.span_from(start);
        Ok(Decl::Define(DefineDecl {
            name,
            type_annotation,
            initializer,
            span,
        }))
    }

    fn type_name(&mut self) -> Result<TypeName, CompileError> {
        let ty = match self.current.kind {
            TokenKind::TypeI8 => TypeName::I8,
            TokenKind::TypeI16 => TypeName::I16,
            TokenKind::TypeI32 => TypeName::I32,
            TokenKind::TypeI64 => TypeName::I64,
            TokenKind::TypeU8 => TypeName::U8,
            TokenKind::TypeU16 => TypeName::U16,
            TokenKind::TypeU32 => TypeName::U32,
            TokenKind::TypeU64 => TypeName::U64,
            TokenKind::TypeF32 => TypeName::F32,
            TokenKind::TypeF64 => TypeName::F64,
            TokenKind::TypeString => TypeName::String,
            TokenKind::TypeBool => TypeName::Bool,
            TokenKind::TypeVoid => {
                return Err(self.error_at_current("'void' is not a valid variable type"));
            }
            _ => return Err(self.error_at_current("expected type after ':'")),
        };
        self.advance();
        Ok(ty)
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        match self.current.kind {
            TokenKind::Print => self.print_statement(),
            TokenKind::Set => self.set_statement(),
            TokenKind::LeftBrace => self.nested(Self::block_statement),
            TokenKind::If => self.nested(Self::if_statement),
            TokenKind::While => self.nested(Self::while_statement),
            TokenKind::For => self.nested(Self::for_statement),
            kind if kind.is_reserved() => {
                let message = format!("'{}' is not supported", self.current.lexeme);
                Err(self.error_at_current(&message))
            }
            _ => Err(self.error_at_current("expected statement")),
        }
    }

    fn print_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'print'
        let expression = self.expression()?;
        let span = self.span_from(start);
        Ok(Stmt::Print(PrintStmt { expression, span }))
    }

    fn set_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'set'
        let name = self.expect_identifier("variable name after 'set'")?;
        self.consume(TokenKind::To, "'to' after variable name")?;
        let value = self.expression()?;
        let span = self.span_from(start);
        Ok(Stmt::Set(SetStmt { name, value, span }))
    }

    fn block_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume '{'
        let declarations = self.body(&[TokenKind::RightBrace]);
        self.consume(TokenKind::RightBrace, "'}' after block")?;
        let span = self.span_from(start);
        Ok(Stmt::Block(BlockStmt { declarations, span }))
    }

    fn if_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'if'
        let condition = self.expression()?;
        let then_branch = self.body(&[TokenKind::Else, TokenKind::End]);
        let else_branch = if self.match_token(TokenKind::Else) {
            Some(self.body(&[TokenKind::End]))
        } else {
            None
        };
        self.consume(TokenKind::End, "'end' after if body")?;
        let span = self.span_from(start);
        Ok(Stmt::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        }))
    }

    fn while_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'while'
        let condition = self.expression()?;
        let body = self.body(&[TokenKind::End]);
        self.consume(TokenKind::End, "'end' after while body")?;
        let span = self.span_from(start);
        Ok(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    fn for_statement(&mut self) -> Result<Stmt, CompileError> {
        let start = self.current_span();
        self.advance(); // consume 'for'
        let variable = self.expect_identifier("loop variable after 'for'")?;
        self.consume(TokenKind::From, "'from' after loop variable")?;
        let range_start = self.expression()?;
        self.consume(TokenKind::To, "'to' after range start")?;
        let range_end = self.expression()?;
        let body = self.body(&[TokenKind::End]);
        self.consume(TokenKind::End, "'end' after for body")?;
        let span = self.span_from(start);
        Ok(Stmt::For(ForStmt {
            variable,
            start: range_start,
            end: range_end,
            body,
            span,
        }))
    }

    /// Declarations up to (not including) one of `terminators`. Errors are
    /// recovered here so a mistake inside a body doesn't unwind the
    /// enclosing statement.
    fn body(&mut self, terminators: &[TokenKind]) -> Vec<Decl> {
        self.depth += 1;
        let mut declarations = Vec::new();
        while !self.is_at_end() && !terminators.contains(&self.current.kind) {
            if let Some(decl) = self.declaration_recovering() {
                declarations.push(decl);
            }
        }
        self.depth -= 1;
        declarations
    }

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.nested(Self::or)
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.and()?;
        while self.match_token(TokenKind::Or) {
            let right = self.and()?;
            let span = expr.span().to(right.span());
            expr = Expr::Logical(LogicalExpr {
                left: Box::new(expr),
                operator: LogicalOp::Or,
                right: Box::new(right),
                span,
            });
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.equality()?;
        while self.match_token(TokenKind::And) {
            let right = self.equality()?;
            let span = expr.span().to(right.span());
            expr = Expr::Logical(LogicalExpr {
                left: Box::new(expr),
                operator: LogicalOp::And,
                right: Box::new(right),
                span,
            });
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.comparison()?;
        while let Some(op) = self.match_binary_op(&[TokenKind::EqualEqual, TokenKind::BangEqual]) {
            let right = self.comparison()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.term()?;
        while let Some(op) = self.match_binary_op(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let right = self.term()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.factor()?;
        while let Some(op) = self.match_binary_op(&[TokenKind::Plus, TokenKind::Minus]) {
            let right = self.factor()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.unary()?;
        while let Some(op) = self.match_binary_op(&[TokenKind::Star, TokenKind::Slash]) {
            let right = self.unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let operator = match self.current.kind {
            TokenKind::Bang | TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.primary(),
        };
        let start = self.current_span();
        self.advance();
        let operand = self.nested(Self::unary)?;
        let span = start.to(operand.span());
        Ok(Expr::Unary(UnaryExpr {
            operator,
            operand: Box::new(operand),
            span,
        }))
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.current;
        let value = match token.kind {
            TokenKind::I64 => {
                let n = token
                    .lexeme
                    .parse::<u64>()
                    .map_err(|_| self.error_at_current("integer literal is too large"))?;
                LiteralValue::Integer(n)
            }
            TokenKind::F64 => {
                let n = token
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| self.error_at_current("invalid float literal"))?;
                LiteralValue::Float(n)
            }
            TokenKind::String => {
                let text = &token.lexeme[1..token.lexeme.len() - 1];
                LiteralValue::String(text.to_string())
            }
            TokenKind::True => LiteralValue::Bool(true),
            TokenKind::False => LiteralValue::Bool(false),
            TokenKind::Nil => LiteralValue::Nil,
            TokenKind::Identifier => {
                self.advance();
                return Ok(Expr::Variable(VariableExpr {
                    name: token.lexeme.to_string(),
                    span: token.span(),
                }));
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "')' after expression")?;
                let span = self.span_from(token.span());
                return Ok(Expr::Grouping(GroupingExpr {
                    expression: Box::new(expr),
                    span,
                }));
            }
            _ => return Err(self.error_at_current("expected expression")),
        };
        self.advance();
        Ok(Expr::Literal(LiteralExpr {
            value,
            span: token.span(),
        }))
    }

    // --- Helper methods ---

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    /// Move to the next non-error token, reporting error tokens on the way.
    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let token = self.current;
            self.report(CompileError::lex(
                token.lexeme,
                token.line,
                token.offset,
                token.width(),
            ));
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_binary_op(&mut self, kinds: &[TokenKind]) -> Option<BinaryOp> {
        let kind = self.current.kind;
        if !kinds.contains(&kind) {
            return None;
        }
        self.advance();
        token_to_binary_op(kind)
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<(), CompileError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_at_current(&format!("expected {message}")))
        }
    }

    fn expect_identifier(&mut self, context: &str) -> Result<String, CompileError> {
        if self.check(TokenKind::Identifier) {
            let name = self.current.lexeme.to_string();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_at_current(&format!("expected {context}")))
        }
    }

    fn error_at_current(&self, message: &str) -> CompileError {
        let token = self.current;
        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            _ => format!(" at '{}'", token.lexeme),
        };
        CompileError::parse(message, location, token.line, token.offset, token.width())
    }

    fn report(&mut self, error: CompileError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors.push(error);
    }

    /// Run `parse` one nesting level deeper, failing once the input nests
    /// past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.nesting >= MAX_NESTING {
            self.halted = true;
            return Err(self.error_at_current("nesting is too deep"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn current_span(&self) -> Span {
        self.current.span()
    }

    fn span_from(&self, start: Span) -> Span {
        start.to(self.previous.span())
    }

    /// Skip to the next statement boundary. `start` is the offset where the
    /// failed declaration began; if nothing was consumed since, the
    /// offending token is skipped so parsing always moves forward. Panic
    /// mode stays on while skipping, so error tokens passed over here are
    /// not reported. After a nesting overflow the rest of the input is
    /// skipped and panic mode never clears.
    fn synchronize(&mut self, start: usize) {
        if self.halted {
            while !self.is_at_end() {
                self.advance();
            }
            return;
        }
        if self.current.offset == start && !self.is_at_end() {
            self.advance();
        }
        while !self.is_at_end() && !self.at_boundary() {
            self.advance();
        }
        self.panic_mode = false;
    }

    fn at_boundary(&self) -> bool {
        match self.current.kind {
            TokenKind::Define
            | TokenKind::Print
            | TokenKind::Set
            | TokenKind::If
            | TokenKind::While
            | TokenKind::For
            | TokenKind::LeftBrace => true,
            TokenKind::End | TokenKind::Else | TokenKind::RightBrace => self.depth > 0,
            _ => false,
        }
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    let span = left.span().to(right.span());
    Expr::Binary(BinaryExpr {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        span,
    })
}

fn token_to_binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::EqualEqual => BinaryOp::Equal,
        TokenKind::BangEqual => BinaryOp::NotEqual,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
        _ => return None,
    };
    Some(op)
}
