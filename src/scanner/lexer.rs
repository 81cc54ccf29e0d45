use winnow::ascii::digit1;
use winnow::combinator::{alt, opt};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_while};

use crate::scanner::token::{Token, TokenKind, keyword_kind};

type Input<'a> = &'a str;

fn whitespace<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    take_while(0.., |c: char| {
        c == ' ' || c == '\t' || c == '\r' || c == '\n'
    })
    .parse_next(input)
}

fn line_comment<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    ("--", take_till(0.., '\n')).take().parse_next(input)
}

fn string_literal(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    ('"', take_till(0.., '"'), '"')
        .value(TokenKind::String)
        .parse_next(input)
}

fn number_literal(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    (digit1, opt(('.', digit1)))
        .map(|(_, fraction): (&str, Option<(char, &str)>)| {
            if fraction.is_some() {
                TokenKind::F64
            } else {
                TokenKind::I64
            }
        })
        .parse_next(input)
}

fn identifier_or_keyword(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .map(|ident: &str| keyword_kind(ident).unwrap_or(TokenKind::Identifier))
        .parse_next(input)
}

fn two_char_token(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((
        "!=".value(TokenKind::BangEqual),
        "==".value(TokenKind::EqualEqual),
        ">=".value(TokenKind::GreaterEqual),
        "<=".value(TokenKind::LessEqual),
    ))
    .parse_next(input)
}

fn single_char_kind(c: char) -> Option<TokenKind> {
    let kind = match c {
        '{' => TokenKind::LeftBrace,
        '}' => TokenKind::RightBrace,
        '(' => TokenKind::LeftParen,
        ')' => TokenKind::RightParen,
        ':' => TokenKind::Colon,
        ',' => TokenKind::Comma,
        '-' => TokenKind::Minus,
        '+' => TokenKind::Plus,
        '/' => TokenKind::Slash,
        '*' => TokenKind::Star,
        '!' => TokenKind::Bang,
        '=' => TokenKind::Equal,
        '<' => TokenKind::Less,
        '>' => TokenKind::Greater,
        _ => return None,
    };
    Some(kind)
}

fn single_char_token(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    any.verify_map(single_char_kind).parse_next(input)
}

fn token_kind(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((
        string_literal,
        number_literal,
        identifier_or_keyword,
        two_char_token,
        single_char_token,
    ))
    .parse_next(input)
}

fn newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// On-demand tokenizer over a borrowed source buffer.
///
/// Each call to [`Lexer::scan_token`] yields one token; once the input is
/// exhausted every further call yields `Eof`. Lexical problems never abort
/// scanning, they come back as [`TokenKind::Error`] tokens whose lexeme is
/// the message.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    rest: Input<'a>,
    line: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            rest: source,
            line: 1,
            finished: false,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn skip_trivia(&mut self) {
        loop {
            let blank = whitespace.parse_next(&mut self.rest).unwrap_or_default();
            self.line += newlines(blank);
            let comment = opt(line_comment).parse_next(&mut self.rest).ok().flatten();
            if blank.is_empty() && comment.is_none() {
                break;
            }
        }
    }

    pub fn scan_token(&mut self) -> Token<'a> {
        self.skip_trivia();
        let offset = self.offset();
        if self.rest.is_empty() {
            return Token::new(TokenKind::Eof, "", self.line, offset);
        }

        let before = self.rest;
        match token_kind.parse_next(&mut self.rest) {
            Ok(kind) => {
                let lexeme = &before[..before.len() - self.rest.len()];
                if kind == TokenKind::String {
                    self.line += newlines(lexeme);
                }
                Token::new(kind, lexeme, self.line, offset)
            }
            Err(_) if before.starts_with('"') => {
                self.line += newlines(before);
                self.rest = &before[before.len()..];
                Token::new(TokenKind::Error, "Unterminated string", self.line, offset)
            }
            Err(_) => {
                let width = before.chars().next().map_or(0, char::len_utf8);
                self.rest = &before[width..];
                Token::new(TokenKind::Error, "Unexpected character", self.line, offset)
            }
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.scan_token();
        if token.kind == TokenKind::Eof {
            self.finished = true;
        }
        Some(token)
    }
}

/// Tokenize the whole source, including the trailing `Eof`.
pub fn scan_all(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source).collect()
}
