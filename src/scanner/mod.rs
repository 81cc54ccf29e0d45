pub mod lexer;
pub mod token;

pub use lexer::Lexer;
use token::Token;

/// Scan source code into a list of tokens ending with `Eof`.
pub fn scan(source: &str) -> Vec<Token<'_>> {
    lexer::scan_all(source)
}
