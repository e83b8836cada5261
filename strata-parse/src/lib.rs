#![forbid(unsafe_code)]

mod error;
mod parser;

use strata_lex::{tokenize, Token};

pub use error::ParseError;
pub use parser::Parser;

/// Lex (dropping invalid tokens) and parse a single module.
pub fn parse_source(src: &str) -> Result<strata_ast::Module, ParseError> {
    let tokens = tokenize(src);
    Parser::new(&tokens).parse_module()
}

/// Parse a module from an existing token stream.
pub fn parse_tokens(tokens: &[Token]) -> Result<strata_ast::Module, ParseError> {
    Parser::new(tokens).parse_module()
}

/// Parse a single expression; used by tests and the REPL-style tooling.
pub fn parse_expr(src: &str) -> Result<strata_ast::Expr, ParseError> {
    let tokens = tokenize(src);
    Parser::new(&tokens).parse_expr()
}
