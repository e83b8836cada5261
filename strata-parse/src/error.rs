#![forbid(unsafe_code)]

use miette::Diagnostic;
use strata_ast::Span;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(strata::parse))]
pub struct ParseError {
    pub message: String,
    #[label]
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}
