#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use strata_ast::Span;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Keywords
    KwMod,
    KwFn,
    KwType,
    KwRole,
    KwPermission,
    KwPolicy,
    KwBody,
    KwLet,
    KwIf,
    KwCond,
    KwMatch,
    KwDo,
    KwLambda,

    // Structural delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Pipe,
    Question,
    Arrow,

    // Operator symbols. `-` is absent: a minus not followed by a digit lexes
    // as the identifier "-".
    Plus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,

    /// `:v1.2.3-beta+build` with the leading colon stripped.
    VersionMarker(String),
    /// `:inputs` with the leading colon stripped.
    KeywordMarker(String),

    Ident(String),
    /// Raw number text; integer-or-float discrimination happens in the parser.
    Number(String),
    /// String literal text including the surrounding quotes; escapes are kept
    /// verbatim.
    Str(String),
    Bool(bool),

    /// A character the lexer does not recognize.
    Invalid(String),
    Eof,
}

impl TokenKind {
    pub fn display(&self) -> String {
        match self {
            TokenKind::KwMod => "mod".to_string(),
            TokenKind::KwFn => "fn".to_string(),
            TokenKind::KwType => "type".to_string(),
            TokenKind::KwRole => "role".to_string(),
            TokenKind::KwPermission => "permission".to_string(),
            TokenKind::KwPolicy => "policy".to_string(),
            TokenKind::KwBody => "body".to_string(),
            TokenKind::KwLet => "let".to_string(),
            TokenKind::KwIf => "if".to_string(),
            TokenKind::KwCond => "cond".to_string(),
            TokenKind::KwMatch => "match".to_string(),
            TokenKind::KwDo => "do".to_string(),
            TokenKind::KwLambda => "lambda".to_string(),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
            TokenKind::LBracket => "[".to_string(),
            TokenKind::RBracket => "]".to_string(),
            TokenKind::LBrace => "{".to_string(),
            TokenKind::RBrace => "}".to_string(),
            TokenKind::Comma => ",".to_string(),
            TokenKind::Dot => ".".to_string(),
            TokenKind::Pipe => "|".to_string(),
            TokenKind::Question => "?".to_string(),
            TokenKind::Arrow => "->".to_string(),
            TokenKind::Plus => "+".to_string(),
            TokenKind::Star => "*".to_string(),
            TokenKind::Slash => "/".to_string(),
            TokenKind::Percent => "%".to_string(),
            TokenKind::Eq => "=".to_string(),
            TokenKind::EqEq => "==".to_string(),
            TokenKind::Neq => "!=".to_string(),
            TokenKind::Lt => "<".to_string(),
            TokenKind::Le => "<=".to_string(),
            TokenKind::Gt => ">".to_string(),
            TokenKind::Ge => ">=".to_string(),
            TokenKind::VersionMarker(v) => format!(":{v}"),
            TokenKind::KeywordMarker(k) => format!(":{k}"),
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Number(n) => n.clone(),
            TokenKind::Str(s) => s.clone(),
            TokenKind::Bool(b) => b.to_string(),
            TokenKind::Invalid(c) => c.clone(),
            TokenKind::Eof => "<eof>".to_string(),
        }
    }
}
