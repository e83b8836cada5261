#![forbid(unsafe_code)]

use logos::Logos;
use strata_ast::{Pos, Span};

use crate::token::{Token, TokenKind};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r";[^\n]*")]
enum RawToken {
    #[token("mod")]
    KwMod,
    #[token("fn")]
    KwFn,
    #[token("type")]
    KwType,
    #[token("role")]
    KwRole,
    #[token("permission")]
    KwPermission,
    #[token("policy")]
    KwPolicy,
    #[token("body")]
    KwBody,
    #[token("let")]
    KwLet,
    #[token("if")]
    KwIf,
    #[token("cond")]
    KwCond,
    #[token("match")]
    KwMatch,
    #[token("do")]
    KwDo,
    #[token("lambda")]
    KwLambda,

    #[token("true")]
    True,
    #[token("false")]
    False,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,
    #[token("?")]
    Question,
    #[token("->")]
    Arrow,

    #[token("+")]
    Plus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,

    // `:v` followed by at least one digit starts a version marker; dots,
    // digits, a `-prerelease` and a `+build` tail belong to it.
    #[regex(r":v[0-9]+(\.[0-9]+)*(-[A-Za-z0-9.\-]+)?(\+[A-Za-z0-9.\-]+)?", priority = 10)]
    VersionMarker,

    // Any other `:name` is an attribute key.
    #[regex(r":[A-Za-z_][A-Za-z0-9_\-]*")]
    KeywordMarker,

    // A leading `-` is part of the number only when a digit follows;
    // otherwise it starts an identifier. `-5` matches both rules at the same
    // length, so the number rule outranks the identifier rule.
    #[regex(r"-?[0-9]+(\.[0-9]+)?", priority = 5)]
    Number,

    // Double-quoted; a backslash always consumes the following character.
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    #[regex(r"[A-Za-z_\-][A-Za-z0-9_\-]*")]
    Ident,
}

/// Byte-offset to line/column mapping, precomputed once per source.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    fn pos(&self, offset: usize) -> Pos {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        Pos {
            line: line as u32 + 1,
            column: (offset - self.line_starts[line]) as u32 + 1,
            offset,
        }
    }
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    /// Lex the full source. Unknown characters become `Invalid` tokens rather
    /// than errors; a trailing `Eof` token is always present.
    pub fn lex(&self) -> Vec<Token> {
        let index = LineIndex::new(self.src);
        let mut tokens = Vec::new();
        let mut lex = RawToken::lexer(self.src);

        while let Some(raw) = lex.next() {
            let range = lex.span();
            let text = lex.slice();
            let span = Span::new(index.pos(range.start), index.pos(range.end));

            let kind = match raw {
                Ok(RawToken::KwMod) => TokenKind::KwMod,
                Ok(RawToken::KwFn) => TokenKind::KwFn,
                Ok(RawToken::KwType) => TokenKind::KwType,
                Ok(RawToken::KwRole) => TokenKind::KwRole,
                Ok(RawToken::KwPermission) => TokenKind::KwPermission,
                Ok(RawToken::KwPolicy) => TokenKind::KwPolicy,
                Ok(RawToken::KwBody) => TokenKind::KwBody,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwCond) => TokenKind::KwCond,
                Ok(RawToken::KwMatch) => TokenKind::KwMatch,
                Ok(RawToken::KwDo) => TokenKind::KwDo,
                Ok(RawToken::KwLambda) => TokenKind::KwLambda,

                Ok(RawToken::True) => TokenKind::Bool(true),
                Ok(RawToken::False) => TokenKind::Bool(false),

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Dot) => TokenKind::Dot,
                Ok(RawToken::Pipe) => TokenKind::Pipe,
                Ok(RawToken::Question) => TokenKind::Question,
                Ok(RawToken::Arrow) => TokenKind::Arrow,

                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::Slash) => TokenKind::Slash,
                Ok(RawToken::Percent) => TokenKind::Percent,
                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::EqEq) => TokenKind::EqEq,
                Ok(RawToken::Neq) => TokenKind::Neq,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Gt) => TokenKind::Gt,
                Ok(RawToken::Ge) => TokenKind::Ge,

                Ok(RawToken::VersionMarker) => TokenKind::VersionMarker(text[1..].to_string()),
                Ok(RawToken::KeywordMarker) => TokenKind::KeywordMarker(text[1..].to_string()),
                Ok(RawToken::Number) => TokenKind::Number(text.to_string()),
                Ok(RawToken::Str) => TokenKind::Str(text.to_string()),
                Ok(RawToken::Ident) => TokenKind::Ident(text.to_string()),

                Err(_) => TokenKind::Invalid(text.to_string()),
            };

            tokens.push(Token { kind, span });
        }

        let eof = index.pos(self.src.len());
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(eof, eof),
        });

        tokens
    }
}

/// Convenience entry point: lex and drop `Invalid` tokens. Pipelines that
/// report diagnostics should call [`Lexer::lex`] and inspect the stream.
pub fn tokenize(src: &str) -> Vec<Token> {
    Lexer::new(src)
        .lex()
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Invalid(_)))
        .collect()
}
