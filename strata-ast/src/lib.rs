#![forbid(unsafe_code)]

mod ast;
mod types;

use serde::{Deserialize, Serialize};

pub use ast::{
    BinaryOperator, DataClassification, EffectDecl, Expr, FieldDef, FunctionDecl, Literal,
    MatchCase, Module, ModuleElement, Param, Pattern, PermissionDecl, PolicyDecl, PolicyRule,
    RoleDecl, RuleEffect, RuleVersionConstraint, ScopeEntry, Stability, TypeDefDecl, UnaryOperator,
    VersionInfo,
};
pub use types::{GenericHead, PrimitiveType, TypeExpr};

/// A position in the source text. Lines and columns are 1-based, the byte
/// offset is 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Pos {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl Default for Pos {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

/// A half-open source range from `start` to `end`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Self {
        debug_assert!(end.offset >= start.offset);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.offset - self.start.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(&self, other: Span) -> Span {
        let start = if self.start.offset <= other.start.offset {
            self.start
        } else {
            other.start
        };
        let end = if self.end.offset >= other.end.offset {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::new(span.start.offset.into(), span.len())
    }
}
