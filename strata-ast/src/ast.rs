#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::types::TypeExpr;
use crate::Span;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub elements: Vec<ModuleElement>,
    pub span: Span,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.elements.iter().filter_map(|e| match e {
            ModuleElement::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn type_defs(&self) -> impl Iterator<Item = &TypeDefDecl> {
        self.elements.iter().filter_map(|e| match e {
            ModuleElement::TypeDef(t) => Some(t),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ModuleElement {
    Function(FunctionDecl),
    TypeDef(TypeDefDecl),
    Role(RoleDecl),
    Permission(PermissionDecl),
    Policy(PolicyDecl),
    // Reserved element kinds; the grammar does not produce these yet.
    Channel { name: String, span: Span },
    Contract { name: String, span: Span },
    Import { name: String, span: Span },
    Export { name: String, span: Span },
}

/// Release stability of a versioned entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    #[default]
    Stable,
    Beta,
    Alpha,
    Deprecated,
}

impl Stability {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stable" => Some(Stability::Stable),
            "beta" => Some(Stability::Beta),
            "alpha" => Some(Stability::Alpha),
            "deprecated" => Some(Stability::Deprecated),
            _ => None,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::Beta => "beta",
            Stability::Alpha => "alpha",
            Stability::Deprecated => "deprecated",
        }
    }
}

/// Version annotation carried by functions and type definitions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Raw version text as written, e.g. `1.2.0` or `2.0.0-beta.1`.
    pub version: String,
    pub stability: Stability,
    /// Version string of the entity this one replaces.
    pub replaces: Option<String>,
    pub rollback_safe: Option<bool>,
    pub deprecated: bool,
}

/// The four-level data sensitivity order, ascending restrictiveness.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataClassification {
    #[default]
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl DataClassification {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(DataClassification::Public),
            "internal" => Some(DataClassification::Internal),
            "confidential" => Some(DataClassification::Confidential),
            "restricted" => Some(DataClassification::Restricted),
            _ => None,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            DataClassification::Public => "public",
            DataClassification::Internal => "internal",
            DataClassification::Confidential => "confidential",
            DataClassification::Restricted => "restricted",
        }
    }

    /// True for the two levels that must never appear verbatim in audit output.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            DataClassification::Confidential | DataClassification::Restricted
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub classification: Option<DataClassification>,
    pub span: Span,
}

/// A declared runtime capability, e.g. `(db.read users)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDecl {
    pub effect_type: String,
    pub target: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub version: Option<VersionInfo>,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    pub pure: bool,
    pub idempotent: bool,
    pub required_roles: Vec<String>,
    pub required_permissions: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub audit_required: bool,
    pub handles_secrets: bool,
    pub effects: Vec<EffectDecl>,
    pub body: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeExpr,
    pub classification: Option<DataClassification>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeDefDecl {
    pub name: String,
    pub version: Option<VersionInfo>,
    pub fields: Vec<FieldDef>,
    pub span: Span,
}

impl TypeDefDecl {
    /// Ordinal maximum over the field classifications.
    pub fn max_classification(&self) -> DataClassification {
        self.fields
            .iter()
            .filter_map(|f| f.classification)
            .max()
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleDecl {
    pub name: String,
    pub permissions: Vec<String>,
    pub inherits: Vec<String>,
    pub span: Span,
}

/// One `resource`/`action` scope pair on a permission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecl {
    pub name: String,
    pub doc: Option<String>,
    pub scope: Vec<ScopeEntry>,
    pub classification: Option<DataClassification>,
    pub audit_required: bool,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleEffect {
    Allow,
    Deny,
}

/// Version scope of a policy rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleVersionConstraint {
    AllVersions,
    StableOnly,
    Specific(Vec<String>),
    Range(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub effect: RuleEffect,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub version_constraint: RuleVersionConstraint,
    pub reason: Option<String>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecl {
    pub name: String,
    pub rules: Vec<PolicyRule>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(BinaryOperator::Add),
            "-" => Some(BinaryOperator::Sub),
            "*" => Some(BinaryOperator::Mul),
            "/" => Some(BinaryOperator::Div),
            "mod" | "%" => Some(BinaryOperator::Mod),
            "=" | "==" => Some(BinaryOperator::Eq),
            "!=" => Some(BinaryOperator::Ne),
            "<" => Some(BinaryOperator::Lt),
            "<=" => Some(BinaryOperator::Le),
            ">" => Some(BinaryOperator::Gt),
            ">=" => Some(BinaryOperator::Ge),
            "and" => Some(BinaryOperator::And),
            "or" => Some(BinaryOperator::Or),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Literal(Literal, Span),
    /// `(Shape.Circle r)` — matches a variant, optionally binding its payload.
    Constructor {
        type_name: String,
        case: String,
        binding: Option<String>,
        span: Span,
    },
    Wildcard(Span),
    Binding(String, Span),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub body: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal, Span),
    Identifier(String, Span),
    QualifiedName {
        parts: Vec<String>,
        version: Option<String>,
        span: Span,
    },
    Call {
        /// Dot-joined call target, e.g. `add` or `db.read`.
        target: String,
        version: Option<String>,
        args: Vec<Expr>,
        span: Span,
    },
    Let {
        bindings: Vec<(String, Expr)>,
        body: Vec<Expr>,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
        span: Span,
    },
    Cond {
        clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
        span: Span,
    },
    Match {
        scrutinee: Box<Expr>,
        cases: Vec<MatchCase>,
        span: Span,
    },
    Do {
        exprs: Vec<Expr>,
        span: Span,
    },
    /// Reserved; rejected during lowering.
    Lambda {
        params: Vec<String>,
        body: Vec<Expr>,
        span: Span,
    },
    BinaryOp {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, s)
            | Expr::Identifier(_, s)
            | Expr::QualifiedName { span: s, .. }
            | Expr::Call { span: s, .. }
            | Expr::Let { span: s, .. }
            | Expr::If { span: s, .. }
            | Expr::Cond { span: s, .. }
            | Expr::Match { span: s, .. }
            | Expr::Do { span: s, .. }
            | Expr::Lambda { span: s, .. }
            | Expr::BinaryOp { span: s, .. }
            | Expr::UnaryOp { span: s, .. } => *s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_order_is_ascending() {
        assert!(DataClassification::Public < DataClassification::Internal);
        assert!(DataClassification::Internal < DataClassification::Confidential);
        assert!(DataClassification::Confidential < DataClassification::Restricted);
    }

    #[test]
    fn max_classification_over_fields() {
        let ty = TypeDefDecl {
            name: "User".to_string(),
            version: None,
            fields: vec![
                FieldDef {
                    name: "name".to_string(),
                    ty: TypeExpr::primitive_named("string").unwrap(),
                    classification: Some(DataClassification::Public),
                    span: Span::default(),
                },
                FieldDef {
                    name: "ssn".to_string(),
                    ty: TypeExpr::primitive_named("string").unwrap(),
                    classification: Some(DataClassification::Restricted),
                    span: Span::default(),
                },
            ],
            span: Span::default(),
        };
        assert_eq!(ty.max_classification(), DataClassification::Restricted);
    }

    #[test]
    fn unclassified_type_defaults_to_public() {
        let ty = TypeDefDecl {
            name: "Point".to_string(),
            version: None,
            fields: vec![FieldDef {
                name: "x".to_string(),
                ty: TypeExpr::primitive_named("int").unwrap(),
                classification: None,
                span: Span::default(),
            }],
            span: Span::default(),
        };
        assert_eq!(ty.max_classification(), DataClassification::Public);
    }
}
