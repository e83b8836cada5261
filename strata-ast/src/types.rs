#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Int,
    Float,
    String,
    Bool,
    Unit,
    Bytes,
    Uuid,
    Timestamp,
    Json,
}

impl PrimitiveType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int" => Some(PrimitiveType::Int),
            "float" => Some(PrimitiveType::Float),
            "string" => Some(PrimitiveType::String),
            "bool" => Some(PrimitiveType::Bool),
            "unit" => Some(PrimitiveType::Unit),
            "bytes" => Some(PrimitiveType::Bytes),
            "uuid" => Some(PrimitiveType::Uuid),
            "timestamp" => Some(PrimitiveType::Timestamp),
            "json" => Some(PrimitiveType::Json),
            _ => None,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            PrimitiveType::Int => "int",
            PrimitiveType::Float => "float",
            PrimitiveType::String => "string",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Unit => "unit",
            PrimitiveType::Bytes => "bytes",
            PrimitiveType::Uuid => "uuid",
            PrimitiveType::Timestamp => "timestamp",
            PrimitiveType::Json => "json",
        }
    }
}

/// Builtin generic heads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenericHead {
    List,
    Map,
    Option,
    Result,
}

impl GenericHead {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "List" => Some(GenericHead::List),
            "Map" => Some(GenericHead::Map),
            "Option" => Some(GenericHead::Option),
            "Result" => Some(GenericHead::Result),
            _ => None,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            GenericHead::List => "List",
            GenericHead::Map => "Map",
            GenericHead::Option => "Option",
            GenericHead::Result => "Result",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    Primitive(PrimitiveType),
    Generic {
        head: GenericHead,
        args: Vec<TypeExpr>,
    },
    Named(String),
}

impl TypeExpr {
    /// Resolve a bare name to a primitive, generic head, or named type.
    pub fn from_name(name: &str) -> TypeExpr {
        if let Some(p) = PrimitiveType::parse(name) {
            return TypeExpr::Primitive(p);
        }
        if let Some(head) = GenericHead::parse(name) {
            return TypeExpr::Generic {
                head,
                args: Vec::new(),
            };
        }
        TypeExpr::Named(name.to_string())
    }

    pub fn primitive_named(name: &str) -> Option<TypeExpr> {
        PrimitiveType::parse(name).map(TypeExpr::Primitive)
    }
}

// The rendered form is the comparison key for signature compatibility, so it
// must be stable across releases.
impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Primitive(p) => f.write_str(p.display()),
            TypeExpr::Generic { head, args } => {
                f.write_str(head.display())?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeExpr::Named(n) => f.write_str(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_resolve() {
        assert_eq!(
            TypeExpr::from_name("int"),
            TypeExpr::Primitive(PrimitiveType::Int)
        );
        assert!(matches!(
            TypeExpr::from_name("List"),
            TypeExpr::Generic {
                head: GenericHead::List,
                ..
            }
        ));
        assert_eq!(
            TypeExpr::from_name("User"),
            TypeExpr::Named("User".to_string())
        );
    }

    #[test]
    fn display_is_stable() {
        let t = TypeExpr::Generic {
            head: GenericHead::Map,
            args: vec![
                TypeExpr::Primitive(PrimitiveType::String),
                TypeExpr::Generic {
                    head: GenericHead::List,
                    args: vec![TypeExpr::Primitive(PrimitiveType::Int)],
                },
            ],
        };
        assert_eq!(t.to_string(), "Map<string, List<int>>");
    }
}
