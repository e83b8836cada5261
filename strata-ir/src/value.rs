#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_ast::DataClassification;

/// A tagged runtime value. Equality is structural and never crosses tags;
/// `Int` and `Float` are distinct even when numerically equal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "value", rename_all = "snake_case")]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record {
        type_name: String,
        fields: BTreeMap<String, Value>,
        classification: Option<DataClassification>,
    },
    Variant {
        type_name: String,
        case: String,
        payload: Option<Box<Value>>,
    },
    FunctionRef {
        name: String,
        version: Option<String>,
    },
    Result(Result<Box<Value>, Box<Value>>),
    Option(Option<Box<Value>>),
}

impl Value {
    /// Integer construction truncates toward zero.
    pub fn int_from_f64(x: f64) -> Value {
        Value::Int(x.trunc() as i64)
    }

    pub fn ok(inner: Value) -> Value {
        Value::Result(Ok(Box::new(inner)))
    }

    pub fn err(inner: Value) -> Value {
        Value::Result(Err(Box::new(inner)))
    }

    pub fn some(inner: Value) -> Value {
        Value::Option(Some(Box::new(inner)))
    }

    pub fn none() -> Value {
        Value::Option(None)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record { .. } => "record",
            Value::Variant { .. } => "variant",
            Value::FunctionRef { .. } => "function_ref",
            Value::Result(_) => "result",
            Value::Option(_) => "option",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "unit"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Json(j) => write!(f, "{j}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Record {
                type_name, fields, ..
            } => {
                write!(f, "{type_name}{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Variant {
                type_name,
                case,
                payload,
            } => match payload {
                Some(p) => write!(f, "{type_name}.{case}({p})"),
                None => write!(f, "{type_name}.{case}"),
            },
            Value::FunctionRef { name, version } => match version {
                Some(v) => write!(f, "#{name}:{v}"),
                None => write!(f, "#{name}"),
            },
            Value::Result(Ok(v)) => write!(f, "ok({v})"),
            Value::Result(Err(e)) => write!(f, "err({e})"),
            Value::Option(Some(v)) => write!(f, "some({v})"),
            Value::Option(None) => write!(f, "none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_never_compare_equal() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Int(1), Value::Int(1));
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
    }

    #[test]
    fn int_construction_truncates_toward_zero() {
        assert_eq!(Value::int_from_f64(3.9), Value::Int(3));
        assert_eq!(Value::int_from_f64(-3.9), Value::Int(-3));
    }

    #[test]
    fn record_equality_includes_type_name() {
        let fields: BTreeMap<String, Value> =
            [("x".to_string(), Value::Int(1))].into_iter().collect();
        let a = Value::Record {
            type_name: "Point".to_string(),
            fields: fields.clone(),
            classification: None,
        };
        let b = Value::Record {
            type_name: "Vector".to_string(),
            fields,
            classification: None,
        };
        assert_ne!(a, b);
    }

    #[test]
    fn result_and_option_constructors() {
        assert_eq!(
            Value::ok(Value::Int(1)),
            Value::Result(Ok(Box::new(Value::Int(1))))
        );
        assert_eq!(Value::none(), Value::Option(None));
        assert_eq!(Value::some(Value::Unit).tag(), "option");
    }
}
