#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_ast::Span;

use crate::value::Value;

/// The stack machine's opcode set. Jump targets are absolute instruction
/// offsets within the owning function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    // Stack and variables
    Push(Value),
    Pop,
    Dup,
    Swap,
    LoadVar(String),
    /// Binds the top of stack to a local without popping it.
    StoreVar(String),
    LoadArg(usize),

    // Calls and control flow
    Call {
        name: String,
        version: Option<String>,
        arity: usize,
    },
    CallNative {
        name: String,
        arity: usize,
    },
    Return,
    Jump(usize),
    JumpIfFalse(usize),
    JumpIfTrue(usize),
    Halt,

    // Arithmetic
    Add,
    Sub,
    Mul,
    /// Division by zero pushes `err("Division by zero")` instead of raising.
    Div,
    Mod,
    Neg,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logic
    And,
    Or,
    Not,

    // Effects
    ExecEffect {
        handler: String,
        operation: String,
        param_count: usize,
        audit_required: bool,
        resource: Option<String>,
    },

    // Constructors and accessors
    MakeOk,
    MakeErr,
    MakeSome,
    MakeNone,
    MakeList(usize),
    MakeMap(usize),
    ConstructRecord {
        type_name: String,
        field_count: usize,
    },
    AccessField(String),
    ConstructVariant {
        type_name: String,
        case: String,
    },
    MatchVariant {
        type_name: String,
        case: String,
    },

    // Sequences
    ListGet,
    ListLen,
    ListSet,
    ListAppend,
    MapGet,
    MapSet,
    MapHas,

    // Strings
    StrConcat,
    StrLen,

    /// Prints the top of stack without popping.
    DebugPrint,
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Push(_) => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Swap => "SWAP",
            Opcode::LoadVar(_) => "LOAD_VAR",
            Opcode::StoreVar(_) => "STORE_VAR",
            Opcode::LoadArg(_) => "LOAD_ARG",
            Opcode::Call { .. } => "CALL",
            Opcode::CallNative { .. } => "CALL_NATIVE",
            Opcode::Return => "RETURN",
            Opcode::Jump(_) => "JUMP",
            Opcode::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Opcode::JumpIfTrue(_) => "JUMP_IF_TRUE",
            Opcode::Halt => "HALT",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Neg => "NEG",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::ExecEffect { .. } => "EXEC_EFFECT",
            Opcode::MakeOk => "MAKE_OK",
            Opcode::MakeErr => "MAKE_ERR",
            Opcode::MakeSome => "MAKE_SOME",
            Opcode::MakeNone => "MAKE_NONE",
            Opcode::MakeList(_) => "MAKE_LIST",
            Opcode::MakeMap(_) => "MAKE_MAP",
            Opcode::ConstructRecord { .. } => "CONSTRUCT_RECORD",
            Opcode::AccessField(_) => "ACCESS_FIELD",
            Opcode::ConstructVariant { .. } => "CONSTRUCT_VARIANT",
            Opcode::MatchVariant { .. } => "MATCH_VARIANT",
            Opcode::ListGet => "LIST_GET",
            Opcode::ListLen => "LIST_LEN",
            Opcode::ListSet => "LIST_SET",
            Opcode::ListAppend => "LIST_APPEND",
            Opcode::MapGet => "MAP_GET",
            Opcode::MapSet => "MAP_SET",
            Opcode::MapHas => "MAP_HAS",
            Opcode::StrConcat => "STR_CONCAT",
            Opcode::StrLen => "STR_LEN",
            Opcode::DebugPrint => "DEBUG_PRINT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub span: Option<Span>,
}

impl Instruction {
    pub fn new(op: Opcode) -> Self {
        Self { op, span: None }
    }

    pub fn with_span(op: Opcode, span: Span) -> Self {
        Self {
            op,
            span: Some(span),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            Opcode::Push(v) => write!(f, "PUSH {}({v})", v.tag()),
            Opcode::LoadVar(name) | Opcode::StoreVar(name) | Opcode::AccessField(name) => {
                write!(f, "{} {name}", self.op.mnemonic())
            }
            Opcode::LoadArg(i) => write!(f, "LOAD_ARG {i}"),
            Opcode::Call {
                name,
                version,
                arity,
            } => match version {
                Some(v) => write!(f, "CALL {name}:{v}/{arity}"),
                None => write!(f, "CALL {name}/{arity}"),
            },
            Opcode::CallNative { name, arity } => write!(f, "CALL_NATIVE {name}/{arity}"),
            Opcode::Jump(t) | Opcode::JumpIfFalse(t) | Opcode::JumpIfTrue(t) => {
                write!(f, "{} {t:04}", self.op.mnemonic())
            }
            Opcode::ExecEffect {
                handler,
                operation,
                param_count,
                ..
            } => write!(f, "EXEC_EFFECT {handler}.{operation}/{param_count}"),
            Opcode::MakeList(n) => write!(f, "MAKE_LIST {n}"),
            Opcode::MakeMap(n) => write!(f, "MAKE_MAP {n}"),
            Opcode::ConstructRecord {
                type_name,
                field_count,
            } => write!(f, "CONSTRUCT_RECORD {type_name}/{field_count}"),
            Opcode::ConstructVariant { type_name, case }
            | Opcode::MatchVariant { type_name, case } => {
                write!(f, "{} {type_name}.{case}", self.op.mnemonic())
            }
            other => f.write_str(other.mnemonic()),
        }
    }
}
