#![forbid(unsafe_code)]

use std::fmt::Write;

use crate::module::{BytecodeFunction, BytecodeModule};

/// Render one function as `offset  MNEMONIC operands` lines.
pub fn disassemble_function(func: &BytecodeFunction) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "fn {}:{} arity={} locals={}{}",
        func.name,
        func.version,
        func.arity,
        func.local_count,
        if func.pure { " pure" } else { "" }
    );
    if !func.required_roles.is_empty() {
        let _ = writeln!(out, "  requires: {}", func.required_roles.join(", "));
    }
    for (effect, target) in &func.effects {
        let _ = writeln!(out, "  effect: {effect} {target}");
    }
    for (offset, instr) in func.instructions.iter().enumerate() {
        let _ = writeln!(out, "  {offset:04}  {instr}");
    }
    out
}

pub fn disassemble_module(module: &BytecodeModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "module {} v{}", module.name, module.version);
    for func in module.functions.values() {
        out.push('\n');
        out.push_str(&disassemble_function(func));
    }
    out
}
