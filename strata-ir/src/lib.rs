#![forbid(unsafe_code)]

mod builder;
mod disasm;
mod instr;
mod module;
mod value;

pub use builder::{BuildError, FunctionBuilder, JumpKind, Label};
pub use disasm::{disassemble_function, disassemble_module};
pub use instr::{Instruction, Opcode};
pub use module::{BytecodeFunction, BytecodeModule, FieldInfo, TypeTableEntry};
pub use value::Value;
