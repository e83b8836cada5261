#![forbid(unsafe_code)]

use strata_ast::Span;
use thiserror::Error;

use crate::instr::{Instruction, Opcode};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("label {0} was never placed")]
    UnplacedLabel(usize),
}

/// A jump destination handed out before its offset is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Clone, Copy, Debug)]
pub enum JumpKind {
    Jump,
    JumpIfFalse,
    JumpIfTrue,
}

/// Accumulates one function's instruction stream. Forward jumps emit a
/// placeholder target that is patched to an absolute offset in [`finish`].
///
/// [`finish`]: FunctionBuilder::finish
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    patches: Vec<(usize, Label)>,
}

impl FunctionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn emit(&mut self, op: Opcode, span: Option<Span>) {
        self.instructions.push(Instruction { op, span });
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next instruction offset.
    pub fn place_label(&mut self, label: Label) {
        self.labels[label.0] = Some(self.instructions.len());
    }

    pub fn emit_jump(&mut self, kind: JumpKind, label: Label, span: Option<Span>) {
        let op = match kind {
            JumpKind::Jump => Opcode::Jump(usize::MAX),
            JumpKind::JumpIfFalse => Opcode::JumpIfFalse(usize::MAX),
            JumpKind::JumpIfTrue => Opcode::JumpIfTrue(usize::MAX),
        };
        self.patches.push((self.instructions.len(), label));
        self.emit(op, span);
    }

    /// Resolve every recorded jump to its label's absolute offset.
    pub fn finish(mut self) -> Result<Vec<Instruction>, BuildError> {
        for (index, label) in self.patches {
            let target = self.labels[label.0].ok_or(BuildError::UnplacedLabel(label.0))?;
            match &mut self.instructions[index].op {
                Opcode::Jump(t) | Opcode::JumpIfFalse(t) | Opcode::JumpIfTrue(t) => *t = target,
                other => unreachable!("patched instruction is not a jump: {other:?}"),
            }
        }
        Ok(self.instructions)
    }
}
