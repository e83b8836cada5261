#![forbid(unsafe_code)]

use std::collections::HashMap;

use miette::Diagnostic;
use strata_ast::{
    BinaryOperator, Expr, FunctionDecl, Literal, MatchCase, Module, ModuleElement, Pattern, Span,
    TypeDefDecl, UnaryOperator,
};
use strata_ir::{
    BytecodeFunction, BytecodeModule, FieldInfo, FunctionBuilder, JumpKind, Opcode, TypeTableEntry,
    Value,
};
use strata_version::Version;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("compile error: {message}")]
#[diagnostic(code(strata::lower))]
pub struct CompileError {
    pub message: String,
    #[label]
    pub span: Span,
}

impl CompileError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

const EFFECT_PREFIXES: &[&str] = &["db.", "http.", "fs.", "log.", "event."];

/// Compile every function and type of `module` into a bytecode module.
pub fn compile_module(module: &Module) -> Result<BytecodeModule, CompileError> {
    let mut out = BytecodeModule {
        name: module.name.clone(),
        version: "1.0.0".to_string(),
        ..BytecodeModule::default()
    };

    for element in &module.elements {
        match element {
            ModuleElement::TypeDef(ty) => {
                out.types.insert(ty.name.clone(), type_entry(ty));
            }
            ModuleElement::Role(r) => out.roles.push(r.clone()),
            ModuleElement::Permission(p) => out.permissions.push(p.clone()),
            ModuleElement::Policy(p) => out.policies.push(p.clone()),
            _ => {}
        }
    }
    // Types first so record construction can consult the table.
    for element in &module.elements {
        if let ModuleElement::Function(func) = element {
            let compiled = compile_function(func, &mut out)?;
            out.functions.insert(compiled.key(), compiled);
        }
    }
    Ok(out)
}

fn type_entry(ty: &TypeDefDecl) -> TypeTableEntry {
    TypeTableEntry {
        name: ty.name.clone(),
        fields: ty
            .fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name.clone(),
                ty: f.ty.to_string(),
                classification: f.classification,
            })
            .collect(),
        max_classification: ty.max_classification(),
    }
}

/// Compile one function body to a stack instruction stream.
pub fn compile_function(
    func: &FunctionDecl,
    module: &mut BytecodeModule,
) -> Result<BytecodeFunction, CompileError> {
    let version_key = match &func.version {
        Some(info) => Version::parse(&info.version)
            .map_err(|_| {
                CompileError::new(
                    format!(
                        "function '{}' has unparseable version '{}'",
                        func.name, info.version
                    ),
                    func.span,
                )
            })?
            .canonical_key(),
        None => "1.0.0".to_string(),
    };

    let mut fc = FunctionCompiler {
        builder: FunctionBuilder::new(),
        locals: HashMap::new(),
        next_slot: func.inputs.len(),
        arity: func.inputs.len(),
        func,
        module,
    };
    for (slot, param) in func.inputs.iter().enumerate() {
        fc.locals.insert(param.name.clone(), slot);
    }

    if func.body.is_empty() {
        fc.builder.emit(Opcode::Push(Value::Unit), Some(func.span));
    } else {
        let last = func.body.len() - 1;
        for (i, expr) in func.body.iter().enumerate() {
            fc.compile_expr(expr)?;
            if i != last {
                fc.builder.emit(Opcode::Pop, None);
            }
        }
    }
    fc.builder.emit(Opcode::Return, Some(func.span));

    let local_count = fc.next_slot - fc.arity;
    let instructions = fc
        .builder
        .finish()
        .map_err(|e| CompileError::new(e.to_string(), func.span))?;

    Ok(BytecodeFunction {
        name: func.name.clone(),
        version: version_key,
        arity: func.inputs.len(),
        instructions,
        required_roles: func.required_roles.clone(),
        effects: func
            .effects
            .iter()
            .map(|e| (e.effect_type.clone(), e.target.clone()))
            .collect(),
        pure: func.pure,
        idempotent: func.idempotent,
        local_count,
    })
}

struct FunctionCompiler<'a> {
    builder: FunctionBuilder,
    /// Name to slot; slots below `arity` are arguments.
    locals: HashMap<String, usize>,
    next_slot: usize,
    arity: usize,
    func: &'a FunctionDecl,
    module: &'a mut BytecodeModule,
}

impl<'a> FunctionCompiler<'a> {
    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit, span) => {
                let value = literal_value(lit);
                self.module.intern_constant(&value);
                self.builder.emit(Opcode::Push(value), Some(*span));
            }
            Expr::Identifier(name, span) => match self.locals.get(name) {
                Some(&slot) if slot < self.arity => {
                    self.builder.emit(Opcode::LoadArg(slot), Some(*span));
                }
                _ => {
                    self.builder.emit(Opcode::LoadVar(name.clone()), Some(*span));
                }
            },
            Expr::QualifiedName {
                parts,
                version,
                span,
            } => {
                self.builder.emit(
                    Opcode::Push(Value::FunctionRef {
                        name: parts.join("."),
                        version: version.clone(),
                    }),
                    Some(*span),
                );
            }
            Expr::Let {
                bindings,
                body,
                span,
            } => {
                for (name, value) in bindings {
                    self.compile_expr(value)?;
                    self.builder.emit(Opcode::StoreVar(name.clone()), Some(*span));
                    if !self.locals.contains_key(name) {
                        self.locals.insert(name.clone(), self.next_slot);
                        self.next_slot += 1;
                    }
                }
                let last = body.len() - 1;
                for (i, expr) in body.iter().enumerate() {
                    self.compile_expr(expr)?;
                    if i != last {
                        self.builder.emit(Opcode::Pop, None);
                    }
                }
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => {
                self.compile_expr(condition)?;
                let else_label = self.builder.new_label();
                let end_label = self.builder.new_label();
                self.builder
                    .emit_jump(JumpKind::JumpIfFalse, else_label, Some(*span));
                self.compile_expr(then_branch)?;
                self.builder.emit_jump(JumpKind::Jump, end_label, None);
                self.builder.place_label(else_label);
                match else_branch {
                    Some(e) => self.compile_expr(e)?,
                    None => self.builder.emit(Opcode::Push(Value::Unit), Some(*span)),
                }
                self.builder.place_label(end_label);
            }
            Expr::Cond {
                clauses,
                else_clause,
                span,
            } => {
                let end_label = self.builder.new_label();
                for (test, result) in clauses {
                    let next_label = self.builder.new_label();
                    self.compile_expr(test)?;
                    self.builder
                        .emit_jump(JumpKind::JumpIfFalse, next_label, Some(*span));
                    self.compile_expr(result)?;
                    self.builder.emit_jump(JumpKind::Jump, end_label, None);
                    self.builder.place_label(next_label);
                }
                match else_clause {
                    Some(e) => self.compile_expr(e)?,
                    None => self.builder.emit(Opcode::Push(Value::Unit), Some(*span)),
                }
                self.builder.place_label(end_label);
            }
            Expr::Match {
                scrutinee,
                cases,
                span,
            } => self.compile_match(scrutinee, cases, *span)?,
            Expr::Do { exprs, span } => {
                if exprs.is_empty() {
                    self.builder.emit(Opcode::Push(Value::Unit), Some(*span));
                } else {
                    let last = exprs.len() - 1;
                    for (i, expr) in exprs.iter().enumerate() {
                        self.compile_expr(expr)?;
                        if i != last {
                            self.builder.emit(Opcode::Pop, None);
                        }
                    }
                }
            }
            Expr::Lambda { span, .. } => {
                return Err(CompileError::new(
                    "lambda expressions are not supported",
                    *span,
                ));
            }
            Expr::BinaryOp { op, lhs, rhs, span } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.builder.emit(binary_opcode(*op), Some(*span));
            }
            Expr::UnaryOp { op, operand, span } => {
                self.compile_expr(operand)?;
                let opcode = match op {
                    UnaryOperator::Neg => Opcode::Neg,
                    UnaryOperator::Not => Opcode::Not,
                };
                self.builder.emit(opcode, Some(*span));
            }
            Expr::Call {
                target,
                version,
                args,
                span,
            } => self.compile_call(target, version.as_deref(), args, *span)?,
        }
        Ok(())
    }

    fn compile_call(
        &mut self,
        target: &str,
        version: Option<&str>,
        args: &[Expr],
        span: Span,
    ) -> Result<(), CompileError> {
        for arg in args {
            self.compile_expr(arg)?;
        }

        if let Some(prefix) = EFFECT_PREFIXES.iter().find(|p| target.starts_with(**p)) {
            let handler = &prefix[..prefix.len() - 1];
            let operation = &target[prefix.len()..];
            let resource = self
                .func
                .effects
                .iter()
                .find(|e| e.effect_type == target)
                .map(|e| e.target.clone());
            self.builder.emit(
                Opcode::ExecEffect {
                    handler: handler.to_string(),
                    operation: operation.to_string(),
                    param_count: args.len(),
                    audit_required: self.func.audit_required,
                    resource,
                },
                Some(span),
            );
            return Ok(());
        }

        if target.contains('.') {
            self.builder.emit(
                Opcode::CallNative {
                    name: target.to_string(),
                    arity: args.len(),
                },
                Some(span),
            );
            return Ok(());
        }

        let version = version
            .map(|v| {
                Version::parse(v)
                    .map(|parsed| parsed.canonical_key())
                    .map_err(|_| {
                        CompileError::new(format!("invalid call version '{v}'"), span)
                    })
            })
            .transpose()?;
        self.builder.emit(
            Opcode::Call {
                name: target.to_string(),
                version,
                arity: args.len(),
            },
            Some(span),
        );
        Ok(())
    }

    fn compile_match(
        &mut self,
        scrutinee: &Expr,
        cases: &[MatchCase],
        span: Span,
    ) -> Result<(), CompileError> {
        self.compile_expr(scrutinee)?;
        let end_label = self.builder.new_label();
        let last = cases.len().saturating_sub(1);

        for (i, case) in cases.iter().enumerate() {
            let next_label = self.builder.new_label();
            if i != last {
                self.builder.emit(Opcode::Dup, Some(case.span));
            }
            self.compile_pattern_test(&case.pattern)?;
            self.builder
                .emit_jump(JumpKind::JumpIfFalse, next_label, Some(case.span));
            self.compile_expr(&case.body)?;
            self.builder.emit_jump(JumpKind::Jump, end_label, None);
            self.builder.place_label(next_label);
        }

        // No case matched at runtime.
        self.builder.emit(
            Opcode::Push(Value::Str("match: no case matched".to_string())),
            Some(span),
        );
        self.builder.emit(Opcode::Halt, Some(span));
        self.builder.place_label(end_label);
        Ok(())
    }

    /// Consumes the scrutinee (or its copy) and leaves a bool.
    fn compile_pattern_test(&mut self, pattern: &Pattern) -> Result<(), CompileError> {
        match pattern {
            Pattern::Literal(lit, span) => {
                self.builder
                    .emit(Opcode::Push(literal_value(lit)), Some(*span));
                self.builder.emit(Opcode::Eq, Some(*span));
            }
            Pattern::Constructor {
                type_name,
                case,
                span,
                ..
            } => {
                self.builder.emit(
                    Opcode::MatchVariant {
                        type_name: type_name.clone(),
                        case: case.clone(),
                    },
                    Some(*span),
                );
            }
            Pattern::Wildcard(span) | Pattern::Binding(_, span) => {
                self.builder.emit(Opcode::Pop, Some(*span));
                self.builder.emit(Opcode::Push(Value::Bool(true)), Some(*span));
            }
        }
        Ok(())
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(x) => Value::Float(*x),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

fn binary_opcode(op: BinaryOperator) -> Opcode {
    match op {
        BinaryOperator::Add => Opcode::Add,
        BinaryOperator::Sub => Opcode::Sub,
        BinaryOperator::Mul => Opcode::Mul,
        BinaryOperator::Div => Opcode::Div,
        BinaryOperator::Mod => Opcode::Mod,
        BinaryOperator::Eq => Opcode::Eq,
        BinaryOperator::Ne => Opcode::Ne,
        BinaryOperator::Lt => Opcode::Lt,
        BinaryOperator::Le => Opcode::Le,
        BinaryOperator::Gt => Opcode::Gt,
        BinaryOperator::Ge => Opcode::Ge,
        BinaryOperator::And => Opcode::And,
        BinaryOperator::Or => Opcode::Or,
    }
}
