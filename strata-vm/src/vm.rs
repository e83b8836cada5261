#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};

use miette::Diagnostic;
use strata_ir::{BytecodeFunction, BytecodeModule, Instruction, Opcode, Value};
use thiserror::Error;

use crate::effects::{EffectFailure, EffectMetadata, EffectRegistry};
use crate::natives::NativeRegistry;
use crate::Principal;

#[derive(Debug, Error, Diagnostic)]
pub enum VmError {
    #[error("vm error: {message} (ip {ip})")]
    #[diagnostic(code(strata::vm))]
    Runtime { message: String, ip: usize },

    #[error("security error: {message}")]
    #[diagnostic(code(strata::vm::security))]
    Security { message: String },

    #[error("type mismatch: {message} (ip {ip}: {instruction})")]
    #[diagnostic(code(strata::vm::type_mismatch))]
    TypeMismatch {
        message: String,
        ip: usize,
        instruction: String,
    },
}

struct Frame {
    stack: Vec<Value>,
    locals: HashMap<String, Value>,
    args: Vec<Value>,
    ip: usize,
}

impl Frame {
    fn new(args: Vec<Value>) -> Self {
        Self {
            stack: Vec::new(),
            locals: HashMap::new(),
            args,
            ip: 0,
        }
    }
}

/// The stack interpreter. Owns the native registry and the effect registry;
/// each `execute` call gets a fresh frame.
pub struct Vm {
    natives: NativeRegistry,
    pub effects: EffectRegistry,
    debug_output: Vec<String>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            natives: NativeRegistry::with_builtins(),
            effects: EffectRegistry::with_default_handlers(),
            debug_output: Vec::new(),
        }
    }

    pub fn debug_output(&self) -> &[String] {
        &self.debug_output
    }

    /// Run `key` (`name`, `name:version`, or `name:v1` forms) with the given
    /// arguments on behalf of `principal`.
    pub fn execute(
        &mut self,
        module: &BytecodeModule,
        key: &str,
        args: Vec<Value>,
        principal: &Principal,
    ) -> Result<Value, VmError> {
        let func = resolve_function(module, key).ok_or_else(|| VmError::Runtime {
            message: format!("function '{key}' is not defined"),
            ip: 0,
        })?;
        self.execute_function(module, func, args, principal)
    }

    fn execute_function(
        &mut self,
        module: &BytecodeModule,
        func: &BytecodeFunction,
        args: Vec<Value>,
        principal: &Principal,
    ) -> Result<Value, VmError> {
        if args.len() != func.arity {
            return Err(VmError::Runtime {
                message: format!(
                    "function '{}' expects {} arguments, got {}",
                    func.name,
                    func.arity,
                    args.len()
                ),
                ip: 0,
            });
        }
        if !func.required_roles.is_empty() && !principal.has_any_role(&func.required_roles) {
            return Err(VmError::Security {
                message: "Permission denied".to_string(),
            });
        }

        let mut frame = Frame::new(args);
        self.run(module, func, &mut frame, principal)?;
        Ok(frame.stack.pop().unwrap_or(Value::Unit))
    }

    fn run(
        &mut self,
        module: &BytecodeModule,
        func: &BytecodeFunction,
        frame: &mut Frame,
        principal: &Principal,
    ) -> Result<(), VmError> {
        while let Some(instruction) = func.instructions.get(frame.ip) {
            let ip = frame.ip;
            match &instruction.op {
                Opcode::Push(value) => frame.stack.push(value.clone()),
                Opcode::Pop => {
                    pop(frame, ip)?;
                }
                Opcode::Dup => {
                    let top = peek(frame, ip)?.clone();
                    frame.stack.push(top);
                }
                Opcode::Swap => {
                    let a = pop(frame, ip)?;
                    let b = pop(frame, ip)?;
                    frame.stack.push(a);
                    frame.stack.push(b);
                }
                Opcode::LoadVar(name) => {
                    let value = frame.locals.get(name).cloned().ok_or_else(|| {
                        VmError::Runtime {
                            message: format!("undefined variable '{name}'"),
                            ip,
                        }
                    })?;
                    frame.stack.push(value);
                }
                Opcode::StoreVar(name) => {
                    // Keeps the stored value on the stack.
                    let value = peek(frame, ip)?.clone();
                    frame.locals.insert(name.clone(), value);
                }
                Opcode::LoadArg(index) => {
                    let value = frame.args.get(*index).cloned().ok_or_else(|| {
                        VmError::Runtime {
                            message: format!("argument slot {index} out of range"),
                            ip,
                        }
                    })?;
                    frame.stack.push(value);
                }

                Opcode::Call {
                    name,
                    version,
                    arity,
                } => {
                    let callee = match version {
                        Some(v) => module.function(&format!("{name}:{v}")),
                        None => module.resolve_latest(name),
                    }
                    .ok_or_else(|| VmError::Runtime {
                        message: format!("call to undefined function '{name}'"),
                        ip,
                    })?;
                    let call_args = pop_n(frame, *arity, ip)?;
                    let result = self.execute_function(module, callee, call_args, principal)?;
                    frame.stack.push(result);
                }
                Opcode::CallNative { name, arity } => {
                    let call_args = pop_n(frame, *arity, ip)?;
                    let result = self
                        .natives
                        .call(name, &call_args)
                        .map_err(|message| VmError::Runtime { message, ip })?;
                    frame.stack.push(result);
                }
                Opcode::Return | Opcode::Halt => return Ok(()),

                Opcode::Jump(target) => {
                    frame.ip = *target;
                    continue;
                }
                Opcode::JumpIfFalse(target) => {
                    let cond = pop_bool(frame, instruction, ip)?;
                    if !cond {
                        frame.ip = *target;
                        continue;
                    }
                }
                Opcode::JumpIfTrue(target) => {
                    let cond = pop_bool(frame, instruction, ip)?;
                    if cond {
                        frame.ip = *target;
                        continue;
                    }
                }

                Opcode::Add => {
                    let (a, b) = pop_pair(frame, ip)?;
                    let result = match (a, b) {
                        (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
                        (Value::Float(x), Value::Float(y)) => Value::Float(x + y),
                        (Value::Str(x), Value::Str(y)) => Value::Str(x + &y),
                        (a, b) => return Err(type_mismatch("ADD", &a, &b, instruction, ip)),
                    };
                    frame.stack.push(result);
                }
                Opcode::Sub => {
                    let result = numeric_op(frame, instruction, ip, "SUB", |x, y| x - y, |x, y| {
                        x - y
                    })?;
                    frame.stack.push(result);
                }
                Opcode::Mul => {
                    let result = numeric_op(frame, instruction, ip, "MUL", |x, y| x * y, |x, y| {
                        x * y
                    })?;
                    frame.stack.push(result);
                }
                Opcode::Div => {
                    let (a, b) = pop_pair(frame, ip)?;
                    let result = match (a, b) {
                        (_, Value::Int(0)) => {
                            Value::err(Value::Str("Division by zero".to_string()))
                        }
                        (_, Value::Float(y)) if y == 0.0 => {
                            Value::err(Value::Str("Division by zero".to_string()))
                        }
                        (Value::Int(x), Value::Int(y)) => Value::Int(x / y),
                        (Value::Float(x), Value::Float(y)) => Value::Float(x / y),
                        (a, b) => return Err(type_mismatch("DIV", &a, &b, instruction, ip)),
                    };
                    frame.stack.push(result);
                }
                Opcode::Mod => {
                    let (a, b) = pop_pair(frame, ip)?;
                    let result = match (a, b) {
                        (Value::Int(_), Value::Int(0)) => {
                            return Err(VmError::Runtime {
                                message: "modulo by zero".to_string(),
                                ip,
                            })
                        }
                        (Value::Int(x), Value::Int(y)) => Value::Int(x % y),
                        (a, b) => return Err(type_mismatch("MOD", &a, &b, instruction, ip)),
                    };
                    frame.stack.push(result);
                }
                Opcode::Neg => {
                    let value = pop(frame, ip)?;
                    let result = match value {
                        Value::Int(x) => Value::Int(-x),
                        Value::Float(x) => Value::Float(-x),
                        other => {
                            return Err(VmError::TypeMismatch {
                                message: format!("NEG expects a number, got {}", other.tag()),
                                ip,
                                instruction: instruction.to_string(),
                            })
                        }
                    };
                    frame.stack.push(result);
                }

                Opcode::Eq => {
                    let (a, b) = pop_pair(frame, ip)?;
                    frame.stack.push(Value::Bool(a == b));
                }
                Opcode::Ne => {
                    let (a, b) = pop_pair(frame, ip)?;
                    frame.stack.push(Value::Bool(a != b));
                }
                Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                    let (a, b) = pop_pair(frame, ip)?;
                    let ordering = match (&a, &b) {
                        (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
                        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
                        _ => None,
                    };
                    let Some(ordering) = ordering else {
                        return Err(type_mismatch(
                            instruction.op.mnemonic(),
                            &a,
                            &b,
                            instruction,
                            ip,
                        ));
                    };
                    let result = match instruction.op {
                        Opcode::Lt => ordering.is_lt(),
                        Opcode::Le => ordering.is_le(),
                        Opcode::Gt => ordering.is_gt(),
                        _ => ordering.is_ge(),
                    };
                    frame.stack.push(Value::Bool(result));
                }

                Opcode::And => {
                    let (a, b) = pop_bool_pair(frame, instruction, ip)?;
                    frame.stack.push(Value::Bool(a && b));
                }
                Opcode::Or => {
                    let (a, b) = pop_bool_pair(frame, instruction, ip)?;
                    frame.stack.push(Value::Bool(a || b));
                }
                Opcode::Not => {
                    let value = pop_bool(frame, instruction, ip)?;
                    frame.stack.push(Value::Bool(!value));
                }

                Opcode::ExecEffect {
                    handler,
                    operation,
                    param_count,
                    audit_required,
                    resource,
                } => {
                    let params = pop_n(frame, *param_count, ip)?;
                    let metadata = EffectMetadata {
                        audit_required: *audit_required,
                        resource: resource.clone(),
                    };
                    let result = self
                        .effects
                        .dispatch(handler, operation, &params, principal, &metadata, &module.types)
                        .map_err(|failure| match failure {
                            EffectFailure::PermissionDenied { .. } => VmError::Security {
                                message: "Permission denied".to_string(),
                            },
                            other => VmError::Runtime {
                                message: other.to_string(),
                                ip,
                            },
                        })?;
                    frame.stack.push(result);
                }

                Opcode::MakeOk => {
                    let value = pop(frame, ip)?;
                    frame.stack.push(Value::ok(value));
                }
                Opcode::MakeErr => {
                    let value = pop(frame, ip)?;
                    frame.stack.push(Value::err(value));
                }
                Opcode::MakeSome => {
                    let value = pop(frame, ip)?;
                    frame.stack.push(Value::some(value));
                }
                Opcode::MakeNone => frame.stack.push(Value::none()),
                Opcode::MakeList(count) => {
                    let items = pop_n(frame, *count, ip)?;
                    frame.stack.push(Value::List(items));
                }
                Opcode::MakeMap(pair_count) => {
                    let mut map = BTreeMap::new();
                    for _ in 0..*pair_count {
                        let value = pop(frame, ip)?;
                        let key = pop_string(frame, instruction, ip)?;
                        map.insert(key, value);
                    }
                    frame.stack.push(Value::Map(map));
                }
                Opcode::ConstructRecord {
                    type_name,
                    field_count,
                } => {
                    let mut fields = BTreeMap::new();
                    for _ in 0..*field_count {
                        let value = pop(frame, ip)?;
                        let key = pop_string(frame, instruction, ip)?;
                        fields.insert(key, value);
                    }
                    let classification = module
                        .types
                        .get(type_name)
                        .map(|entry| entry.max_classification);
                    frame.stack.push(Value::Record {
                        type_name: type_name.clone(),
                        fields,
                        classification,
                    });
                }
                Opcode::AccessField(name) => {
                    let value = pop(frame, ip)?;
                    let Value::Record { fields, .. } = value else {
                        return Err(VmError::TypeMismatch {
                            message: format!(
                                "ACCESS_FIELD expects a record, got {}",
                                value.tag()
                            ),
                            ip,
                            instruction: instruction.to_string(),
                        });
                    };
                    let field = fields.get(name).cloned().ok_or_else(|| VmError::Runtime {
                        message: format!("record has no field '{name}'"),
                        ip,
                    })?;
                    frame.stack.push(field);
                }
                Opcode::ConstructVariant { type_name, case } => {
                    let payload = pop(frame, ip)?;
                    let payload = match payload {
                        Value::Unit => None,
                        other => Some(Box::new(other)),
                    };
                    frame.stack.push(Value::Variant {
                        type_name: type_name.clone(),
                        case: case.clone(),
                        payload,
                    });
                }
                Opcode::MatchVariant { type_name, case } => {
                    let value = pop(frame, ip)?;
                    let matched = matches!(
                        &value,
                        Value::Variant {
                            type_name: t,
                            case: c,
                            ..
                        } if t == type_name && c == case
                    );
                    frame.stack.push(Value::Bool(matched));
                }

                Opcode::ListGet => {
                    let index = pop_int(frame, instruction, ip)?;
                    let list = pop_list(frame, instruction, ip)?;
                    let item = usize::try_from(index)
                        .ok()
                        .and_then(|i| list.get(i).cloned())
                        .ok_or_else(|| VmError::Runtime {
                            message: format!("list index {index} out of range"),
                            ip,
                        })?;
                    frame.stack.push(item);
                }
                Opcode::ListLen => {
                    let list = pop_list(frame, instruction, ip)?;
                    frame.stack.push(Value::Int(list.len() as i64));
                }
                Opcode::ListSet => {
                    let value = pop(frame, ip)?;
                    let index = pop_int(frame, instruction, ip)?;
                    let mut list = pop_list(frame, instruction, ip)?;
                    let slot = usize::try_from(index)
                        .ok()
                        .filter(|i| *i < list.len())
                        .ok_or_else(|| VmError::Runtime {
                            message: format!("list index {index} out of range"),
                            ip,
                        })?;
                    list[slot] = value;
                    frame.stack.push(Value::List(list));
                }
                Opcode::ListAppend => {
                    let value = pop(frame, ip)?;
                    let mut list = pop_list(frame, instruction, ip)?;
                    list.push(value);
                    frame.stack.push(Value::List(list));
                }
                Opcode::MapGet => {
                    let key = pop_string(frame, instruction, ip)?;
                    let map = pop_map(frame, instruction, ip)?;
                    let value = map.get(&key).cloned().ok_or_else(|| VmError::Runtime {
                        message: format!("map has no key '{key}'"),
                        ip,
                    })?;
                    frame.stack.push(value);
                }
                Opcode::MapSet => {
                    let value = pop(frame, ip)?;
                    let key = pop_string(frame, instruction, ip)?;
                    let mut map = pop_map(frame, instruction, ip)?;
                    map.insert(key, value);
                    frame.stack.push(Value::Map(map));
                }
                Opcode::MapHas => {
                    let key = pop_string(frame, instruction, ip)?;
                    let map = pop_map(frame, instruction, ip)?;
                    frame.stack.push(Value::Bool(map.contains_key(&key)));
                }

                Opcode::StrConcat => {
                    let b = pop_string(frame, instruction, ip)?;
                    let a = pop_string(frame, instruction, ip)?;
                    frame.stack.push(Value::Str(a + &b));
                }
                Opcode::StrLen => {
                    let s = pop_string(frame, instruction, ip)?;
                    frame.stack.push(Value::Int(s.chars().count() as i64));
                }

                Opcode::DebugPrint => {
                    let top = peek(frame, ip)?;
                    let line = top.to_string();
                    println!("{line}");
                    self.debug_output.push(line);
                }
            }
            frame.ip += 1;
        }
        Ok(())
    }
}

/// Accept `name`, `name:1.2.3` and `name:v1` lookups; version text is
/// canonicalized before the map lookup.
fn resolve_function<'m>(module: &'m BytecodeModule, key: &str) -> Option<&'m BytecodeFunction> {
    if let Some(func) = module.function(key) {
        return Some(func);
    }
    match key.rsplit_once(':') {
        Some((name, version)) => {
            let canonical = strata_version::Version::parse(version).ok()?.canonical_key();
            module.function(&format!("{name}:{canonical}"))
        }
        None => module.resolve_latest(key),
    }
}

fn pop(frame: &mut Frame, ip: usize) -> Result<Value, VmError> {
    frame.stack.pop().ok_or(VmError::Runtime {
        message: "stack underflow".to_string(),
        ip,
    })
}

fn peek<'f>(frame: &'f Frame, ip: usize) -> Result<&'f Value, VmError> {
    frame.stack.last().ok_or(VmError::Runtime {
        message: "stack underflow".to_string(),
        ip,
    })
}

fn pop_n(frame: &mut Frame, count: usize, ip: usize) -> Result<Vec<Value>, VmError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(pop(frame, ip)?);
    }
    out.reverse();
    Ok(out)
}

fn pop_pair(frame: &mut Frame, ip: usize) -> Result<(Value, Value), VmError> {
    let b = pop(frame, ip)?;
    let a = pop(frame, ip)?;
    Ok((a, b))
}

fn pop_bool(frame: &mut Frame, instruction: &Instruction, ip: usize) -> Result<bool, VmError> {
    let value = pop(frame, ip)?;
    value.as_bool().ok_or_else(|| VmError::TypeMismatch {
        message: format!("expected bool, got {}", value.tag()),
        ip,
        instruction: instruction.to_string(),
    })
}

fn pop_bool_pair(
    frame: &mut Frame,
    instruction: &Instruction,
    ip: usize,
) -> Result<(bool, bool), VmError> {
    let b = pop_bool(frame, instruction, ip)?;
    let a = pop_bool(frame, instruction, ip)?;
    Ok((a, b))
}

fn pop_int(frame: &mut Frame, instruction: &Instruction, ip: usize) -> Result<i64, VmError> {
    let value = pop(frame, ip)?;
    value.as_int().ok_or_else(|| VmError::TypeMismatch {
        message: format!("expected int, got {}", value.tag()),
        ip,
        instruction: instruction.to_string(),
    })
}

fn pop_string(frame: &mut Frame, instruction: &Instruction, ip: usize) -> Result<String, VmError> {
    let value = pop(frame, ip)?;
    match value {
        Value::Str(s) => Ok(s),
        other => Err(VmError::TypeMismatch {
            message: format!("expected string, got {}", other.tag()),
            ip,
            instruction: instruction.to_string(),
        }),
    }
}

fn pop_list(frame: &mut Frame, instruction: &Instruction, ip: usize) -> Result<Vec<Value>, VmError> {
    let value = pop(frame, ip)?;
    match value {
        Value::List(items) => Ok(items),
        other => Err(VmError::TypeMismatch {
            message: format!("expected list, got {}", other.tag()),
            ip,
            instruction: instruction.to_string(),
        }),
    }
}

fn pop_map(
    frame: &mut Frame,
    instruction: &Instruction,
    ip: usize,
) -> Result<BTreeMap<String, Value>, VmError> {
    let value = pop(frame, ip)?;
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(VmError::TypeMismatch {
            message: format!("expected map, got {}", other.tag()),
            ip,
            instruction: instruction.to_string(),
        }),
    }
}

fn numeric_op(
    frame: &mut Frame,
    instruction: &Instruction,
    ip: usize,
    name: &str,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, VmError> {
    let (a, b) = pop_pair(frame, ip)?;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(x, y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(float_op(x, y))),
        (a, b) => Err(type_mismatch(name, &a, &b, instruction, ip)),
    }
}

fn type_mismatch(
    op: &str,
    a: &Value,
    b: &Value,
    instruction: &Instruction,
    ip: usize,
) -> VmError {
    VmError::TypeMismatch {
        message: format!("{op} cannot combine {} and {}", a.tag(), b.tag()),
        ip,
        instruction: instruction.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ir::{FunctionBuilder, JumpKind};

    fn module_with(func: BytecodeFunction) -> BytecodeModule {
        let mut module = BytecodeModule {
            name: "t".to_string(),
            version: "1.0.0".to_string(),
            ..BytecodeModule::default()
        };
        module.functions.insert(func.key(), func);
        module
    }

    fn function(name: &str, arity: usize, code: Vec<Opcode>) -> BytecodeFunction {
        BytecodeFunction {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            arity,
            instructions: code.into_iter().map(Instruction::new).collect(),
            required_roles: Vec::new(),
            effects: Vec::new(),
            pure: true,
            idempotent: false,
            local_count: 0,
        }
    }

    fn anyone() -> Principal {
        Principal::new("u", Vec::<String>::new())
    }

    #[test]
    fn store_var_keeps_value_on_stack() {
        let func = function(
            "f",
            0,
            vec![
                Opcode::Push(Value::Int(7)),
                Opcode::StoreVar("x".to_string()),
                Opcode::Return,
            ],
        );
        let module = module_with(func);
        let result = Vm::new()
            .execute(&module, "f:1.0.0", Vec::new(), &anyone())
            .unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn division_by_zero_pushes_err_value() {
        let func = function(
            "f",
            0,
            vec![
                Opcode::Push(Value::Int(1)),
                Opcode::Push(Value::Int(0)),
                Opcode::Div,
                Opcode::Return,
            ],
        );
        let module = module_with(func);
        let result = Vm::new()
            .execute(&module, "f:1.0.0", Vec::new(), &anyone())
            .unwrap();
        assert_eq!(
            result,
            Value::err(Value::Str("Division by zero".to_string()))
        );
    }

    #[test]
    fn add_is_polymorphic_and_typed() {
        let func = function(
            "f",
            2,
            vec![Opcode::LoadArg(0), Opcode::LoadArg(1), Opcode::Add, Opcode::Return],
        );
        let module = module_with(func);
        let mut vm = Vm::new();
        assert_eq!(
            vm.execute(
                &module,
                "f:1.0.0",
                vec![Value::Str("ab".to_string()), Value::Str("cd".to_string())],
                &anyone()
            )
            .unwrap(),
            Value::Str("abcd".to_string())
        );
        let err = vm
            .execute(
                &module,
                "f:1.0.0",
                vec![Value::Int(1), Value::Float(2.0)],
                &anyone(),
            )
            .unwrap_err();
        assert!(matches!(err, VmError::TypeMismatch { .. }));
    }

    #[test]
    fn empty_stack_returns_unit() {
        let func = function("f", 0, vec![Opcode::Return]);
        let module = module_with(func);
        let result = Vm::new()
            .execute(&module, "f", Vec::new(), &anyone())
            .unwrap();
        assert_eq!(result, Value::Unit);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let func = function("f", 1, vec![Opcode::LoadArg(0), Opcode::Return]);
        let module = module_with(func);
        let err = Vm::new()
            .execute(&module, "f:1.0.0", Vec::new(), &anyone())
            .unwrap_err();
        assert!(matches!(err, VmError::Runtime { .. }));
    }

    #[test]
    fn jump_targets_are_absolute() {
        let mut b = FunctionBuilder::new();
        let else_l = b.new_label();
        let end_l = b.new_label();
        b.emit(Opcode::Push(Value::Bool(false)), None);
        b.emit_jump(JumpKind::JumpIfFalse, else_l, None);
        b.emit(Opcode::Push(Value::Int(1)), None);
        b.emit_jump(JumpKind::Jump, end_l, None);
        b.place_label(else_l);
        b.emit(Opcode::Push(Value::Int(2)), None);
        b.place_label(end_l);
        b.emit(Opcode::Return, None);

        let func = BytecodeFunction {
            name: "f".to_string(),
            version: "1.0.0".to_string(),
            arity: 0,
            instructions: b.finish().unwrap(),
            required_roles: Vec::new(),
            effects: Vec::new(),
            pure: true,
            idempotent: false,
            local_count: 0,
        };
        let module = module_with(func);
        let result = Vm::new()
            .execute(&module, "f", Vec::new(), &anyone())
            .unwrap();
        assert_eq!(result, Value::Int(2));
    }

    #[test]
    fn collection_opcodes() {
        let func = function(
            "f",
            0,
            vec![
                Opcode::Push(Value::Int(1)),
                Opcode::Push(Value::Int(2)),
                Opcode::MakeList(2),
                Opcode::Push(Value::Int(3)),
                Opcode::ListAppend,
                Opcode::ListLen,
                Opcode::Return,
            ],
        );
        let module = module_with(func);
        let result = Vm::new()
            .execute(&module, "f", Vec::new(), &anyone())
            .unwrap();
        assert_eq!(result, Value::Int(3));
    }

    #[test]
    fn variant_construction_and_matching() {
        let func = function(
            "f",
            0,
            vec![
                Opcode::Push(Value::Int(5)),
                Opcode::ConstructVariant {
                    type_name: "Shape".to_string(),
                    case: "Circle".to_string(),
                },
                Opcode::MatchVariant {
                    type_name: "Shape".to_string(),
                    case: "Circle".to_string(),
                },
                Opcode::Return,
            ],
        );
        let module = module_with(func);
        let result = Vm::new()
            .execute(&module, "f", Vec::new(), &anyone())
            .unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn unversioned_call_resolves_to_highest_version() {
        let mut module = BytecodeModule {
            name: "t".to_string(),
            version: "1.0.0".to_string(),
            ..BytecodeModule::default()
        };
        for (version, result) in [("1.0.0", 1), ("2.0.0", 2)] {
            let mut f = function("target", 0, vec![Opcode::Push(Value::Int(result)), Opcode::Return]);
            f.version = version.to_string();
            module.functions.insert(f.key(), f);
        }
        let caller = function(
            "caller",
            0,
            vec![
                Opcode::Call {
                    name: "target".to_string(),
                    version: None,
                    arity: 0,
                },
                Opcode::Return,
            ],
        );
        module.functions.insert(caller.key(), caller);

        let result = Vm::new()
            .execute(&module, "caller", Vec::new(), &anyone())
            .unwrap();
        assert_eq!(result, Value::Int(2));
    }
}
