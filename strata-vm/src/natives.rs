#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use strata_ir::Value;

type NativeFn = fn(&[Value]) -> Result<Value, String>;

/// Host functions reachable through `CALL_NATIVE`. Arity and argument types
/// are checked by each native.
pub struct NativeRegistry {
    functions: BTreeMap<String, NativeFn>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("str.concat", native_str_concat);
        registry.register("str.uppercase", native_str_uppercase);
        registry.register("str.lowercase", native_str_lowercase);
        registry.register("str.length", native_str_length);
        registry.register("list.length", native_list_length);
        registry.register("list.append", native_list_append);
        registry.register("list.get", native_list_get);
        registry.register("map.get", native_map_get);
        registry.register("map.has", native_map_has);
        registry.register("json.stringify", native_json_stringify);
        registry.register("json.parse", native_json_parse);
        registry
    }

    pub fn register(&mut self, name: &str, function: NativeFn) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| format!("unknown native function '{name}'"))?;
        function(args)
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, String> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(format!(
            "{name}: argument {index} must be a string, got {}",
            other.tag()
        )),
        None => Err(format!("{name}: missing argument {index}")),
    }
}

fn expect_arity(args: &[Value], count: usize, name: &str) -> Result<(), String> {
    if args.len() != count {
        return Err(format!(
            "{name} expects {count} arguments, got {}",
            args.len()
        ));
    }
    Ok(())
}

fn native_str_concat(args: &[Value]) -> Result<Value, String> {
    let mut out = String::new();
    for (i, _) in args.iter().enumerate() {
        out.push_str(arg_str(args, i, "str.concat")?);
    }
    Ok(Value::Str(out))
}

fn native_str_uppercase(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1, "str.uppercase")?;
    Ok(Value::Str(arg_str(args, 0, "str.uppercase")?.to_uppercase()))
}

fn native_str_lowercase(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1, "str.lowercase")?;
    Ok(Value::Str(arg_str(args, 0, "str.lowercase")?.to_lowercase()))
}

fn native_str_length(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1, "str.length")?;
    Ok(Value::Int(
        arg_str(args, 0, "str.length")?.chars().count() as i64
    ))
}

fn native_list_length(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1, "list.length")?;
    match &args[0] {
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        other => Err(format!("list.length expects a list, got {}", other.tag())),
    }
}

fn native_list_append(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 2, "list.append")?;
    match &args[0] {
        Value::List(items) => {
            let mut out = items.clone();
            out.push(args[1].clone());
            Ok(Value::List(out))
        }
        other => Err(format!("list.append expects a list, got {}", other.tag())),
    }
}

fn native_list_get(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 2, "list.get")?;
    let Value::List(items) = &args[0] else {
        return Err(format!("list.get expects a list, got {}", args[0].tag()));
    };
    let Value::Int(index) = &args[1] else {
        return Err(format!("list.get expects an int index, got {}", args[1].tag()));
    };
    Ok(usize::try_from(*index)
        .ok()
        .and_then(|i| items.get(i).cloned())
        .map(Value::some)
        .unwrap_or_else(Value::none))
}

fn native_map_get(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 2, "map.get")?;
    let Value::Map(entries) = &args[0] else {
        return Err(format!("map.get expects a map, got {}", args[0].tag()));
    };
    let key = arg_str(args, 1, "map.get")?;
    Ok(entries
        .get(key)
        .cloned()
        .map(Value::some)
        .unwrap_or_else(Value::none))
}

fn native_map_has(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 2, "map.has")?;
    let Value::Map(entries) = &args[0] else {
        return Err(format!("map.has expects a map, got {}", args[0].tag()));
    };
    let key = arg_str(args, 1, "map.has")?;
    Ok(Value::Bool(entries.contains_key(key)))
}

fn native_json_stringify(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1, "json.stringify")?;
    serde_json::to_string(&args[0])
        .map(Value::Str)
        .map_err(|e| format!("json.stringify failed: {e}"))
}

fn native_json_parse(args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1, "json.parse")?;
    let text = arg_str(args, 0, "json.parse")?;
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::Json)
        .map_err(|e| format!("json.parse failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_natives() {
        let registry = NativeRegistry::with_builtins();
        assert_eq!(
            registry
                .call(
                    "str.concat",
                    &[Value::Str("a".to_string()), Value::Str("b".to_string())]
                )
                .unwrap(),
            Value::Str("ab".to_string())
        );
        assert_eq!(
            registry
                .call("str.uppercase", &[Value::Str("hi".to_string())])
                .unwrap(),
            Value::Str("HI".to_string())
        );
        assert!(registry.call("str.uppercase", &[Value::Int(1)]).is_err());
    }

    #[test]
    fn list_and_map_natives() {
        let registry = NativeRegistry::with_builtins();
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            registry.call("list.length", &[list.clone()]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            registry
                .call("list.get", &[list.clone(), Value::Int(9)])
                .unwrap(),
            Value::none()
        );
        assert_eq!(
            registry.call("list.get", &[list, Value::Int(0)]).unwrap(),
            Value::some(Value::Int(1))
        );
    }

    #[test]
    fn unknown_native_is_an_error() {
        let registry = NativeRegistry::with_builtins();
        assert!(registry.call("nope.nothing", &[]).is_err());
    }

    #[test]
    fn json_round_trip() {
        let registry = NativeRegistry::with_builtins();
        let parsed = registry
            .call("json.parse", &[Value::Str("{\"a\": 1}".to_string())])
            .unwrap();
        assert!(matches!(parsed, Value::Json(_)));
    }
}
