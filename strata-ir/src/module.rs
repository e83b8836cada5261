#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_ast::{DataClassification, PermissionDecl, PolicyDecl, RoleDecl};
use strata_version::Version;

use crate::instr::Instruction;
use crate::value::Value;

/// One compiled function, keyed in its module by `"{name}:{version}"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BytecodeFunction {
    pub name: String,
    /// Canonical version key, e.g. `1.0.0`.
    pub version: String,
    pub arity: usize,
    pub instructions: Vec<Instruction>,
    pub required_roles: Vec<String>,
    /// Declared effects as `handler.operation` on `target` pairs.
    pub effects: Vec<(String, String)>,
    pub pure: bool,
    pub idempotent: bool,
    pub local_count: usize,
}

impl BytecodeFunction {
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub ty: String,
    pub classification: Option<DataClassification>,
}

/// Runtime view of a record type; drives classification tagging and audit
/// redaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeTableEntry {
    pub name: String,
    pub fields: Vec<FieldInfo>,
    pub max_classification: DataClassification,
}

impl TypeTableEntry {
    pub fn field_classification(&self, field: &str) -> Option<DataClassification> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.classification)
    }
}

/// A compiled module: constants, functions, the type table and the security
/// declarations the runtime needs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BytecodeModule {
    pub name: String,
    pub version: String,
    pub constants: Vec<Value>,
    pub functions: BTreeMap<String, BytecodeFunction>,
    pub types: BTreeMap<String, TypeTableEntry>,
    pub roles: Vec<RoleDecl>,
    pub permissions: Vec<PermissionDecl>,
    pub policies: Vec<PolicyDecl>,
}

impl BytecodeModule {
    pub fn function(&self, key: &str) -> Option<&BytecodeFunction> {
        self.functions.get(key)
    }

    /// Resolve a call without an explicit version: the highest registered
    /// version of `name` by semantic-version ordering.
    pub fn resolve_latest(&self, name: &str) -> Option<&BytecodeFunction> {
        let prefix = format!("{name}:");
        self.functions
            .values()
            .filter(|f| f.name == name || f.key().starts_with(&prefix))
            .max_by(|a, b| {
                let va = Version::parse(&a.version).ok();
                let vb = Version::parse(&b.version).ok();
                va.cmp(&vb)
            })
    }

    /// Record a literal in the constant pool, deduplicating exact repeats.
    pub fn intern_constant(&mut self, value: &Value) -> usize {
        if let Some(i) = self.constants.iter().position(|c| c == value) {
            return i;
        }
        self.constants.push(value.clone());
        self.constants.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(name: &str, version: &str) -> BytecodeFunction {
        BytecodeFunction {
            name: name.to_string(),
            version: version.to_string(),
            arity: 0,
            instructions: Vec::new(),
            required_roles: Vec::new(),
            effects: Vec::new(),
            pure: true,
            idempotent: false,
            local_count: 0,
        }
    }

    #[test]
    fn resolve_latest_picks_highest_semver() {
        let mut module = BytecodeModule::default();
        for v in ["1.0.0", "1.10.0", "1.2.0"] {
            let f = func("calc", v);
            module.functions.insert(f.key(), f);
        }
        // String ordering would pick 1.2.0 here.
        assert_eq!(module.resolve_latest("calc").unwrap().version, "1.10.0");
    }

    #[test]
    fn resolve_latest_does_not_match_prefix_names() {
        let mut module = BytecodeModule::default();
        let f = func("calc_total", "9.0.0");
        module.functions.insert(f.key(), f);
        let f = func("calc", "1.0.0");
        module.functions.insert(f.key(), f);
        assert_eq!(module.resolve_latest("calc").unwrap().version, "1.0.0");
    }

    #[test]
    fn constant_interning_deduplicates() {
        let mut module = BytecodeModule::default();
        let a = module.intern_constant(&Value::Int(42));
        let b = module.intern_constant(&Value::Int(42));
        let c = module.intern_constant(&Value::Str("x".to_string()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(module.constants.len(), 2);
    }
}
