#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_ast::DataClassification;
use strata_ir::{TypeTableEntry, Value};
use thiserror::Error;

use crate::Principal;

/// A handler-side failure; the dispatch layer audits it and re-raises.
/// Ordinary business failures are `ok`-returned `err(...)` values instead.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EffectError(pub String);

#[derive(Debug, Error)]
pub enum EffectFailure {
    #[error("permission denied for {handler}.{operation}")]
    PermissionDenied { handler: String, operation: String },
    #[error("effect {handler}.{operation} failed: {message}")]
    Failed {
        handler: String,
        operation: String,
        message: String,
    },
    #[error("no effect handler named '{0}'")]
    UnknownHandler(String),
}

/// Per-call data the compiler attaches to an effect site.
#[derive(Clone, Debug, Default)]
pub struct EffectMetadata {
    pub audit_required: bool,
    pub resource: Option<String>,
}

pub trait EffectHandler {
    fn name(&self) -> &'static str;

    /// Role-membership gate; mocks keep this deliberately simple.
    fn check_permission(&self, operation: &str, principal: &Principal) -> bool;

    fn execute(
        &mut self,
        operation: &str,
        params: &[Value],
        principal: &Principal,
        metadata: &EffectMetadata,
    ) -> Result<Value, EffectError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub principal_id: String,
    pub handler: String,
    pub operation: String,
    /// Parameters after classification redaction.
    pub params: Vec<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub success: bool,
}

/// Classification-aware redaction of audit payloads. Field classifications
/// come from the module's type table; a sensitive record with no table entry
/// is redacted wholesale.
pub fn redact_value(value: &Value, types: &BTreeMap<String, TypeTableEntry>) -> Value {
    match value {
        Value::Record {
            type_name,
            fields,
            classification,
        } => {
            let Some(entry) = types.get(type_name) else {
                if classification.map_or(false, |c| c.is_sensitive()) {
                    return Value::Str("[REDACTED]".to_string());
                }
                return value.clone();
            };
            let redacted: BTreeMap<String, Value> = fields
                .iter()
                .map(|(name, field_value)| {
                    let out = match entry.field_classification(name) {
                        Some(c) if c.is_sensitive() => Value::Str("[REDACTED]".to_string()),
                        Some(DataClassification::Internal) => {
                            let ty = entry
                                .fields
                                .iter()
                                .find(|f| &f.name == name)
                                .map(|f| f.ty.clone())
                                .unwrap_or_else(|| "unknown".to_string());
                            Value::Map(
                                [("type".to_string(), Value::Str(ty))].into_iter().collect(),
                            )
                        }
                        _ => redact_value(field_value, types),
                    };
                    (name.clone(), out)
                })
                .collect();
            Value::Record {
                type_name: type_name.clone(),
                fields: redacted,
                classification: *classification,
            }
        }
        Value::List(items) => Value::List(items.iter().map(|v| redact_value(v, types)).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), redact_value(v, types)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Named effect handlers plus the append-only audit log.
#[derive(Default)]
pub struct EffectRegistry {
    handlers: BTreeMap<String, Box<dyn EffectHandler>>,
    audit_log: Vec<AuditEntry>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The in-memory mock handlers used by the interpreter and the tests.
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DbHandler::new()));
        registry.register(Box::new(HttpHandler::new()));
        registry.register(Box::new(FsHandler::new()));
        registry.register(Box::new(LogHandler::new()));
        registry.register(Box::new(EventHandler::new()));
        registry
    }

    pub fn register(&mut self, handler: Box<dyn EffectHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    /// Permission-check then execute. When `metadata.audit_required` is set
    /// an audit entry is appended for every outcome, with params redacted
    /// against `types`.
    pub fn dispatch(
        &mut self,
        handler_name: &str,
        operation: &str,
        params: &[Value],
        principal: &Principal,
        metadata: &EffectMetadata,
        types: &BTreeMap<String, TypeTableEntry>,
    ) -> Result<Value, EffectFailure> {
        let Some(handler) = self.handlers.get_mut(handler_name) else {
            return Err(EffectFailure::UnknownHandler(handler_name.to_string()));
        };

        if !handler.check_permission(operation, principal) {
            let failure = EffectFailure::PermissionDenied {
                handler: handler_name.to_string(),
                operation: operation.to_string(),
            };
            if metadata.audit_required {
                self.audit_log.push(AuditEntry {
                    timestamp: Utc::now(),
                    principal_id: principal.id.clone(),
                    handler: handler_name.to_string(),
                    operation: operation.to_string(),
                    params: params.iter().map(|p| redact_value(p, types)).collect(),
                    result: None,
                    error: Some(failure.to_string()),
                    success: false,
                });
            }
            return Err(failure);
        }

        let outcome = handler.execute(operation, params, principal, metadata);

        if metadata.audit_required {
            self.audit_log.push(AuditEntry {
                timestamp: Utc::now(),
                principal_id: principal.id.clone(),
                handler: handler_name.to_string(),
                operation: operation.to_string(),
                params: params.iter().map(|p| redact_value(p, types)).collect(),
                result: outcome.as_ref().ok().cloned(),
                error: outcome.as_ref().err().map(|e| e.0.clone()),
                success: outcome.is_ok(),
            });
        }

        outcome.map_err(|e| EffectFailure::Failed {
            handler: handler_name.to_string(),
            operation: operation.to_string(),
            message: e.0,
        })
    }
}

// ---------------------------------------------------------------------------
// Mock handlers. Single-threaded test stubs; production back-ends live
// outside this crate.
// ---------------------------------------------------------------------------

/// String-keyed in-memory table.
pub struct DbHandler {
    table: BTreeMap<String, Value>,
    required_role: Option<String>,
}

impl DbHandler {
    pub fn new() -> Self {
        Self {
            table: BTreeMap::new(),
            required_role: None,
        }
    }

    pub fn with_required_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    pub fn seed(&mut self, key: impl Into<String>, value: Value) {
        self.table.insert(key.into(), value);
    }
}

impl EffectHandler for DbHandler {
    fn name(&self) -> &'static str {
        "db"
    }

    fn check_permission(&self, _operation: &str, principal: &Principal) -> bool {
        match &self.required_role {
            Some(role) => principal.has_role(role),
            None => true,
        }
    }

    fn execute(
        &mut self,
        operation: &str,
        params: &[Value],
        _principal: &Principal,
        _metadata: &EffectMetadata,
    ) -> Result<Value, EffectError> {
        match operation {
            "read" => {
                let key = string_param(params, 0, "db.read")?;
                Ok(match self.table.get(&key) {
                    Some(v) => Value::some(v.clone()),
                    None => Value::none(),
                })
            }
            "write" => {
                let key = string_param(params, 0, "db.write")?;
                let value = params
                    .get(1)
                    .cloned()
                    .ok_or_else(|| EffectError("db.write expects a value".to_string()))?;
                self.table.insert(key, value);
                Ok(Value::ok(Value::Unit))
            }
            "delete" => {
                let key = string_param(params, 0, "db.delete")?;
                Ok(Value::Bool(self.table.remove(&key).is_some()))
            }
            other => Err(EffectError(format!("db has no operation '{other}'"))),
        }
    }
}

/// Canned request/response table.
pub struct HttpHandler {
    responses: BTreeMap<String, Value>,
}

impl HttpHandler {
    pub fn new() -> Self {
        Self {
            responses: BTreeMap::new(),
        }
    }

    pub fn stub(&mut self, url: impl Into<String>, response: Value) {
        self.responses.insert(url.into(), response);
    }
}

impl EffectHandler for HttpHandler {
    fn name(&self) -> &'static str {
        "http"
    }

    fn check_permission(&self, _operation: &str, _principal: &Principal) -> bool {
        true
    }

    fn execute(
        &mut self,
        operation: &str,
        params: &[Value],
        _principal: &Principal,
        _metadata: &EffectMetadata,
    ) -> Result<Value, EffectError> {
        match operation {
            "call" | "get" | "post" => {
                let url = string_param(params, 0, "http")?;
                Ok(match self.responses.get(&url) {
                    Some(v) => Value::ok(v.clone()),
                    None => Value::err(Value::Str(format!("no stubbed response for {url}"))),
                })
            }
            other => Err(EffectError(format!("http has no operation '{other}'"))),
        }
    }
}

/// Path-keyed mock file map.
pub struct FsHandler {
    files: BTreeMap<String, String>,
}

impl FsHandler {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
        }
    }

    pub fn seed(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl EffectHandler for FsHandler {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn check_permission(&self, _operation: &str, _principal: &Principal) -> bool {
        true
    }

    fn execute(
        &mut self,
        operation: &str,
        params: &[Value],
        _principal: &Principal,
        _metadata: &EffectMetadata,
    ) -> Result<Value, EffectError> {
        match operation {
            "read" => {
                let path = string_param(params, 0, "fs.read")?;
                Ok(match self.files.get(&path) {
                    Some(contents) => Value::ok(Value::Str(contents.clone())),
                    None => Value::err(Value::Str(format!("no such file: {path}"))),
                })
            }
            "write" => {
                let path = string_param(params, 0, "fs.write")?;
                let contents = string_param(params, 1, "fs.write")?;
                self.files.insert(path, contents);
                Ok(Value::ok(Value::Unit))
            }
            "exists" => {
                let path = string_param(params, 0, "fs.exists")?;
                Ok(Value::Bool(self.files.contains_key(&path)))
            }
            other => Err(EffectError(format!("fs has no operation '{other}'"))),
        }
    }
}

/// Captures log lines; applies record-level redaction to the message.
pub struct LogHandler {
    lines: Vec<String>,
}

impl LogHandler {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl EffectHandler for LogHandler {
    fn name(&self) -> &'static str {
        "log"
    }

    fn check_permission(&self, _operation: &str, _principal: &Principal) -> bool {
        true
    }

    fn execute(
        &mut self,
        operation: &str,
        params: &[Value],
        _principal: &Principal,
        _metadata: &EffectMetadata,
    ) -> Result<Value, EffectError> {
        let level = match operation {
            "debug" | "info" | "warn" | "error" => operation,
            other => return Err(EffectError(format!("log has no operation '{other}'"))),
        };
        let message = params
            .first()
            .map(render_log_value)
            .unwrap_or_else(|| "".to_string());
        self.lines.push(format!("[{level}] {message}"));
        Ok(Value::Unit)
    }
}

fn render_log_value(value: &Value) -> String {
    match value {
        Value::Record {
            classification: Some(c),
            ..
        } if c.is_sensitive() => "[REDACTED]".to_string(),
        Value::Record {
            type_name,
            classification: Some(DataClassification::Internal),
            ..
        } => format!("{{type: {type_name}}}"),
        other => other.to_string(),
    }
}

/// Records published events.
pub struct EventHandler {
    published: Vec<(String, Value)>,
}

impl EventHandler {
    pub fn new() -> Self {
        Self {
            published: Vec::new(),
        }
    }

    pub fn published(&self) -> &[(String, Value)] {
        &self.published
    }
}

impl EffectHandler for EventHandler {
    fn name(&self) -> &'static str {
        "event"
    }

    fn check_permission(&self, _operation: &str, _principal: &Principal) -> bool {
        true
    }

    fn execute(
        &mut self,
        operation: &str,
        params: &[Value],
        _principal: &Principal,
        _metadata: &EffectMetadata,
    ) -> Result<Value, EffectError> {
        match operation {
            "publish" => {
                let topic = string_param(params, 0, "event.publish")?;
                let payload = params.get(1).cloned().unwrap_or(Value::Unit);
                self.published.push((topic, payload));
                Ok(Value::ok(Value::Unit))
            }
            other => Err(EffectError(format!("event has no operation '{other}'"))),
        }
    }
}

fn string_param(params: &[Value], index: usize, what: &str) -> Result<String, EffectError> {
    match params.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(EffectError(format!(
            "{what} expects a string parameter, got {}",
            other.tag()
        ))),
        None => Err(EffectError(format!("{what} is missing a parameter"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ir::FieldInfo;

    fn principal() -> Principal {
        Principal::new("test", ["admin"])
    }

    fn user_types() -> BTreeMap<String, TypeTableEntry> {
        let entry = TypeTableEntry {
            name: "User".to_string(),
            fields: vec![
                FieldInfo {
                    name: "name".to_string(),
                    ty: "string".to_string(),
                    classification: Some(DataClassification::Public),
                },
                FieldInfo {
                    name: "email".to_string(),
                    ty: "string".to_string(),
                    classification: Some(DataClassification::Internal),
                },
                FieldInfo {
                    name: "ssn".to_string(),
                    ty: "string".to_string(),
                    classification: Some(DataClassification::Restricted),
                },
            ],
            max_classification: DataClassification::Restricted,
        };
        [("User".to_string(), entry)].into_iter().collect()
    }

    fn user_record() -> Value {
        Value::Record {
            type_name: "User".to_string(),
            fields: [
                ("name".to_string(), Value::Str("ada".to_string())),
                ("email".to_string(), Value::Str("ada@example.com".to_string())),
                ("ssn".to_string(), Value::Str("123-45-6789".to_string())),
            ]
            .into_iter()
            .collect(),
            classification: Some(DataClassification::Restricted),
        }
    }

    #[test]
    fn redaction_follows_field_classifications() {
        let redacted = redact_value(&user_record(), &user_types());
        let Value::Record { fields, .. } = redacted else {
            panic!("expected record");
        };
        assert_eq!(fields["name"], Value::Str("ada".to_string()));
        assert_eq!(fields["ssn"], Value::Str("[REDACTED]".to_string()));
        let Value::Map(stub) = &fields["email"] else {
            panic!("internal field should become a type stub");
        };
        assert_eq!(stub["type"], Value::Str("string".to_string()));
    }

    #[test]
    fn sensitive_record_without_type_entry_is_fully_redacted() {
        let redacted = redact_value(&user_record(), &BTreeMap::new());
        assert_eq!(redacted, Value::Str("[REDACTED]".to_string()));
    }

    #[test]
    fn audited_dispatch_records_redacted_params() {
        let mut registry = EffectRegistry::with_default_handlers();
        let metadata = EffectMetadata {
            audit_required: true,
            resource: Some("users".to_string()),
        };
        let params = vec![Value::Str("u1".to_string()), user_record()];
        registry
            .dispatch("db", "write", &params, &principal(), &metadata, &user_types())
            .expect("dispatch ok");

        let log = registry.audit_log();
        assert_eq!(log.len(), 1);
        let entry = &log[0];
        assert!(entry.success);
        assert_eq!(entry.handler, "db");
        assert_eq!(entry.operation, "write");
        let Value::Record { fields, .. } = &entry.params[1] else {
            panic!("expected record param");
        };
        assert_eq!(fields["ssn"], Value::Str("[REDACTED]".to_string()));
    }

    #[test]
    fn permission_failure_is_audited_then_raised() {
        let mut registry = EffectRegistry::new();
        registry.register(Box::new(DbHandler::new().with_required_role("dba")));
        let metadata = EffectMetadata {
            audit_required: true,
            resource: None,
        };
        let outcome = registry.dispatch(
            "db",
            "read",
            &[Value::Str("k".to_string())],
            &Principal::new("intruder", ["viewer"]),
            &metadata,
            &BTreeMap::new(),
        );
        assert!(matches!(
            outcome,
            Err(EffectFailure::PermissionDenied { .. })
        ));
        assert_eq!(registry.audit_log().len(), 1);
        assert!(!registry.audit_log()[0].success);
    }

    #[test]
    fn unaudited_dispatch_leaves_no_log_entry() {
        let mut registry = EffectRegistry::with_default_handlers();
        registry
            .dispatch(
                "log",
                "info",
                &[Value::Str("hello".to_string())],
                &principal(),
                &EffectMetadata::default(),
                &BTreeMap::new(),
            )
            .unwrap();
        assert!(registry.audit_log().is_empty());
    }

    #[test]
    fn db_read_round_trip() {
        let mut registry = EffectRegistry::with_default_handlers();
        let metadata = EffectMetadata::default();
        let types = BTreeMap::new();
        registry
            .dispatch(
                "db",
                "write",
                &[Value::Str("k".to_string()), Value::Int(7)],
                &principal(),
                &metadata,
                &types,
            )
            .unwrap();
        let read = registry
            .dispatch(
                "db",
                "read",
                &[Value::Str("k".to_string())],
                &principal(),
                &metadata,
                &types,
            )
            .unwrap();
        assert_eq!(read, Value::some(Value::Int(7)));
    }

    #[test]
    fn log_handler_redacts_sensitive_records() {
        let mut handler = LogHandler::new();
        handler
            .execute(
                "info",
                &[user_record()],
                &principal(),
                &EffectMetadata::default(),
            )
            .unwrap();
        assert_eq!(handler.lines()[0], "[info] [REDACTED]");
    }
}
