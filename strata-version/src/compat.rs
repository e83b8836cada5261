#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strata_ast::{FunctionDecl, Param, TypeDefDecl};

/// Overall result of comparing two versions of the same entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompatLevel {
    FullyCompatible,
    /// Only warnings; existing callers keep working.
    BackwardCompatible,
    Breaking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Note,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompatReport {
    pub level: CompatLevel,
    pub issues: Vec<CompatIssue>,
}

impl CompatReport {
    pub fn errors(&self) -> impl Iterator<Item = &CompatIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CompatIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
    }

    pub fn is_breaking(&self) -> bool {
        self.level == CompatLevel::Breaking
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
}

/// Suggested version bump for a change with the given report.
pub fn suggest_bump(report: &CompatReport) -> BumpKind {
    match report.level {
        CompatLevel::Breaking => BumpKind::Major,
        CompatLevel::BackwardCompatible => BumpKind::Minor,
        CompatLevel::FullyCompatible => {
            if report.issues.is_empty() {
                BumpKind::Patch
            } else {
                BumpKind::Minor
            }
        }
    }
}

struct IssueSink {
    issues: Vec<CompatIssue>,
}

impl IssueSink {
    fn new() -> Self {
        Self { issues: Vec::new() }
    }

    fn error(&mut self, message: String) {
        self.issues.push(CompatIssue {
            severity: IssueSeverity::Error,
            message,
        });
    }

    fn warning(&mut self, message: String) {
        self.issues.push(CompatIssue {
            severity: IssueSeverity::Warning,
            message,
        });
    }

    fn note(&mut self, message: String) {
        self.issues.push(CompatIssue {
            severity: IssueSeverity::Note,
            message,
        });
    }

    fn finish(self) -> CompatReport {
        let level = if self
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
        {
            CompatLevel::Breaking
        } else if self
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Warning)
        {
            CompatLevel::BackwardCompatible
        } else {
            CompatLevel::FullyCompatible
        };
        CompatReport {
            level,
            issues: self.issues,
        }
    }
}

/// Classify the change from `old` to `new`. Types are compared by their
/// rendered form; effects and security sets by membership.
pub fn analyze_functions(old: &FunctionDecl, new: &FunctionDecl) -> CompatReport {
    let mut sink = IssueSink::new();

    check_params(&mut sink, "input", &old.inputs, &new.inputs);
    check_params(&mut sink, "output", &old.outputs, &new.outputs);

    let old_effects: BTreeSet<(String, String)> = old
        .effects
        .iter()
        .map(|e| (e.effect_type.clone(), e.target.clone()))
        .collect();
    let new_effects: BTreeSet<(String, String)> = new
        .effects
        .iter()
        .map(|e| (e.effect_type.clone(), e.target.clone()))
        .collect();
    for (ty, target) in new_effects.difference(&old_effects) {
        sink.error(format!("effect ({ty} {target}) added"));
    }
    for (ty, target) in old_effects.difference(&new_effects) {
        sink.warning(format!("effect ({ty} {target}) removed"));
    }

    for role in &new.required_roles {
        if !old.required_roles.contains(role) {
            sink.error(format!("required role '{role}' added"));
        }
    }
    for role in &old.required_roles {
        if !new.required_roles.contains(role) {
            sink.warning(format!("required role '{role}' removed"));
        }
    }
    for cap in &new.required_capabilities {
        if !old.required_capabilities.contains(cap) {
            sink.error(format!("required capability '{cap}' added"));
        }
    }
    if new.audit_required && !old.audit_required {
        sink.warning("audit requirement added".to_string());
    }

    if old.pure && !new.pure {
        sink.error("function is no longer pure".to_string());
    }

    sink.finish()
}

fn check_params(sink: &mut IssueSink, kind: &str, old: &[Param], new: &[Param]) {
    for (i, old_param) in old.iter().enumerate() {
        match new.get(i) {
            None => sink.error(format!(
                "{kind} parameter '{}' removed",
                old_param.name
            )),
            Some(new_param) => {
                let old_ty = old_param.ty.to_string();
                let new_ty = new_param.ty.to_string();
                if old_ty != new_ty {
                    sink.error(format!(
                        "{kind} parameter '{}' changed type from {old_ty} to {new_ty}",
                        old_param.name
                    ));
                }
            }
        }
    }
    for new_param in new.iter().skip(old.len()) {
        if kind == "input" && !new_param.optional {
            sink.error(format!(
                "required input parameter '{}' added",
                new_param.name
            ));
        } else {
            sink.note(format!("{kind} parameter '{}' added", new_param.name));
        }
    }
}

/// Classify the change between two versions of a record type.
pub fn analyze_types(old: &TypeDefDecl, new: &TypeDefDecl) -> CompatReport {
    let mut sink = IssueSink::new();

    for old_field in &old.fields {
        match new.fields.iter().find(|f| f.name == old_field.name) {
            None => sink.error(format!("field '{}' removed", old_field.name)),
            Some(new_field) => {
                let old_ty = old_field.ty.to_string();
                let new_ty = new_field.ty.to_string();
                if old_ty != new_ty {
                    sink.error(format!(
                        "field '{}' changed type from {old_ty} to {new_ty}",
                        old_field.name
                    ));
                }
                let old_class = old_field.classification.unwrap_or_default();
                let new_class = new_field.classification.unwrap_or_default();
                if new_class > old_class {
                    sink.warning(format!(
                        "field '{}' classification raised from {} to {}",
                        old_field.name,
                        old_class.display(),
                        new_class.display()
                    ));
                } else if new_class < old_class {
                    sink.warning(format!(
                        "field '{}' classification lowered from {} to {}",
                        old_field.name,
                        old_class.display(),
                        new_class.display()
                    ));
                }
            }
        }
    }
    for new_field in &new.fields {
        if !old.fields.iter().any(|f| f.name == new_field.name) {
            sink.note(format!("field '{}' added", new_field.name));
        }
    }

    sink.finish()
}
