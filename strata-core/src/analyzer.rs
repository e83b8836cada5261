#![forbid(unsafe_code)]

use std::collections::HashSet;

use strata_ast::{DataClassification, FunctionDecl, TypeExpr};

use crate::diagnostics::DiagnosticBuilder;
use crate::security::SecurityContext;

/// Pass 2 of the security pipeline: reference validation, inheritance cycle
/// detection and classification hygiene over an already-populated context.
pub struct SecurityAnalyzer<'a> {
    ctx: &'a SecurityContext,
}

impl<'a> SecurityAnalyzer<'a> {
    pub fn new(ctx: &'a SecurityContext) -> Self {
        Self { ctx }
    }

    pub fn analyze(&self, diags: &mut DiagnosticBuilder) {
        self.check_roles(diags);
        self.check_policies(diags);
        self.check_functions(diags);
    }

    fn check_roles(&self, diags: &mut DiagnosticBuilder) {
        for role in self.ctx.roles() {
            for parent in &role.inherits {
                if self.ctx.role(parent).is_none() {
                    diags.error(
                        format!(
                            "role '{}' inherits from undefined role '{parent}'",
                            role.name
                        ),
                        role.span,
                        Some("SEC001"),
                    );
                }
            }
            if self.has_inheritance_cycle(&role.name) {
                diags.error(
                    format!("role '{}' participates in an inheritance cycle", role.name),
                    role.span,
                    Some("SEC002"),
                );
            }
            for permission in &role.permissions {
                if self.ctx.permission(permission).is_none() {
                    diags.warning(
                        format!(
                            "role '{}' grants undeclared permission '{permission}'",
                            role.name
                        ),
                        role.span,
                        Some("SEC003"),
                    );
                }
            }
        }
    }

    fn has_inheritance_cycle(&self, start: &str) -> bool {
        let mut stack = vec![start.to_string()];
        let mut visited = HashSet::new();
        while let Some(name) = stack.pop() {
            if let Some(role) = self.ctx.role(&name) {
                for parent in &role.inherits {
                    if parent == start {
                        return true;
                    }
                    if visited.insert(parent.clone()) {
                        stack.push(parent.clone());
                    }
                }
            }
        }
        false
    }

    fn check_policies(&self, diags: &mut DiagnosticBuilder) {
        for policy in self.ctx.policies_in_order() {
            for rule in &policy.rules {
                for role in &rule.roles {
                    if self.ctx.role(role).is_none() {
                        diags.error(
                            format!(
                                "policy '{}' references undefined role '{role}'",
                                policy.name
                            ),
                            rule.span,
                            Some("SEC004"),
                        );
                    }
                }
                for permission in &rule.permissions {
                    if self.ctx.permission(permission).is_none() {
                        diags.warning(
                            format!(
                                "policy '{}' references undeclared permission '{permission}'",
                                policy.name
                            ),
                            rule.span,
                            Some("SEC005"),
                        );
                    }
                }
            }
        }
    }

    fn check_functions(&self, diags: &mut DiagnosticBuilder) {
        for func in self.ctx.functions() {
            for role in &func.required_roles {
                if self.ctx.role(role).is_none() {
                    diags.error(
                        format!(
                            "function '{}' requires undefined role '{role}'",
                            func.name
                        ),
                        func.span,
                        Some("SEC006"),
                    );
                }
            }
            for permission in &func.required_permissions {
                if self.ctx.permission(permission).is_none() {
                    diags.warning(
                        format!(
                            "function '{}' requires undeclared permission '{permission}'",
                            func.name
                        ),
                        func.span,
                        Some("SEC007"),
                    );
                }
            }
            if func.handles_secrets && !func.audit_required {
                diags
                    .warning(
                        format!(
                            "function '{}' handles secrets but is not audited",
                            func.name
                        ),
                        func.span,
                        Some("SEC008"),
                    )
                    .with_hint("add :audit true to record access to secret data");
            }
            self.check_classified_types(func, diags);
        }
    }

    /// SEC009: confidential or restricted data flowing through a function
    /// that does not audit.
    fn check_classified_types(&self, func: &FunctionDecl, diags: &mut DiagnosticBuilder) {
        if func.audit_required {
            return;
        }
        let mut reported = HashSet::new();
        for param in func.inputs.iter().chain(func.outputs.iter()) {
            for name in named_types(&param.ty) {
                if !reported.insert(name.clone()) {
                    continue;
                }
                let Some(ty) = self.ctx.type_def(&name) else {
                    continue;
                };
                if ty.max_classification() >= DataClassification::Confidential {
                    diags.warning(
                        format!(
                            "function '{}' handles {} data of type '{}' without auditing",
                            func.name,
                            ty.max_classification().display(),
                            name
                        ),
                        param.span,
                        Some("SEC009"),
                    );
                }
            }
        }
    }
}

fn named_types(ty: &TypeExpr) -> Vec<String> {
    let mut out = Vec::new();
    collect_named(ty, &mut out);
    out
}

fn collect_named(ty: &TypeExpr, out: &mut Vec<String>) {
    match ty {
        TypeExpr::Named(name) => out.push(name.clone()),
        TypeExpr::Generic { args, .. } => {
            for arg in args {
                collect_named(arg, out);
            }
        }
        TypeExpr::Primitive(_) => {}
    }
}
