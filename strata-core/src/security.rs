#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};

use strata_ast::{
    FunctionDecl, Module, ModuleElement, PermissionDecl, PolicyDecl, RoleDecl, TypeDefDecl,
};

/// Registered roles, permissions, policies, functions and types. Populated
/// during registration, then read-only for analysis and policy evaluation.
#[derive(Clone, Debug, Default)]
pub struct SecurityContext {
    roles: BTreeMap<String, RoleDecl>,
    permissions: BTreeMap<String, PermissionDecl>,
    policies: BTreeMap<String, PolicyDecl>,
    /// Evaluation visits policies in registration order.
    policy_order: Vec<String>,
    functions: BTreeMap<String, FunctionDecl>,
    types: BTreeMap<String, TypeDefDecl>,
}

impl SecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.roles.clear();
        self.permissions.clear();
        self.policies.clear();
        self.policy_order.clear();
        self.functions.clear();
        self.types.clear();
    }

    /// Pass 1: register every declaration in `module`.
    pub fn register_module(&mut self, module: &Module) {
        for element in &module.elements {
            match element {
                ModuleElement::Role(r) => self.register_role(r.clone()),
                ModuleElement::Permission(p) => self.register_permission(p.clone()),
                ModuleElement::Policy(p) => self.register_policy(p.clone()),
                ModuleElement::Function(f) => self.register_function(f.clone()),
                ModuleElement::TypeDef(t) => self.register_type(t.clone()),
                _ => {}
            }
        }
    }

    pub fn register_role(&mut self, role: RoleDecl) {
        self.roles.insert(role.name.clone(), role);
    }

    pub fn register_permission(&mut self, permission: PermissionDecl) {
        self.permissions.insert(permission.name.clone(), permission);
    }

    pub fn register_policy(&mut self, policy: PolicyDecl) {
        if !self.policies.contains_key(&policy.name) {
            self.policy_order.push(policy.name.clone());
        }
        self.policies.insert(policy.name.clone(), policy);
    }

    pub fn register_function(&mut self, function: FunctionDecl) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn register_type(&mut self, ty: TypeDefDecl) {
        self.types.insert(ty.name.clone(), ty);
    }

    pub fn role(&self, name: &str) -> Option<&RoleDecl> {
        self.roles.get(name)
    }

    pub fn permission(&self, name: &str) -> Option<&PermissionDecl> {
        self.permissions.get(name)
    }

    pub fn policy(&self, name: &str) -> Option<&PolicyDecl> {
        self.policies.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDefDecl> {
        self.types.get(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleDecl> {
        self.roles.values()
    }

    pub fn permissions_iter(&self) -> impl Iterator<Item = &PermissionDecl> {
        self.permissions.values()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.values()
    }

    pub fn has_policies(&self) -> bool {
        !self.policies.is_empty()
    }

    /// Policies in the order they were registered.
    pub fn policies_in_order(&self) -> impl Iterator<Item = &PolicyDecl> {
        self.policy_order
            .iter()
            .filter_map(|name| self.policies.get(name))
    }

    /// The role itself plus every ancestor reachable through `inherits`.
    pub fn effective_roles(&self, role: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_roles(role, &mut out, &mut seen);
        out
    }

    fn collect_roles(&self, role: &str, out: &mut Vec<String>, seen: &mut HashSet<String>) {
        if !seen.insert(role.to_string()) {
            return;
        }
        out.push(role.to_string());
        if let Some(decl) = self.roles.get(role) {
            for parent in &decl.inherits {
                self.collect_roles(parent, out, seen);
            }
        }
    }

    /// Transitive permission union over the inheritance chain.
    pub fn resolve_permissions(&self, role: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for name in self.effective_roles(role) {
            if let Some(decl) = self.roles.get(&name) {
                out.extend(decl.permissions.iter().cloned());
            }
        }
        out
    }

    pub fn role_has_permission(&self, role: &str, permission: &str) -> bool {
        self.resolve_permissions(role).contains(permission)
    }

    /// True when the role (or an ancestor) is listed in the function's
    /// required roles, or holds any of its required permissions.
    pub fn can_role_access_function(&self, role: &str, function: &str) -> bool {
        let Some(func) = self.functions.get(function) else {
            return false;
        };
        let effective = self.effective_roles(role);
        if func.required_roles.iter().any(|r| effective.contains(r)) {
            return true;
        }
        if !func.required_permissions.is_empty() {
            let held = self.resolve_permissions(role);
            return func
                .required_permissions
                .iter()
                .any(|p| held.contains(p));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ast::Span;

    fn role(name: &str, permissions: &[&str], inherits: &[&str]) -> RoleDecl {
        RoleDecl {
            name: name.to_string(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
            inherits: inherits.iter().map(|s| s.to_string()).collect(),
            span: Span::default(),
        }
    }

    fn function(name: &str, roles: &[&str], permissions: &[&str]) -> FunctionDecl {
        FunctionDecl {
            name: name.to_string(),
            version: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            pure: false,
            idempotent: false,
            required_roles: roles.iter().map(|s| s.to_string()).collect(),
            required_permissions: permissions.iter().map(|s| s.to_string()).collect(),
            required_capabilities: Vec::new(),
            audit_required: false,
            handles_secrets: false,
            effects: Vec::new(),
            body: Vec::new(),
            span: Span::default(),
        }
    }

    #[test]
    fn permissions_union_over_inheritance() {
        let mut ctx = SecurityContext::new();
        ctx.register_role(role("viewer", &["data.read"], &[]));
        ctx.register_role(role("editor", &["data.write"], &["viewer"]));
        ctx.register_role(role("admin", &["users.manage"], &["editor"]));

        let perms = ctx.resolve_permissions("admin");
        assert!(perms.contains("data.read"));
        assert!(perms.contains("data.write"));
        assert!(perms.contains("users.manage"));
        assert!(ctx.role_has_permission("editor", "data.read"));
        assert!(!ctx.role_has_permission("viewer", "data.write"));
    }

    #[test]
    fn inheritance_cycles_terminate() {
        let mut ctx = SecurityContext::new();
        ctx.register_role(role("a", &["p.a"], &["b"]));
        ctx.register_role(role("b", &["p.b"], &["a"]));

        let perms = ctx.resolve_permissions("a");
        assert!(perms.contains("p.a"));
        assert!(perms.contains("p.b"));
    }

    #[test]
    fn function_access_via_ancestor_role() {
        let mut ctx = SecurityContext::new();
        ctx.register_role(role("viewer", &[], &[]));
        ctx.register_role(role("admin", &[], &["viewer"]));
        ctx.register_function(function("read_stats", &["viewer"], &[]));

        assert!(ctx.can_role_access_function("admin", "read_stats"));
        assert!(ctx.can_role_access_function("viewer", "read_stats"));
        assert!(!ctx.can_role_access_function("other", "read_stats"));
    }

    #[test]
    fn function_access_via_permission() {
        let mut ctx = SecurityContext::new();
        ctx.register_role(role("ops", &["deploy.run"], &[]));
        ctx.register_function(function("deploy", &["admin"], &["deploy.run"]));

        assert!(ctx.can_role_access_function("ops", "deploy"));
    }
}
