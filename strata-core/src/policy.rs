#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use strata_ast::{PolicyRule, RuleEffect, RuleVersionConstraint};
use strata_version::{Constraint, Version};

use crate::security::SecurityContext;

/// The structured outcome of a runtime access check. Denials are data, not
/// errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
    pub matched_rule: Option<PolicyRule>,
    pub policy: Option<String>,
}

impl AccessDecision {
    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            matched_rule: None,
            policy: None,
        }
    }

    fn allowed(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            matched_rule: None,
            policy: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessReport {
    pub role: String,
    pub total: usize,
    pub allowed: usize,
    pub denied: usize,
    pub decisions: Vec<(String, AccessDecision)>,
}

/// Deny-precedence evaluation of the registered policies for one role and
/// function.
pub struct PolicyEvaluator<'a> {
    ctx: &'a SecurityContext,
    permission_heuristic: bool,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(ctx: &'a SecurityContext) -> Self {
        Self {
            ctx,
            permission_heuristic: false,
        }
    }

    /// Enable the legacy fallback that matches rule permissions against
    /// dotted-part substrings of the function name when the function
    /// declares no required permissions. Off by default.
    pub fn with_permission_heuristic(mut self, enabled: bool) -> Self {
        self.permission_heuristic = enabled;
        self
    }

    pub fn evaluate(
        &self,
        role: &str,
        function_name: &str,
        function_version: Option<&str>,
    ) -> AccessDecision {
        if self.ctx.role(role).is_none() {
            return AccessDecision::denied(format!("role '{role}' does not exist"));
        }

        let effective = self.ctx.effective_roles(role);
        let version = function_version.and_then(|v| Version::parse(v).ok());

        let mut first_allow: Option<(String, PolicyRule)> = None;
        let mut first_deny: Option<(String, PolicyRule)> = None;

        for policy in self.ctx.policies_in_order() {
            for rule in &policy.rules {
                if !self.rule_matches(rule, &effective, function_name, version.as_ref()) {
                    continue;
                }
                match rule.effect {
                    RuleEffect::Deny if first_deny.is_none() => {
                        first_deny = Some((policy.name.clone(), rule.clone()));
                    }
                    RuleEffect::Allow if first_allow.is_none() => {
                        first_allow = Some((policy.name.clone(), rule.clone()));
                    }
                    _ => {}
                }
            }
        }

        // Deny takes precedence over any allow.
        if let Some((policy, rule)) = first_deny {
            let reason = rule
                .reason
                .clone()
                .unwrap_or_else(|| format!("denied by policy '{policy}'"));
            return AccessDecision {
                allowed: false,
                reason,
                matched_rule: Some(rule),
                policy: Some(policy),
            };
        }
        if let Some((policy, rule)) = first_allow {
            let reason = rule
                .reason
                .clone()
                .unwrap_or_else(|| format!("allowed by policy '{policy}'"));
            return AccessDecision {
                allowed: true,
                reason,
                matched_rule: Some(rule),
                policy: Some(policy),
            };
        }

        if !self.ctx.has_policies() {
            // No policies registered: fall back to the function's required
            // role list.
            let allowed = self
                .ctx
                .function(function_name)
                .map(|f| {
                    f.required_roles.is_empty()
                        || f.required_roles.iter().any(|r| effective.contains(r))
                })
                .unwrap_or(false);
            return if allowed {
                AccessDecision::allowed("granted by required-role membership")
            } else {
                AccessDecision::denied("role is not listed in the function's required roles")
            };
        }

        AccessDecision::denied("no matching rule")
    }

    fn rule_matches(
        &self,
        rule: &PolicyRule,
        effective_roles: &[String],
        function_name: &str,
        version: Option<&Version>,
    ) -> bool {
        if !rule.roles.iter().any(|r| effective_roles.contains(r)) {
            return false;
        }
        if !self.rule_covers_function(rule, function_name) {
            return false;
        }
        if let Some(version) = version {
            if !version_in_scope(&rule.version_constraint, version) {
                return false;
            }
        }
        true
    }

    fn rule_covers_function(&self, rule: &PolicyRule, function_name: &str) -> bool {
        let Some(func) = self.ctx.function(function_name) else {
            return false;
        };
        if !func.required_permissions.is_empty() {
            return func
                .required_permissions
                .iter()
                .any(|p| rule.permissions.contains(p));
        }
        if self.permission_heuristic {
            return rule.permissions.iter().any(|p| {
                p.split('.')
                    .any(|part| !part.is_empty() && function_name.contains(part))
            });
        }
        false
    }

    /// One decision per function name.
    pub fn evaluate_many(
        &self,
        role: &str,
        function_names: &[&str],
    ) -> Vec<(String, AccessDecision)> {
        function_names
            .iter()
            .map(|name| (name.to_string(), self.evaluate(role, name, None)))
            .collect()
    }

    /// Registered functions the role may call.
    pub fn accessible_functions(&self, role: &str) -> Vec<String> {
        self.ctx
            .functions()
            .filter(|f| self.evaluate(role, &f.name, None).allowed)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn access_report(&self, role: &str) -> AccessReport {
        let decisions: Vec<(String, AccessDecision)> = self
            .ctx
            .functions()
            .map(|f| (f.name.clone(), self.evaluate(role, &f.name, None)))
            .collect();
        let allowed = decisions.iter().filter(|(_, d)| d.allowed).count();
        AccessReport {
            role: role.to_string(),
            total: decisions.len(),
            allowed,
            denied: decisions.len() - allowed,
            decisions,
        }
    }
}

fn version_in_scope(constraint: &RuleVersionConstraint, version: &Version) -> bool {
    match constraint {
        RuleVersionConstraint::AllVersions => true,
        RuleVersionConstraint::StableOnly => !version.is_prerelease(),
        RuleVersionConstraint::Specific(list) => list
            .iter()
            .filter_map(|v| Version::parse(v).ok())
            .any(|v| v.same_triple(version)),
        RuleVersionConstraint::Range(expr) => Constraint::parse(expr)
            .map(|c| c.satisfied_by(version))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_parse::parse_source;

    fn context(src: &str) -> SecurityContext {
        let module = parse_source(src).expect("parse ok");
        let mut ctx = SecurityContext::new();
        ctx.register_module(&module);
        ctx
    }

    const BASE: &str = r#"
    (mod m
      (role user :permissions [data.access])
      (permission data.access)
      (fn access_data :permissions [data.access] :inputs [] :outputs []
        (body 1))
      (policy main :rules [
        (allow :roles [user] :permissions [data.access] :versions all-versions)
        (deny :roles [user] :permissions [data.access] :versions all-versions :reason "locked down")]))
    "#;

    #[test]
    fn deny_takes_precedence_over_allow() {
        let ctx = context(BASE);
        let decision = PolicyEvaluator::new(&ctx).evaluate("user", "access_data", None);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "locked down");
        assert_eq!(
            decision.matched_rule.as_ref().map(|r| r.effect),
            Some(strata_ast::RuleEffect::Deny)
        );
        assert_eq!(decision.policy.as_deref(), Some("main"));
    }

    #[test]
    fn unknown_role_is_denied() {
        let ctx = context(BASE);
        let decision = PolicyEvaluator::new(&ctx).evaluate("ghost", "access_data", None);
        assert!(!decision.allowed);
        assert!(decision.reason.contains("does not exist"));
    }

    #[test]
    fn allow_matches_through_inherited_role() {
        let ctx = context(
            r#"
        (mod m
          (role base :permissions [data.access])
          (role sub :inherits [base])
          (permission data.access)
          (fn access_data :permissions [data.access] :inputs [] :outputs []
            (body 1))
          (policy p :rules [
            (allow :roles [base] :permissions [data.access] :versions all-versions)]))
        "#,
        );
        let decision = PolicyEvaluator::new(&ctx).evaluate("sub", "access_data", None);
        assert!(decision.allowed);
    }

    #[test]
    fn version_scopes_filter_rules() {
        let ctx = context(
            r#"
        (mod m
          (role ops :permissions [deploy.run])
          (permission deploy.run)
          (fn deploy :permissions [deploy.run] :inputs [] :outputs []
            (body 1))
          (policy p :rules [
            (allow :roles [ops] :permissions [deploy.run] :versions stable-only)]))
        "#,
        );
        let eval = PolicyEvaluator::new(&ctx);
        assert!(eval.evaluate("ops", "deploy", Some("1.0.0")).allowed);
        assert!(!eval.evaluate("ops", "deploy", Some("1.0.0-beta")).allowed);
        // No version supplied: the scope is not applied.
        assert!(eval.evaluate("ops", "deploy", None).allowed);
    }

    #[test]
    fn specific_versions_match_on_triple() {
        let ctx = context(
            r#"
        (mod m
          (role ops :permissions [deploy.run])
          (permission deploy.run)
          (fn deploy :permissions [deploy.run] :inputs [] :outputs []
            (body 1))
          (policy p :rules [
            (allow :roles [ops] :permissions [deploy.run] :versions [:v1.2.0])]))
        "#,
        );
        let eval = PolicyEvaluator::new(&ctx);
        assert!(eval.evaluate("ops", "deploy", Some("1.2.0")).allowed);
        assert!(!eval.evaluate("ops", "deploy", Some("1.3.0")).allowed);
    }

    #[test]
    fn no_policies_falls_back_to_required_roles() {
        let ctx = context(
            r#"
        (mod m
          (role admin)
          (fn wipe :requires [admin] :inputs [] :outputs []
            (body 1)))
        "#,
        );
        let eval = PolicyEvaluator::new(&ctx);
        assert!(eval.evaluate("admin", "wipe", None).allowed);
        let ctx2 = context(
            r#"
        (mod m
          (role viewer)
          (fn wipe :requires [admin] :inputs [] :outputs []
            (body 1)))
        "#,
        );
        let eval2 = PolicyEvaluator::new(&ctx2);
        assert!(!eval2.evaluate("viewer", "wipe", None).allowed);
    }

    #[test]
    fn policies_defined_but_none_match_is_denied() {
        let ctx = context(
            r#"
        (mod m
          (role user :permissions [data.access])
          (permission data.access)
          (fn other_fn :permissions [other.perm] :inputs [] :outputs []
            (body 1))
          (policy p :rules [
            (allow :roles [user] :permissions [data.access] :versions all-versions)]))
        "#,
        );
        let decision = PolicyEvaluator::new(&ctx).evaluate("user", "other_fn", None);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "no matching rule");
    }

    #[test]
    fn permission_heuristic_is_gated() {
        let src = r#"
        (mod m
          (role user :permissions [data.access])
          (permission data.access)
          (fn access_data :inputs [] :outputs []
            (body 1))
          (policy p :rules [
            (allow :roles [user] :permissions [data.access] :versions all-versions)]))
        "#;
        let ctx = context(src);
        // Function declares no permissions: strict evaluation finds no match.
        assert!(!PolicyEvaluator::new(&ctx)
            .evaluate("user", "access_data", None)
            .allowed);
        // The heuristic matches "data" and "access" inside the name.
        assert!(PolicyEvaluator::new(&ctx)
            .with_permission_heuristic(true)
            .evaluate("user", "access_data", None)
            .allowed);
    }

    #[test]
    fn access_report_counts() {
        let ctx = context(BASE);
        let report = PolicyEvaluator::new(&ctx).access_report("user");
        assert_eq!(report.total, 1);
        assert_eq!(report.denied, 1);
        assert_eq!(report.allowed, 0);
    }
}
