#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_ast::FunctionDecl;

use crate::compat::{analyze_functions, CompatLevel};
use crate::registry::VersionRegistry;
use crate::Version;

/// A registered migration function for one version step of a target function.
#[derive(Clone, Debug)]
pub struct MigrationRecord {
    pub target: String,
    pub from_version: Version,
    pub to_version: Version,
    pub node: FunctionDecl,
    pub validated: bool,
    pub issues: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub from: Version,
    pub to: Version,
}

/// The chain of migration steps from one version toward another;
/// `is_complete` is false when a step has no registered migration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationPath {
    pub function: String,
    pub steps: Vec<MigrationStep>,
    pub is_complete: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoverageReport {
    pub function: String,
    pub total_pairs: usize,
    pub covered_pairs: usize,
    pub coverage_percentage: f64,
    pub missing: Vec<MigrationStep>,
}

/// Migrations keyed by target function name.
#[derive(Clone, Debug, Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<String, Vec<MigrationRecord>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.migrations.clear();
    }

    pub fn register(
        &mut self,
        target: &str,
        from: Version,
        to: Version,
        node: FunctionDecl,
    ) -> &MigrationRecord {
        let records = self.migrations.entry(target.to_string()).or_default();
        records.push(MigrationRecord {
            target: target.to_string(),
            from_version: from,
            to_version: to,
            node,
            validated: false,
            issues: Vec::new(),
        });
        records.last().expect("just pushed")
    }

    pub fn remove(&mut self, target: &str, from: &Version, to: &Version) -> bool {
        let Some(records) = self.migrations.get_mut(target) else {
            return false;
        };
        let before = records.len();
        records.retain(|r| !(r.from_version == *from && r.to_version == *to));
        records.len() != before
    }

    pub fn migrations_for(&self, target: &str) -> &[MigrationRecord] {
        self.migrations
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find(&self, target: &str, from: &Version, to: &Version) -> Option<&MigrationRecord> {
        self.migrations_for(target)
            .iter()
            .find(|r| r.from_version == *from && r.to_version == *to)
    }

    /// Check a registered migration against the source and target function
    /// declarations and store the outcome on the record.
    ///
    /// A migration translates arguments forward: its inputs must match the
    /// source function's inputs and its outputs must match the target
    /// function's inputs. It must be pure and rollback-safe, and there must
    /// be something to migrate (the pair must not be fully compatible).
    pub fn validate(
        &mut self,
        target: &str,
        from: &Version,
        to: &Version,
        source_fn: &FunctionDecl,
        target_fn: &FunctionDecl,
    ) -> Option<&MigrationRecord> {
        let records = self.migrations.get_mut(target)?;
        let record = records
            .iter_mut()
            .find(|r| r.from_version == *from && r.to_version == *to)?;

        let mut issues = Vec::new();

        let migration_inputs: Vec<String> =
            record.node.inputs.iter().map(|p| p.ty.to_string()).collect();
        let source_inputs: Vec<String> =
            source_fn.inputs.iter().map(|p| p.ty.to_string()).collect();
        if migration_inputs != source_inputs {
            issues.push(format!(
                "migration inputs [{}] do not match source inputs [{}]",
                migration_inputs.join(", "),
                source_inputs.join(", ")
            ));
        }

        let migration_outputs: Vec<String> =
            record.node.outputs.iter().map(|p| p.ty.to_string()).collect();
        let target_inputs: Vec<String> =
            target_fn.inputs.iter().map(|p| p.ty.to_string()).collect();
        if migration_outputs != target_inputs {
            issues.push(format!(
                "migration outputs [{}] do not match target inputs [{}]",
                migration_outputs.join(", "),
                target_inputs.join(", ")
            ));
        }

        if !record.node.pure {
            issues.push("migration must be pure".to_string());
        }
        let rollback_safe = record
            .node
            .version
            .as_ref()
            .and_then(|v| v.rollback_safe)
            .unwrap_or(false);
        if !rollback_safe {
            issues.push("migration must be rollback-safe".to_string());
        }

        if analyze_functions(source_fn, target_fn).level == CompatLevel::FullyCompatible {
            issues.push(
                "source and target are fully compatible; no migration is needed".to_string(),
            );
        }

        record.validated = issues.is_empty();
        record.issues = issues;
        Some(record)
    }

    /// Walk the replacement chain from `from` and pair each hop with its
    /// registered migration. Stops at the first hop without one.
    pub fn build_path<T>(
        &self,
        function: &str,
        from: &Version,
        to: &Version,
        registry: &VersionRegistry<T>,
    ) -> MigrationPath {
        let mut steps = Vec::new();
        let mut cursor = from.clone();

        for next in registry.replacement_chain(function, from) {
            if self.find(function, &cursor, &next).is_none() {
                return MigrationPath {
                    function: function.to_string(),
                    steps,
                    is_complete: false,
                };
            }
            steps.push(MigrationStep {
                from: cursor.clone(),
                to: next.clone(),
            });
            cursor = next;
            if cursor == *to {
                break;
            }
        }

        let is_complete = steps.last().map(|s| &s.to) == Some(to);
        MigrationPath {
            function: function.to_string(),
            steps,
            is_complete,
        }
    }

    /// Coverage over every ordered version pair of `function`.
    pub fn analyze_coverage<T>(
        &self,
        function: &str,
        registry: &VersionRegistry<T>,
    ) -> CoverageReport {
        let versions = registry
            .chain(function)
            .map(|c| c.sorted_versions())
            .unwrap_or_default();

        let mut total = 0usize;
        let mut covered = 0usize;
        let mut missing = Vec::new();
        for i in 0..versions.len() {
            for j in (i + 1)..versions.len() {
                total += 1;
                let hit = self
                    .find(function, &versions[i], &versions[j])
                    .map(|r| r.validated)
                    .unwrap_or(false);
                if hit {
                    covered += 1;
                } else {
                    missing.push(MigrationStep {
                        from: versions[i].clone(),
                        to: versions[j].clone(),
                    });
                }
            }
        }

        let coverage_percentage = if total == 0 {
            100.0
        } else {
            covered as f64 * 100.0 / total as f64
        };
        CoverageReport {
            function: function.to_string(),
            total_pairs: total,
            covered_pairs: covered,
            coverage_percentage,
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ast::{Param, Span, TypeExpr, VersionInfo};

    fn param(name: &str, ty: &str) -> Param {
        Param {
            name: name.to_string(),
            ty: TypeExpr::from_name(ty),
            optional: false,
            classification: None,
            span: Span::default(),
        }
    }

    fn function(name: &str, inputs: Vec<Param>, outputs: Vec<Param>) -> FunctionDecl {
        FunctionDecl {
            name: name.to_string(),
            version: None,
            inputs,
            outputs,
            pure: true,
            idempotent: false,
            required_roles: Vec::new(),
            required_permissions: Vec::new(),
            required_capabilities: Vec::new(),
            audit_required: false,
            handles_secrets: false,
            effects: Vec::new(),
            body: Vec::new(),
            span: Span::default(),
        }
    }

    fn migration_node(inputs: Vec<Param>, outputs: Vec<Param>) -> FunctionDecl {
        let mut f = function("migrate", inputs, outputs);
        f.version = Some(VersionInfo {
            version: "1.0.0".to_string(),
            rollback_safe: Some(true),
            ..VersionInfo::default()
        });
        f
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn validation_checks_signatures() {
        let source = function("calc", vec![param("x", "int")], vec![param("r", "int")]);
        let target = function(
            "calc",
            vec![param("x", "int"), param("y", "int")],
            vec![param("r", "int")],
        );

        let mut reg = MigrationRegistry::new();
        reg.register(
            "calc",
            v("1.0.0"),
            v("2.0.0"),
            migration_node(
                vec![param("x", "int")],
                vec![param("x", "int"), param("y", "int")],
            ),
        );
        let record = reg
            .validate("calc", &v("1.0.0"), &v("2.0.0"), &source, &target)
            .unwrap();
        assert!(record.validated, "issues: {:?}", record.issues);
    }

    #[test]
    fn impure_migration_is_rejected() {
        let source = function("calc", vec![param("x", "int")], vec![param("r", "int")]);
        let target = function("calc", vec![param("x", "string")], vec![param("r", "int")]);

        let mut node =
            migration_node(vec![param("x", "int")], vec![param("x", "string")]);
        node.pure = false;

        let mut reg = MigrationRegistry::new();
        reg.register("calc", v("1.0.0"), v("2.0.0"), node);
        let record = reg
            .validate("calc", &v("1.0.0"), &v("2.0.0"), &source, &target)
            .unwrap();
        assert!(!record.validated);
        assert!(record.issues.iter().any(|i| i.contains("pure")));
    }

    #[test]
    fn fully_compatible_pair_needs_no_migration() {
        let source = function("calc", vec![param("x", "int")], vec![param("r", "int")]);
        let target = source.clone();

        let mut reg = MigrationRegistry::new();
        reg.register(
            "calc",
            v("1.0.0"),
            v("1.0.1"),
            migration_node(vec![param("x", "int")], vec![param("x", "int")]),
        );
        let record = reg
            .validate("calc", &v("1.0.0"), &v("1.0.1"), &source, &target)
            .unwrap();
        assert!(!record.validated);
        assert!(record
            .issues
            .iter()
            .any(|i| i.contains("no migration is needed")));
    }

    #[test]
    fn build_path_walks_the_replacement_chain() {
        let mut versions: VersionRegistry<u32> = VersionRegistry::new();
        versions
            .register(
                "calc",
                &VersionInfo {
                    version: "1.0.0".to_string(),
                    ..VersionInfo::default()
                },
                1,
            )
            .unwrap();
        versions
            .register(
                "calc",
                &VersionInfo {
                    version: "2.0.0".to_string(),
                    replaces: Some("1.0.0".to_string()),
                    ..VersionInfo::default()
                },
                2,
            )
            .unwrap();
        versions
            .register(
                "calc",
                &VersionInfo {
                    version: "3.0.0".to_string(),
                    replaces: Some("2.0.0".to_string()),
                    ..VersionInfo::default()
                },
                3,
            )
            .unwrap();

        let mut reg = MigrationRegistry::new();
        let node = migration_node(vec![param("x", "int")], vec![param("x", "int")]);
        reg.register("calc", v("1.0.0"), v("2.0.0"), node.clone());
        reg.register("calc", v("2.0.0"), v("3.0.0"), node);

        let path = reg.build_path("calc", &v("1.0.0"), &v("3.0.0"), &versions);
        assert!(path.is_complete);
        assert_eq!(path.steps.len(), 2);

        assert!(reg.remove("calc", &v("2.0.0"), &v("3.0.0")));
        let path = reg.build_path("calc", &v("1.0.0"), &v("3.0.0"), &versions);
        assert!(!path.is_complete);
        assert_eq!(path.steps.len(), 1);
    }

    #[test]
    fn coverage_counts_validated_pairs_only() {
        let mut versions: VersionRegistry<u32> = VersionRegistry::new();
        for ver in ["1.0.0", "2.0.0", "3.0.0"] {
            versions
                .register(
                    "calc",
                    &VersionInfo {
                        version: ver.to_string(),
                        ..VersionInfo::default()
                    },
                    0,
                )
                .unwrap();
        }

        let source = function("calc", vec![param("x", "int")], vec![param("r", "int")]);
        let target = function("calc", vec![param("x", "string")], vec![param("r", "int")]);

        let mut reg = MigrationRegistry::new();
        reg.register(
            "calc",
            v("1.0.0"),
            v("2.0.0"),
            migration_node(vec![param("x", "int")], vec![param("x", "string")]),
        );
        reg.validate("calc", &v("1.0.0"), &v("2.0.0"), &source, &target);

        let report = reg.analyze_coverage("calc", &versions);
        assert_eq!(report.total_pairs, 3);
        assert_eq!(report.covered_pairs, 1);
        assert_eq!(report.missing.len(), 2);
        assert!((report.coverage_percentage - 33.333).abs() < 0.01);
    }
}
