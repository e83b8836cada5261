#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use strata_ast::{FunctionDecl, Module, ModuleElement, Stability, TypeDefDecl, VersionInfo};
use strata_version::{
    analyze_functions, analyze_types, CompatReport, Constraint, IssueSeverity, MigrationRegistry,
    Version, VersionRegistry,
};

use crate::analyzer::SecurityAnalyzer;
use crate::diagnostics::DiagnosticBuilder;
use crate::security::SecurityContext;

/// Compiler options. `strict_versioning` and `require_migrations` are
/// accepted but currently have no effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompilerOptions {
    pub strict_versioning: bool,
    pub warn_on_deprecated: bool,
    pub require_migrations: bool,
    pub allow_unstable_versions: bool,
}

impl CompilerOptions {
    /// Build options from string pairs; unknown keys are ignored.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        let mut options = CompilerOptions::default();
        for (key, value) in pairs {
            match key {
                "strict_versioning" => options.strict_versioning = value,
                "warn_on_deprecated" => options.warn_on_deprecated = value,
                "require_migrations" => options.require_migrations = value,
                "allow_unstable_versions" => options.allow_unstable_versions = value,
                _ => {}
            }
        }
        options
    }
}

/// Owns the registries and diagnostics for one compilation. Modules are
/// registered, validated, then the registries are read-only.
#[derive(Debug, Default)]
pub struct CompilerContext {
    pub functions: VersionRegistry<FunctionDecl>,
    pub types: VersionRegistry<TypeDefDecl>,
    pub migrations: MigrationRegistry,
    pub security: SecurityContext,
    pub diagnostics: DiagnosticBuilder,
    modules: BTreeMap<String, Module>,
    options: CompilerOptions,
}

impl CompilerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn reset(&mut self) {
        self.functions.clear();
        self.types.clear();
        self.migrations.clear();
        self.security.clear();
        self.diagnostics.clear();
        self.modules.clear();
    }

    /// Validate and register every versioned entity in `module`, then record
    /// the module's security declarations. Entities that fail validation are
    /// skipped; other entities still register.
    pub fn register_module(&mut self, module: &Module) {
        for element in &module.elements {
            match element {
                ModuleElement::Function(func) => {
                    if let Some(info) = &func.version {
                        if self.validate_function_entity(func, info) {
                            // Parse errors were already reported above.
                            let _ = self.functions.register(&func.name, info, func.clone());
                        }
                    }
                }
                ModuleElement::TypeDef(ty) => {
                    if let Some(info) = &ty.version {
                        if self.validate_type_entity(ty, info) {
                            let _ = self.types.register(&ty.name, info, ty.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        self.security.register_module(module);
        self.modules.insert(module.name.clone(), module.clone());
    }

    /// Run static security analysis over everything registered so far.
    pub fn analyze_security(&mut self) {
        SecurityAnalyzer::new(&self.security).analyze(&mut self.diagnostics);
    }

    fn validate_function_entity(&mut self, func: &FunctionDecl, info: &VersionInfo) -> bool {
        let Ok(version) = Version::parse(&info.version) else {
            self.diagnostics.error(
                format!(
                    "function '{}' has unparseable version '{}'",
                    func.name, info.version
                ),
                func.span,
                Some("VER001"),
            );
            return false;
        };

        self.common_entity_checks(&func.name, func.span, info);

        if let Some(replaces) = &info.replaces {
            let Ok(predecessor) = Version::parse(replaces) else {
                self.diagnostics.error(
                    format!(
                        "function '{}' replaces unparseable version '{replaces}'",
                        func.name
                    ),
                    func.span,
                    Some("VER001"),
                );
                return false;
            };
            if let Some(previous) = self.functions.get(&func.name, &predecessor) {
                let report = analyze_functions(&previous.node, func);
                self.report_breaking_changes(
                    &func.name,
                    func.span,
                    &version,
                    &predecessor,
                    &report,
                    "VER003",
                    "VER004",
                );
            }
        }
        true
    }

    fn validate_type_entity(&mut self, ty: &TypeDefDecl, info: &VersionInfo) -> bool {
        let Ok(version) = Version::parse(&info.version) else {
            self.diagnostics.error(
                format!(
                    "type '{}' has unparseable version '{}'",
                    ty.name, info.version
                ),
                ty.span,
                Some("VER001"),
            );
            return false;
        };

        self.common_entity_checks(&ty.name, ty.span, info);

        if let Some(replaces) = &info.replaces {
            let Ok(predecessor) = Version::parse(replaces) else {
                self.diagnostics.error(
                    format!(
                        "type '{}' replaces unparseable version '{replaces}'",
                        ty.name
                    ),
                    ty.span,
                    Some("VER001"),
                );
                return false;
            };
            if let Some(previous) = self.types.get(&ty.name, &predecessor) {
                let report = analyze_types(&previous.node, ty);
                self.report_breaking_changes(
                    &ty.name,
                    ty.span,
                    &version,
                    &predecessor,
                    &report,
                    "VER007",
                    "VER007",
                );
            }
        }
        true
    }

    fn common_entity_checks(&mut self, name: &str, span: strata_ast::Span, info: &VersionInfo) {
        if self.options.warn_on_deprecated
            && (info.deprecated || info.stability == Stability::Deprecated)
        {
            self.diagnostics.warning(
                format!("'{name}' registers a deprecated version {}", info.version),
                span,
                Some("VER005"),
            );
        }
        if !self.options.allow_unstable_versions
            && matches!(info.stability, Stability::Alpha | Stability::Beta)
        {
            self.diagnostics.warning(
                format!(
                    "'{name}' registers {} version {}",
                    info.stability.display(),
                    info.version
                ),
                span,
                Some("VER006"),
            );
        }
    }

    fn report_breaking_changes(
        &mut self,
        name: &str,
        span: strata_ast::Span,
        version: &Version,
        predecessor: &Version,
        report: &CompatReport,
        breaking_code: &str,
        detail_code: &str,
    ) {
        if report.is_breaking() && version.major() <= predecessor.major() {
            self.diagnostics.error(
                format!(
                    "'{name}' {version} breaks {predecessor} without a major version bump"
                ),
                span,
                Some(breaking_code),
            );
        }
        for issue in &report.issues {
            if issue.severity == IssueSeverity::Error {
                self.diagnostics
                    .warning(format!("'{name}': {}", issue.message), span, Some(detail_code));
            }
        }
    }

    /// Resolve a function by constraint string; reports `VER008`/`VER009`.
    pub fn resolve_function_version(
        &mut self,
        name: &str,
        constraint: &str,
    ) -> Option<&FunctionDecl> {
        let parsed = match Constraint::parse(constraint) {
            Ok(c) => c,
            Err(_) => {
                self.diagnostics.error(
                    format!("invalid version constraint '{constraint}' for function '{name}'"),
                    strata_ast::Span::default(),
                    Some("VER008"),
                );
                return None;
            }
        };
        match self.functions.resolve(name, &parsed) {
            Some(entity) => Some(&entity.node),
            None => {
                self.diagnostics.error(
                    format!("no version of function '{name}' satisfies '{constraint}'"),
                    strata_ast::Span::default(),
                    Some("VER009"),
                );
                None
            }
        }
    }

    /// Resolve a type by constraint string; reports `VER010`.
    pub fn resolve_type_version(&mut self, name: &str, constraint: &str) -> Option<&TypeDefDecl> {
        let parsed = match Constraint::parse(constraint) {
            Ok(c) => c,
            Err(_) => {
                self.diagnostics.error(
                    format!("invalid version constraint '{constraint}' for type '{name}'"),
                    strata_ast::Span::default(),
                    Some("VER010"),
                );
                return None;
            }
        };
        match self.types.resolve(name, &parsed) {
            Some(entity) => Some(&entity.node),
            None => {
                self.diagnostics.error(
                    format!("no version of type '{name}' satisfies '{constraint}'"),
                    strata_ast::Span::default(),
                    Some("VER010"),
                );
                None
            }
        }
    }
}
