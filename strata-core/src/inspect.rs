#![forbid(unsafe_code)]

use std::fmt::Write;

use crate::context::CompilerContext;
use crate::diagnostics::render_diagnostic;
use crate::policy::PolicyEvaluator;

/// Which sections `inspect` renders.
#[derive(Clone, Copy, Debug, Default)]
pub struct InspectFlags {
    pub versions: bool,
    pub security: bool,
    pub diagnostics: bool,
}

impl InspectFlags {
    pub fn all() -> Self {
        Self {
            versions: true,
            security: true,
            diagnostics: true,
        }
    }
}

/// A plain-text report over the registered state of `ctx`.
pub fn inspect(ctx: &CompilerContext, source: &str, flags: InspectFlags) -> String {
    let mut out = String::new();

    if flags.versions {
        out.push_str("== versions ==\n");
        let names: Vec<String> = ctx.functions.names().map(str::to_string).collect();
        for name in names {
            let Some(chain) = ctx.functions.chain(&name) else {
                continue;
            };
            let _ = writeln!(out, "fn {name}");
            for version in chain.sorted_versions() {
                let Some(entity) = ctx.functions.get(&name, &version) else {
                    continue;
                };
                let mut line = format!("  {version} ({})", entity.stability.display());
                if chain.latest_version.as_ref() == Some(&version) {
                    line.push_str(" [latest]");
                }
                if chain.latest_stable_version.as_ref() == Some(&version) {
                    line.push_str(" [latest-stable]");
                }
                if let Some(replaces) = &entity.replaces {
                    let _ = write!(line, " replaces {replaces}");
                }
                let _ = writeln!(out, "{line}");
            }
        }
        for name in ctx.types.names() {
            let Some(chain) = ctx.types.chain(name) else {
                continue;
            };
            let _ = writeln!(out, "type {name}");
            for version in chain.sorted_versions() {
                let _ = writeln!(out, "  {version}");
            }
        }
    }

    if flags.security {
        out.push_str("== security ==\n");
        for role in ctx.security.roles() {
            let permissions = ctx.security.resolve_permissions(&role.name);
            let _ = writeln!(
                out,
                "role {} -> [{}]",
                role.name,
                permissions.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        let evaluator = PolicyEvaluator::new(&ctx.security);
        for role in ctx.security.roles() {
            let report = evaluator.access_report(&role.name);
            let _ = writeln!(
                out,
                "access {}: {} allowed, {} denied of {}",
                report.role, report.allowed, report.denied, report.total
            );
        }
    }

    if flags.diagnostics {
        out.push_str("== diagnostics ==\n");
        for diag in ctx.diagnostics.iter() {
            out.push_str(&render_diagnostic(diag, source));
        }
    }

    out
}
