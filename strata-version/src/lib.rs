#![forbid(unsafe_code)]

mod compat;
mod constraint;
mod migration;
mod registry;
mod version;

use thiserror::Error;

pub use compat::{
    analyze_functions, analyze_types, suggest_bump, BumpKind, CompatIssue, CompatLevel,
    CompatReport, IssueSeverity,
};
pub use constraint::Constraint;
pub use migration::{
    CoverageReport, MigrationPath, MigrationRecord, MigrationRegistry, MigrationStep,
};
pub use registry::{VersionChain, VersionRegistry, VersionedEntity};
pub use version::Version;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{0}'")]
    InvalidVersion(String),
    #[error("invalid version constraint '{0}'")]
    InvalidConstraint(String),
}
