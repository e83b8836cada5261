#![forbid(unsafe_code)]

mod effects;
mod natives;
mod vm;

use serde::{Deserialize, Serialize};

pub use effects::{
    redact_value, AuditEntry, DbHandler, EffectError, EffectFailure, EffectHandler,
    EffectMetadata, EffectRegistry, EventHandler, FsHandler, HttpHandler, LogHandler,
};
pub use natives::NativeRegistry;
pub use vm::{Vm, VmError};

/// The caller identity at runtime: an id plus a set of role strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }
}
