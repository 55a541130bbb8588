use crate::space::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// application segment of a profile that applies to a whole namespace
pub const APP_WILDCARD: &str = "*";
pub const DEFAULT_ARCH: &str = "x86";

/// Identity of a seccomp profile held by the external profile service.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SeccompProfile {
    pub namespace: String,
    pub application: String,
    pub name: String,
    pub version: String,
    pub architecture: String,
}

impl SeccompProfile {
    pub fn for_namespace<V>(namespace: &EntityId, version: V) -> Self
    where
        V: ToString,
    {
        Self {
            namespace: namespace.to_string(),
            application: APP_WILDCARD.to_string(),
            name: format!("{} profile", namespace),
            version: version.to_string(),
            architecture: DEFAULT_ARCH.to_string(),
        }
    }

    pub fn for_app<V>(app: &EntityId, version: V) -> Self
    where
        V: ToString,
    {
        let namespace = app
            .parent_path()
            .map(|namespace| namespace.to_string())
            .unwrap_or_default();
        Self {
            namespace,
            application: app.last_segment().to_string(),
            name: format!("{} profile", app),
            version: version.to_string(),
            architecture: DEFAULT_ARCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct SyscallRule {
    pub names: Vec<String>,
    pub action: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub default_action: String,
    pub architectures: Vec<String>,
    pub syscalls: Vec<SyscallRule>,
}

/// How the profile of a new namespace or app is derived.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ProfileStrategy {
    /// submit a complete new definition
    #[strum(serialize = "redefine")]
    Redefine,
    /// take the parent's definition and layer additional syscall rules on it
    #[strum(serialize = "extend")]
    Extend,
    /// copy the parent's definition verbatim
    #[default]
    #[strum(serialize = "inherit")]
    Inherit,
}

impl ProfileStrategy {
    /// anything that is not `redefine` or `extend` inherits
    pub fn parse<S>(strategy: S) -> Self
    where
        S: AsRef<str>,
    {
        Self::from_str(strategy.as_ref().trim()).unwrap_or_default()
    }
}
