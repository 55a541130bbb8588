use crate::space::entity::EntityId;
use crate::space::profile::SeccompProfile;
use crate::space::quota::ResourceQuotas;
use serde::{Deserialize, Serialize};

/// A leaf workload attached to exactly one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub namespace: EntityId,
    pub name: String,
    pub profile_version: String,
    pub quotas: ResourceQuotas,
}

impl App {
    pub fn new<N, V>(namespace: EntityId, name: N, profile_version: V) -> Self
    where
        N: ToString,
        V: ToString,
    {
        Self {
            namespace,
            name: name.to_string(),
            profile_version: profile_version.to_string(),
            quotas: ResourceQuotas::new(),
        }
    }

    pub fn with_quotas(mut self, quotas: ResourceQuotas) -> Self {
        self.quotas = quotas;
        self
    }

    pub fn id(&self) -> EntityId {
        self.namespace.push(&self.name)
    }

    pub fn org(&self) -> &str {
        self.namespace.org()
    }

    pub fn seccomp_profile(&self) -> SeccompProfile {
        SeccompProfile::for_app(&self.id(), &self.profile_version)
    }
}
