use crate::handler::collab::NodeId;
use crate::space::{App, Labels, Namespace, QuotaRequest, ResourceQuotas, SyscallRule};
use serde::{Deserialize, Serialize};

/// A seccomp profile as callers submit and read it.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeccompProfileSpec {
    pub version: String,
    #[serde(default)]
    pub default_action: String,
    #[serde(default)]
    pub syscalls: Vec<SyscallRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddNamespaceReq {
    pub org_id: String,
    pub name: String,
    #[serde(default)]
    pub parent_name: Option<String>,
    pub profile: SeccompProfileSpec,
    /// `redefine`, `extend` or anything else to inherit
    #[serde(default)]
    pub seccomp_definition_strategy: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub quotas: QuotaRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNamespaceResp {
    pub namespace: Namespace,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoveNamespaceReq {
    pub org_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddAppReq {
    pub org_id: String,
    pub namespace: String,
    pub name: String,
    pub profile: SeccompProfileSpec,
    #[serde(default)]
    pub seccomp_definition_strategy: String,
    #[serde(default)]
    pub quotas: QuotaRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddAppResp {
    pub app: App,
    /// nodes the app's config was disseminated to
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoveAppReq {
    pub org_id: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GetNamespaceReq {
    pub org_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceView {
    pub name: String,
    pub labels: Labels,
    pub total: ResourceQuotas,
    pub available: ResourceQuotas,
    pub utilized: ResourceQuotas,
    /// omitted when the profile service could not be reached
    pub profile: Option<SeccompProfileSpec>,
}

impl NamespaceView {
    pub fn new(namespace: &Namespace, profile: Option<SeccompProfileSpec>) -> Self {
        Self {
            name: namespace.name.clone(),
            labels: namespace.labels.clone(),
            total: namespace.total().clone(),
            available: namespace.available.clone(),
            utilized: namespace.utilized(),
            profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppView {
    pub name: String,
    pub total: ResourceQuotas,
    pub profile: Option<SeccompProfileSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetNamespaceResp {
    pub namespace: NamespaceView,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GetNamespaceHierarchyReq {
    pub org_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetNamespaceHierarchyResp {
    pub namespace: NamespaceView,
    pub apps: Vec<AppView>,
    pub namespaces: Vec<GetNamespaceHierarchyResp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetNamespaceResourcesReq {
    pub org_id: String,
    pub name: String,
    pub quotas: QuotaRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetAppResourcesReq {
    pub org_id: String,
    pub namespace: String,
    pub name: String,
    pub quotas: QuotaRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetResourcesResp {
    pub quotas: ResourceQuotas,
}

/// Sent to every node selected to run a new app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyAppConfigCommand {
    pub org_id: String,
    pub namespace_name: String,
    pub app_name: String,
    /// the app's profile as pretty printed json
    pub seccomp_profile: String,
    pub strategy: String,
    pub quotas: QuotaRequest,
}

impl ApplyAppConfigCommand {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
