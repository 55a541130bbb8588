use crate::quota::compute_utilized;
use crate::space::app::App;
use crate::space::entity::{EntityId, Labels};
use crate::space::profile::SeccompProfile;
use crate::space::quota::ResourceQuotas;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub org: String,
    pub name: String,
    pub profile_version: String,
    pub labels: Labels,
    /// the namespace's own assigned quota
    pub quotas: ResourceQuotas,
    /// resolved from live data whenever the namespace is read from a store,
    /// empty on a namespace that has not been persisted yet
    #[serde(default)]
    pub available: ResourceQuotas,
}

impl Namespace {
    pub fn new<O, N, V>(org: O, name: N, profile_version: V, labels: Labels) -> Self
    where
        O: ToString,
        N: ToString,
        V: ToString,
    {
        Self {
            org: org.to_string(),
            name: name.to_string(),
            profile_version: profile_version.to_string(),
            labels,
            quotas: ResourceQuotas::new(),
            available: ResourceQuotas::new(),
        }
    }

    pub fn with_quotas(mut self, quotas: ResourceQuotas) -> Self {
        self.quotas = quotas;
        self
    }

    pub fn with_available(mut self, available: ResourceQuotas) -> Self {
        self.available = available;
        self
    }

    pub fn id(&self) -> EntityId {
        EntityId::namespace(&self.org, &self.name)
    }

    pub fn total(&self) -> &ResourceQuotas {
        &self.quotas
    }

    pub fn utilized(&self) -> ResourceQuotas {
        compute_utilized(&self.quotas, &self.available)
    }

    pub fn seccomp_profile(&self) -> SeccompProfile {
        SeccompProfile::for_namespace(&self.id(), &self.profile_version)
    }
}

/// Read side projection of a namespace, its apps and its child namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceTreeNode {
    pub namespace: Namespace,
    #[serde(rename = "applications")]
    pub apps: Vec<App>,
    #[serde(rename = "child_namespaces")]
    pub children: Vec<NamespaceTreeNode>,
}

impl NamespaceTreeNode {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            apps: vec![],
            children: vec![],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.apps.is_empty() && self.children.is_empty()
    }

    pub fn find(&self, id: &EntityId) -> Option<&NamespaceTreeNode> {
        if self.namespace.id() == *id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// number of namespaces in this subtree including this node
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(|child| child.len()).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceTree {
    pub root: NamespaceTreeNode,
}

impl NamespaceTree {
    pub fn new(root: NamespaceTreeNode) -> Self {
        Self { root }
    }

    pub fn find(&self, id: &EntityId) -> Option<&NamespaceTreeNode> {
        self.root.find(id)
    }
}
