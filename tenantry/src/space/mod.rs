//! Value records shared by every layer: entity ids, namespaces, apps,
//! resource quotas and seccomp profile identities.
//!
//! Records are plain data.  Derived quantities (available/utilized) are
//! computed by the free functions in [`crate::quota`] and attached to a
//! record when it is read, never mutated in place afterwards.

pub mod app;
pub mod entity;
pub mod namespace;
pub mod profile;
pub mod quota;

pub use app::App;
pub use entity::{EntityId, EntityKind, Labels};
pub use namespace::{Namespace, NamespaceTree, NamespaceTreeNode};
pub use profile::{ProfileDefinition, ProfileStrategy, SeccompProfile, SyscallRule};
pub use quota::{QuotaRequest, ResourceKind, ResourceQuotas};
