//! Namespace and app topology over the registry.
//!
//! [`NamespaceStore`] and [`AppStore`] create, read and remove entities and
//! their `CHILD` edges.  Initial quotas are admitted by
//! [`crate::quota::store::ResourceQuotaStore`] in the same transaction that
//! creates the entity, so a refused quota leaves nothing behind.
//!
//! Removal is unconditional here: refusing to remove a namespace that still
//! has children is a policy of [`crate::tenancy::Tenancy`].

pub mod app;
pub mod namespace;

pub use app::AppStore;
pub use namespace::NamespaceStore;
