//! The graph backed entity store.
//!
//! Namespaces and apps live in one entity space connected by directed
//! `CHILD` edges (parent -> child).  The edge relation is a single store that
//! is queried in either [`Direction`]: towards the children of an entity or
//! towards its parent.
//!
//! Every read and write happens inside a [`RegistryTxn`] obtained from
//! [`RegistryApi::begin`].  A transaction that is dropped without
//! [`RegistryTxn::commit`] is rolled back, which is what makes cancelling an
//! in-flight request safe.

use crate::env::RegistryConfig;
use crate::registry::err::RegErr;
use crate::space::{App, EntityId, EntityKind, Labels, Namespace, ResourceQuotas};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod err;
pub mod mem;
#[cfg(feature = "postgres")]
pub mod postgres;

pub type Registry = Arc<dyn RegistryApi>;

#[derive(Debug, Clone, Copy, Eq, PartialEq, strum_macros::Display)]
pub enum TxMode {
    /// a consistent snapshot, concurrent readers allowed
    Read,
    /// isolated from every other write transaction
    Write,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, strum_macros::Display)]
pub enum Direction {
    Children,
    Parent,
}

#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn begin<'a>(&'a self, mode: TxMode) -> Result<Box<dyn RegistryTxn>, RegErr>;

    /// drop every entity and edge.
    async fn scorch<'a>(&'a self) -> Result<(), RegErr>;

    async fn close<'a>(&'a self) {}
}

#[async_trait]
pub trait RegistryTxn: Send {
    fn mode(&self) -> TxMode;

    async fn create_entity<'a>(&'a mut self, record: &'a EntityRecord) -> Result<(), RegErr>;

    async fn create_edge<'a>(
        &'a mut self,
        parent: &'a EntityId,
        child: &'a EntityId,
    ) -> Result<(), RegErr>;

    async fn record<'a>(&'a mut self, id: &'a EntityId) -> Result<Option<EntityRecord>, RegErr>;

    async fn related<'a>(
        &'a mut self,
        id: &'a EntityId,
        direction: Direction,
    ) -> Result<Vec<EntityRecord>, RegErr>;

    /// write the kinds present in `quotas`, other kinds keep their value
    async fn set_quotas<'a>(
        &'a mut self,
        id: &'a EntityId,
        quotas: &'a ResourceQuotas,
    ) -> Result<(), RegErr>;

    /// detach and delete an entity.  Edges to its children are removed as
    /// well, the children themselves are not.
    async fn delete<'a>(&'a mut self, id: &'a EntityId) -> Result<(), RegErr>;

    async fn commit(self: Box<Self>) -> Result<(), RegErr>;

    async fn rollback(self: Box<Self>) -> Result<(), RegErr>;

    async fn children<'a>(&'a mut self, id: &'a EntityId) -> Result<Vec<EntityRecord>, RegErr> {
        self.related(id, Direction::Children).await
    }

    async fn parent<'a>(&'a mut self, id: &'a EntityId) -> Result<Option<EntityRecord>, RegErr> {
        let mut parents = self.related(id, Direction::Parent).await?;
        match parents.len() {
            0 | 1 => Ok(parents.pop()),
            _ => Err(RegErr::MultipleParents(id.clone())),
        }
    }
}

/// The properties persisted for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub profile_version: String,
    pub labels: Labels,
    pub quotas: ResourceQuotas,
}

impl EntityRecord {
    pub fn name(&self) -> &str {
        self.id.last_segment()
    }

    pub fn is_namespace(&self) -> bool {
        self.kind == EntityKind::Namespace
    }

    pub fn is_app(&self) -> bool {
        self.kind == EntityKind::App
    }

    /// the record as it is first created: quotas are admitted separately
    pub fn without_quotas(mut self) -> Self {
        self.quotas = ResourceQuotas::new();
        self
    }
}

impl From<&Namespace> for EntityRecord {
    fn from(namespace: &Namespace) -> Self {
        Self {
            id: namespace.id(),
            kind: EntityKind::Namespace,
            profile_version: namespace.profile_version.clone(),
            labels: namespace.labels.clone(),
            quotas: namespace.quotas.clone(),
        }
    }
}

impl From<&App> for EntityRecord {
    fn from(app: &App) -> Self {
        Self {
            id: app.id(),
            kind: EntityKind::App,
            profile_version: app.profile_version.clone(),
            labels: Labels::new(),
            quotas: app.quotas.clone(),
        }
    }
}

impl TryFrom<EntityRecord> for Namespace {
    type Error = RegErr;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        if !record.is_namespace() {
            return Err(RegErr::corrupt(&record.id, "expected a namespace"));
        }
        let org = record.id.org().to_string();
        let name = record.name().to_string();
        Ok(Namespace::new(org, name, record.profile_version, record.labels).with_quotas(record.quotas))
    }
}

impl TryFrom<EntityRecord> for App {
    type Error = RegErr;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        if !record.is_app() {
            return Err(RegErr::corrupt(&record.id, "expected an app"));
        }
        let namespace = record
            .id
            .parent_path()
            .ok_or_else(|| RegErr::corrupt(&record.id, "app id has no namespace segment"))?;
        let name = record.name().to_string();
        Ok(App::new(namespace, name, record.profile_version).with_quotas(record.quotas))
    }
}

/// create the registry described by `config`.  The connection lifecycle is
/// owned by the caller: call [`RegistryApi::close`] when shutting down.
pub async fn connect(config: &RegistryConfig) -> Result<Registry, RegErr> {
    match config {
        RegistryConfig::Memory => Ok(Arc::new(mem::MemoryRegistry::new())),
        #[cfg(feature = "postgres")]
        RegistryConfig::Postgres(info) => Ok(Arc::new(postgres::PostgresRegistry::connect(info).await?)),
    }
}

#[cfg(test)]
pub mod test {
    use crate::registry::EntityRecord;
    use crate::space::{App, EntityId, Labels, Namespace, ResourceKind, ResourceQuotas};

    #[test]
    pub fn test_record_conversions() {
        let mut labels = Labels::new();
        labels.insert("team".to_string(), "core".to_string());
        let namespace = Namespace::new("acme", "dev", "v1", labels)
            .with_quotas(ResourceQuotas::new().with(ResourceKind::Mem, 10.0));
        let record = EntityRecord::from(&namespace);
        assert_eq!(record.id, EntityId::namespace("acme", "dev"));
        let back: Namespace = record.clone().try_into().unwrap();
        assert_eq!(back, namespace);
        assert!(TryInto::<App>::try_into(record).is_err());

        let app = App::new(namespace.id(), "api", "v1");
        let record = EntityRecord::from(&app);
        assert_eq!(record.name(), "api");
        let back: App = record.try_into().unwrap();
        assert_eq!(back, app);
    }
}
