use crate::err::TenancyErr;
use crate::quota::compute_available;
use crate::quota::store::ResourceQuotaStore;
use crate::registry::{EntityRecord, Registry, RegistryTxn, TxMode};
use crate::space::{App, EntityId, EntityKind, Namespace, NamespaceTree, NamespaceTreeNode};
use async_recursion::async_recursion;
use itertools::Itertools;
use tracing::{debug, info};

#[derive(Clone)]
pub struct NamespaceStore {
    registry: Registry,
}

impl NamespaceStore {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// create `namespace` under `parent` (a root when `None`) and admit its
    /// quotas.  Nothing is written unless every step succeeds.
    pub async fn add(
        &self,
        namespace: &Namespace,
        parent: Option<&EntityId>,
    ) -> Result<Namespace, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Write).await?;
        let added = Self::add_in(txn.as_mut(), namespace, parent).await?;
        txn.commit().await?;
        info!(
            "added namespace '{}' under {}",
            added.id(),
            parent.map(|p| p.to_string()).unwrap_or("<root>".to_string())
        );
        Ok(added)
    }

    pub async fn add_in(
        txn: &mut dyn RegistryTxn,
        namespace: &Namespace,
        parent: Option<&EntityId>,
    ) -> Result<Namespace, TenancyErr> {
        let id = namespace.id();
        if txn.record(&id).await.map_err(TenancyErr::store)?.is_some() {
            return Err(TenancyErr::already_exists(&id));
        }

        if let Some(parent) = parent {
            let record = txn
                .record(parent)
                .await
                .map_err(TenancyErr::store)?
                .ok_or_else(|| TenancyErr::not_found(parent))?;
            if !record.is_namespace() {
                return Err(TenancyErr::invalid(format!(
                    "parent '{}' of namespace '{}' is not a namespace",
                    parent, id
                )));
            }
            if record.id.org() != namespace.org {
                return Err(TenancyErr::invalid(format!(
                    "parent '{}' belongs to another org than '{}'",
                    parent, id
                )));
            }
        }

        txn.create_entity(&EntityRecord::from(namespace).without_quotas())
            .await?;
        if let Some(parent) = parent {
            txn.create_edge(parent, &id).await?;
        }
        ResourceQuotaStore::set_resource_quotas_in(
            txn,
            &id,
            EntityKind::Namespace,
            &namespace.quotas.to_request(),
        )
        .await?;

        Self::get_in(txn, &id).await
    }

    pub async fn get(&self, id: &EntityId) -> Result<Namespace, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Read).await?;
        let namespace = Self::get_in(txn.as_mut(), id).await?;
        txn.rollback().await?;
        Ok(namespace)
    }

    /// the namespace with its available quotas resolved from its children
    pub async fn get_in(txn: &mut dyn RegistryTxn, id: &EntityId) -> Result<Namespace, TenancyErr> {
        let record = Self::record_in(txn, id).await?;
        let children = txn.children(id).await.map_err(TenancyErr::store)?;
        Self::resolve(record, &children)
    }

    pub async fn get_hierarchy(&self, root: &EntityId) -> Result<NamespaceTree, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Read).await?;
        let record = Self::record_in(txn.as_mut(), root).await?;
        let tree = NamespaceTree::new(Self::populate_tree(txn.as_mut(), record).await?);
        txn.rollback().await?;
        debug!("built hierarchy of '{}' with {} namespaces", root, tree.root.len());
        Ok(tree)
    }

    #[async_recursion]
    async fn populate_tree(
        txn: &mut dyn RegistryTxn,
        record: EntityRecord,
    ) -> Result<NamespaceTreeNode, TenancyErr> {
        let children = txn.children(&record.id).await.map_err(TenancyErr::store)?;
        let namespace = Self::resolve(record, &children)?;

        let (apps, namespaces): (Vec<EntityRecord>, Vec<EntityRecord>) = children
            .into_iter()
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .partition(|child| child.is_app());

        let mut node = NamespaceTreeNode::new(namespace);
        for app in apps {
            node.apps.push(App::try_from(app).map_err(TenancyErr::store)?);
        }
        for child in namespaces {
            node.children.push(Self::populate_tree(txn, child).await?);
        }
        Ok(node)
    }

    /// detach and delete the namespace.  Children are not checked.
    pub async fn remove(&self, id: &EntityId) -> Result<(), TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Write).await?;
        Self::remove_in(txn.as_mut(), id).await?;
        txn.commit().await?;
        info!("removed namespace '{}'", id);
        Ok(())
    }

    pub async fn remove_in(txn: &mut dyn RegistryTxn, id: &EntityId) -> Result<(), TenancyErr> {
        Self::record_in(txn, id).await?;
        txn.delete(id).await?;
        Ok(())
    }

    async fn record_in(txn: &mut dyn RegistryTxn, id: &EntityId) -> Result<EntityRecord, TenancyErr> {
        match txn.record(id).await.map_err(TenancyErr::store)? {
            Some(record) if record.is_namespace() => Ok(record),
            _ => Err(TenancyErr::not_found(id)),
        }
    }

    fn resolve(record: EntityRecord, children: &[EntityRecord]) -> Result<Namespace, TenancyErr> {
        let available = compute_available(&record.quotas, children.iter().map(|child| &child.quotas));
        let namespace = Namespace::try_from(record).map_err(TenancyErr::store)?;
        Ok(namespace.with_available(available))
    }
}
