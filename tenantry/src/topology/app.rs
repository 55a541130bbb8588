use crate::err::TenancyErr;
use crate::quota::store::ResourceQuotaStore;
use crate::registry::{EntityRecord, Registry, RegistryTxn, TxMode};
use crate::space::{App, EntityId, EntityKind};
use itertools::Itertools;
use tracing::info;

#[derive(Clone)]
pub struct AppStore {
    registry: Registry,
}

impl AppStore {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub async fn add(&self, app: &App) -> Result<App, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Write).await?;
        let added = Self::add_in(txn.as_mut(), app).await?;
        txn.commit().await?;
        info!("added app '{}'", added.id());
        Ok(added)
    }

    pub async fn add_in(txn: &mut dyn RegistryTxn, app: &App) -> Result<App, TenancyErr> {
        let id = app.id();
        if txn.record(&id).await.map_err(TenancyErr::store)?.is_some() {
            return Err(TenancyErr::already_exists(&id));
        }
        match txn.record(&app.namespace).await.map_err(TenancyErr::store)? {
            Some(record) if record.is_namespace() => {}
            _ => return Err(TenancyErr::not_found(&app.namespace)),
        }

        txn.create_entity(&EntityRecord::from(app).without_quotas())
            .await?;
        txn.create_edge(&app.namespace, &id).await?;
        ResourceQuotaStore::set_resource_quotas_in(txn, &id, EntityKind::App, &app.quotas.to_request())
            .await?;

        Self::get_in(txn, &id).await
    }

    pub async fn get(&self, id: &EntityId) -> Result<App, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Read).await?;
        let app = Self::get_in(txn.as_mut(), id).await?;
        txn.rollback().await?;
        Ok(app)
    }

    pub async fn get_in(txn: &mut dyn RegistryTxn, id: &EntityId) -> Result<App, TenancyErr> {
        match txn.record(id).await.map_err(TenancyErr::store)? {
            Some(record) if record.is_app() => App::try_from(record).map_err(TenancyErr::store),
            _ => Err(TenancyErr::not_found(id)),
        }
    }

    /// apps attached directly to `namespace`, ordered by id
    pub async fn find_apps(&self, namespace: &EntityId) -> Result<Vec<App>, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Read).await?;
        let apps = Self::find_in(txn.as_mut(), namespace).await?;
        txn.rollback().await?;
        Ok(apps)
    }

    pub async fn find_in(
        txn: &mut dyn RegistryTxn,
        namespace: &EntityId,
    ) -> Result<Vec<App>, TenancyErr> {
        match txn.record(namespace).await.map_err(TenancyErr::store)? {
            Some(record) if record.is_namespace() => {}
            _ => return Err(TenancyErr::not_found(namespace)),
        }
        txn.children(namespace)
            .await
            .map_err(TenancyErr::store)?
            .into_iter()
            .filter(|child| child.is_app())
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .map(|record| App::try_from(record).map_err(TenancyErr::store))
            .collect()
    }

    pub async fn remove(&self, id: &EntityId) -> Result<(), TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Write).await?;
        Self::get_in(txn.as_mut(), id).await?;
        txn.delete(id).await?;
        txn.commit().await?;
        info!("removed app '{}'", id);
        Ok(())
    }
}
