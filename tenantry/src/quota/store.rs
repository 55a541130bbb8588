use crate::err::TenancyErr;
use crate::quota::{compute_available, compute_utilized, validate_admission};
use crate::registry::{Registry, RegistryTxn, TxMode};
use crate::space::{EntityId, EntityKind, QuotaRequest, ResourceQuotas};
use tracing::{debug, info, warn};

/// Admits quota changes against live registry data.
#[derive(Clone)]
pub struct ResourceQuotaStore {
    registry: Registry,
}

impl ResourceQuotaStore {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// admit and persist `requested` for the `kind` entity `id` within a write
    /// transaction of its own.  Returns the quotas that were written.
    pub async fn set_resource_quotas(
        &self,
        id: &EntityId,
        kind: EntityKind,
        requested: &QuotaRequest,
    ) -> Result<ResourceQuotas, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Write).await?;
        let admitted = Self::set_resource_quotas_in(txn.as_mut(), id, kind, requested).await?;
        txn.commit().await?;
        info!("set quotas of '{}' to {:?}", id, admitted);
        Ok(admitted)
    }

    /// the same as [`ResourceQuotaStore::set_resource_quotas`] inside a
    /// transaction owned by the caller, which remains responsible for the
    /// commit.  An entity of another kind than `kind` is `NotFound`.
    pub async fn set_resource_quotas_in(
        txn: &mut dyn RegistryTxn,
        id: &EntityId,
        kind: EntityKind,
        requested: &QuotaRequest,
    ) -> Result<ResourceQuotas, TenancyErr> {
        let record = match txn.record(id).await.map_err(TenancyErr::store)? {
            Some(record) if record.kind == kind => record,
            _ => return Err(TenancyErr::not_found(id)),
        };

        // a failed lookup is not the same as having no parent
        let parent = txn.parent(id).await.map_err(TenancyErr::store)?;
        let parent_available = match parent {
            Some(parent) => {
                let siblings = txn.children(&parent.id).await.map_err(TenancyErr::store)?;
                Some(compute_available(
                    &parent.quotas,
                    siblings.iter().map(|sibling| &sibling.quotas),
                ))
            }
            None => None,
        };

        let children = txn.children(id).await.map_err(TenancyErr::store)?;
        let available = compute_available(&record.quotas, children.iter().map(|child| &child.quotas));
        let utilized = compute_utilized(&record.quotas, &available);

        let admitted = validate_admission(
            requested,
            parent_available.as_ref(),
            &record.quotas,
            &utilized,
        )
        .map_err(|rejection| {
            warn!("rejected quotas {:?} for '{}': {:?}", requested, id, rejection);
            rejection.into_err(id)
        })?;
        debug!("admitted quotas {:?} for '{}'", admitted, id);

        txn.set_quotas(id, &admitted)
            .await
            .map_err(TenancyErr::store)?;
        Ok(admitted)
    }

    pub async fn available_resources(&self, id: &EntityId) -> Result<ResourceQuotas, TenancyErr> {
        let mut txn = self.registry.begin(TxMode::Read).await?;
        let available = Self::available_in(txn.as_mut(), id).await?;
        txn.rollback().await?;
        Ok(available)
    }

    pub async fn available_in(
        txn: &mut dyn RegistryTxn,
        id: &EntityId,
    ) -> Result<ResourceQuotas, TenancyErr> {
        let record = txn
            .record(id)
            .await
            .map_err(TenancyErr::store)?
            .ok_or_else(|| TenancyErr::not_found(id))?;
        let children = txn.children(id).await.map_err(TenancyErr::store)?;
        Ok(compute_available(
            &record.quotas,
            children.iter().map(|child| &child.quotas),
        ))
    }
}
