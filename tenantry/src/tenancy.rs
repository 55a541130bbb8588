use crate::ctx::RequestCtx;
use crate::err::TenancyErr;
use crate::quota::parse_request;
use crate::quota::store::ResourceQuotaStore;
use crate::registry::{Registry, TxMode};
use crate::space::entity::validate_segment;
use crate::space::{
    App, EntityId, EntityKind, Labels, Namespace, NamespaceTree, QuotaRequest, ResourceQuotas,
};
use crate::topology::{AppStore, NamespaceStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A namespace to be created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    pub org: String,
    pub name: String,
    /// name of the parent namespace in the same org, `None` for a root
    pub parent: Option<String>,
    pub profile_version: String,
    pub labels: Labels,
    pub quotas: QuotaRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSpec {
    pub org: String,
    pub namespace: String,
    pub name: String,
    pub profile_version: String,
    pub quotas: QuotaRequest,
}

/// The tenancy operations as exposed to callers.
///
/// Adds the boundary policies on top of the topology and quota stores:
/// names and quotas are validated before any store is touched, duplicates
/// and missing parents are reported up front, and a namespace is only
/// removed once it has neither apps nor child namespaces.  Every operation
/// runs under a [`RequestCtx`].
#[derive(Clone)]
pub struct Tenancy {
    registry: Registry,
    namespaces: NamespaceStore,
    apps: AppStore,
    quotas: ResourceQuotaStore,
}

impl Tenancy {
    pub fn new(registry: Registry) -> Self {
        Self {
            namespaces: NamespaceStore::new(registry.clone()),
            apps: AppStore::new(registry.clone()),
            quotas: ResourceQuotaStore::new(registry.clone()),
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// validate `spec` against the current state: returns the namespace that
    /// would be created along with its resolved parent.
    pub async fn check_namespace(
        &self,
        ctx: &RequestCtx,
        spec: &NamespaceSpec,
    ) -> Result<(Namespace, Option<Namespace>), TenancyErr> {
        ctx.run(async {
            validate_segment("org", &spec.org)?;
            validate_segment("namespace", &spec.name)?;
            let id = EntityId::namespace(&spec.org, &spec.name);
            let quotas = parse_quotas(&id, &spec.quotas)?;
            let namespace = Namespace::new(&spec.org, &spec.name, &spec.profile_version, spec.labels.clone())
                .with_quotas(quotas);

            Self::ensure_absent(&id, self.namespaces.get(&id).await)?;

            let parent = match &spec.parent {
                Some(parent) => {
                    validate_segment("parent namespace", parent)?;
                    Some(self.namespaces.get(&EntityId::namespace(&spec.org, parent)).await?)
                }
                None => None,
            };
            Ok((namespace, parent))
        })
        .await
    }

    pub async fn add_namespace(
        &self,
        ctx: &RequestCtx,
        spec: &NamespaceSpec,
    ) -> Result<Namespace, TenancyErr> {
        let (namespace, parent) = self.check_namespace(ctx, spec).await?;
        self.create_namespace(ctx, &namespace, parent.as_ref()).await
    }

    /// persist a namespace produced by [`Tenancy::check_namespace`].  The
    /// store repeats its existence checks within the write transaction.
    pub async fn create_namespace(
        &self,
        ctx: &RequestCtx,
        namespace: &Namespace,
        parent: Option<&Namespace>,
    ) -> Result<Namespace, TenancyErr> {
        let parent = parent.map(|parent| parent.id());
        ctx.run(self.namespaces.add(namespace, parent.as_ref()))
            .await
    }

    /// remove a namespace that has neither apps nor child namespaces.  The
    /// check and the delete share one transaction.
    pub async fn remove_namespace(
        &self,
        ctx: &RequestCtx,
        org: &str,
        name: &str,
    ) -> Result<(), TenancyErr> {
        let id = EntityId::namespace(org, name);
        ctx.run(async {
            let mut txn = self.registry.begin(TxMode::Write).await?;
            NamespaceStore::get_in(txn.as_mut(), &id).await?;
            let children = txn.children(&id).await.map_err(TenancyErr::store)?;
            if !children.is_empty() {
                let apps = children.iter().filter(|child| child.is_app()).count();
                let err = TenancyErr::NonEmptySubtree {
                    id: id.clone(),
                    namespaces: children.len() - apps,
                    apps,
                };
                warn!("{}", err);
                return Err(err);
            }
            NamespaceStore::remove_in(txn.as_mut(), &id).await?;
            txn.commit().await?;
            info!("removed namespace '{}'", id);
            Ok(())
        })
        .await
    }

    pub async fn get_namespace(
        &self,
        ctx: &RequestCtx,
        org: &str,
        name: &str,
    ) -> Result<Namespace, TenancyErr> {
        ctx.run(self.namespaces.get(&EntityId::namespace(org, name)))
            .await
    }

    pub async fn get_hierarchy(
        &self,
        ctx: &RequestCtx,
        org: &str,
        root: &str,
    ) -> Result<NamespaceTree, TenancyErr> {
        ctx.run(self.namespaces.get_hierarchy(&EntityId::namespace(org, root)))
            .await
    }

    pub async fn set_namespace_resources(
        &self,
        ctx: &RequestCtx,
        org: &str,
        name: &str,
        quotas: &QuotaRequest,
    ) -> Result<ResourceQuotas, TenancyErr> {
        validate_segment("org", org)?;
        validate_segment("namespace", name)?;
        let id = EntityId::namespace(org, name);
        parse_quotas(&id, quotas)?;
        ctx.run(self.quotas.set_resource_quotas(&id, EntityKind::Namespace, quotas))
            .await
    }

    pub async fn check_app(
        &self,
        ctx: &RequestCtx,
        spec: &AppSpec,
    ) -> Result<(App, Namespace), TenancyErr> {
        ctx.run(async {
            validate_segment("org", &spec.org)?;
            validate_segment("namespace", &spec.namespace)?;
            validate_segment("app", &spec.name)?;
            let id = EntityId::app(&spec.org, &spec.namespace, &spec.name);
            let quotas = parse_quotas(&id, &spec.quotas)?;

            let namespace = self
                .namespaces
                .get(&EntityId::namespace(&spec.org, &spec.namespace))
                .await?;
            Self::ensure_absent(&id, self.apps.get(&id).await)?;
            let app = App::new(namespace.id(), &spec.name, &spec.profile_version).with_quotas(quotas);
            Ok((app, namespace))
        })
        .await
    }

    pub async fn add_app(&self, ctx: &RequestCtx, spec: &AppSpec) -> Result<App, TenancyErr> {
        let (app, _) = self.check_app(ctx, spec).await?;
        self.create_app(ctx, &app).await
    }

    pub async fn create_app(&self, ctx: &RequestCtx, app: &App) -> Result<App, TenancyErr> {
        ctx.run(self.apps.add(app)).await
    }

    pub async fn remove_app(
        &self,
        ctx: &RequestCtx,
        org: &str,
        namespace: &str,
        name: &str,
    ) -> Result<(), TenancyErr> {
        ctx.run(self.apps.remove(&EntityId::app(org, namespace, name)))
            .await
    }

    pub async fn get_app(
        &self,
        ctx: &RequestCtx,
        org: &str,
        namespace: &str,
        name: &str,
    ) -> Result<App, TenancyErr> {
        ctx.run(self.apps.get(&EntityId::app(org, namespace, name)))
            .await
    }

    pub async fn find_apps(
        &self,
        ctx: &RequestCtx,
        org: &str,
        namespace: &str,
    ) -> Result<Vec<App>, TenancyErr> {
        ctx.run(self.apps.find_apps(&EntityId::namespace(org, namespace)))
            .await
    }

    pub async fn set_app_resources(
        &self,
        ctx: &RequestCtx,
        org: &str,
        namespace: &str,
        name: &str,
        quotas: &QuotaRequest,
    ) -> Result<ResourceQuotas, TenancyErr> {
        validate_segment("org", org)?;
        validate_segment("namespace", namespace)?;
        validate_segment("app", name)?;
        let id = EntityId::app(org, namespace, name);
        parse_quotas(&id, quotas)?;
        ctx.run(self.quotas.set_resource_quotas(&id, EntityKind::App, quotas))
            .await
    }

    pub async fn available_resources(
        &self,
        ctx: &RequestCtx,
        id: &EntityId,
    ) -> Result<ResourceQuotas, TenancyErr> {
        ctx.run(self.quotas.available_resources(id)).await
    }

    /// `NotFound` is the expected outcome, any other failure is reported
    fn ensure_absent<T>(id: &EntityId, lookup: Result<T, TenancyErr>) -> Result<(), TenancyErr> {
        match lookup {
            Ok(_) => Err(TenancyErr::already_exists(id)),
            Err(TenancyErr::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn parse_quotas(id: &EntityId, quotas: &QuotaRequest) -> Result<ResourceQuotas, TenancyErr> {
    parse_request(quotas).map_err(|rejection| {
        warn!("rejected quotas {:?} for '{}': {:?}", quotas, id, rejection);
        rejection.into_err(id)
    })
}

#[cfg(test)]
pub mod test {
    use crate::ctx::RequestCtx;
    use crate::err::TenancyErr;
    use crate::registry::mem::MemoryRegistry;
    use crate::registry::{Registry, RegistryApi, TxMode};
    use crate::space::{EntityId, QuotaRequest, ResourceKind};
    use crate::tenancy::{AppSpec, NamespaceSpec, Tenancy};
    use std::sync::Arc;
    use std::time::Duration;

    fn quotas(kind: &str, quota: f64) -> QuotaRequest {
        let mut quotas = QuotaRequest::new();
        quotas.insert(kind.to_string(), quota);
        quotas
    }

    fn namespace(name: &str, parent: Option<&str>, mem: f64) -> NamespaceSpec {
        NamespaceSpec {
            org: "acme".to_string(),
            name: name.to_string(),
            parent: parent.map(|parent| parent.to_string()),
            profile_version: "v1".to_string(),
            labels: Default::default(),
            quotas: quotas("mem", mem),
        }
    }

    fn app(namespace: &str, name: &str, mem: f64) -> AppSpec {
        AppSpec {
            org: "acme".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            profile_version: "v1".to_string(),
            quotas: quotas("mem", mem),
        }
    }

    async fn tenancy() -> Result<Tenancy, TenancyErr> {
        let registry: Registry = Arc::new(MemoryRegistry::new());
        let tenancy = Tenancy::new(registry);
        tenancy
            .add_namespace(&RequestCtx::new(), &namespace("default", None, 100.0))
            .await?;
        Ok(tenancy)
    }

    #[tokio::test]
    pub async fn test_removal_guard() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();
        tenancy
            .add_namespace(&ctx, &namespace("dev", Some("default"), 40.0))
            .await?;
        tenancy.add_app(&ctx, &app("dev", "api", 10.0)).await?;

        let result = tenancy.remove_namespace(&ctx, "acme", "default").await;
        assert!(matches!(
            result,
            Err(TenancyErr::NonEmptySubtree { namespaces: 1, apps: 0, .. })
        ));
        let result = tenancy.remove_namespace(&ctx, "acme", "dev").await;
        assert!(matches!(
            result,
            Err(TenancyErr::NonEmptySubtree { namespaces: 0, apps: 1, .. })
        ));

        tenancy.remove_app(&ctx, "acme", "dev", "api").await?;
        tenancy.remove_namespace(&ctx, "acme", "dev").await?;
        tenancy.remove_namespace(&ctx, "acme", "default").await?;
        assert!(matches!(
            tenancy.remove_namespace(&ctx, "acme", "default").await,
            Err(TenancyErr::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    pub async fn test_boundary_validation() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();

        let result = tenancy
            .add_namespace(&ctx, &namespace("default", None, 1.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::AlreadyExists(_))));

        let result = tenancy
            .add_namespace(&ctx, &namespace("dev", Some("nope"), 1.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::NotFound(_))));

        let result = tenancy
            .add_namespace(&ctx, &namespace("a/b", Some("default"), 1.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::InvalidArgument(_))));

        let result = tenancy
            .add_namespace(&ctx, &namespace("dev", Some("default"), -1.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::NegativeQuota { .. })));

        let result = tenancy
            .set_namespace_resources(&ctx, "acme", "default", &quotas("gpu", 5.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::UnsupportedResourceKind { .. })));

        let result = tenancy.add_app(&ctx, &app("missing", "api", 1.0)).await;
        assert!(matches!(result, Err(TenancyErr::NotFound(_))));

        tenancy.add_app(&ctx, &app("default", "api", 1.0)).await?;
        let result = tenancy.add_app(&ctx, &app("default", "api", 1.0)).await;
        assert!(matches!(result, Err(TenancyErr::AlreadyExists(_))));
        Ok(())
    }

    #[tokio::test]
    pub async fn test_quota_updates() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();
        tenancy
            .add_namespace(&ctx, &namespace("dev", Some("default"), 40.0))
            .await?;
        tenancy.add_app(&ctx, &app("dev", "api", 10.0)).await?;

        tenancy
            .set_app_resources(&ctx, "acme", "dev", "api", &quotas("mem", 40.0))
            .await?;
        let result = tenancy
            .set_app_resources(&ctx, "acme", "dev", "api", &quotas("mem", 41.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::ExceedsParentCapacity { .. })));

        let result = tenancy
            .set_namespace_resources(&ctx, "acme", "dev", &quotas("mem", 39.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::BelowChildUtilization { .. })));

        let dev = tenancy.get_namespace(&ctx, "acme", "dev").await?;
        assert_eq!(dev.available.get(ResourceKind::Mem), 0.0);
        assert_eq!(dev.utilized().get(ResourceKind::Mem), 40.0);
        let available = tenancy
            .available_resources(&ctx, &EntityId::namespace("acme", "default"))
            .await?;
        assert_eq!(available.get(ResourceKind::Mem), 60.0);
        Ok(())
    }

    #[tokio::test]
    pub async fn test_quota_setters_respect_entity_kind() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();
        tenancy.add_app(&ctx, &app("default", "api", 5.0)).await?;

        let result = tenancy
            .set_namespace_resources(&ctx, "acme", "default/api", &quotas("mem", 7.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::InvalidArgument(_))));

        let result = tenancy
            .set_app_resources(&ctx, "acme", "default", "", &quotas("mem", 7.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::InvalidArgument(_))));

        let result = tenancy
            .set_namespace_resources(&ctx, "acme", "missing", &quotas("mem", 7.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::NotFound(_))));

        let api = tenancy.get_app(&ctx, "acme", "default", "api").await?;
        assert_eq!(api.quotas.get(ResourceKind::Mem), 5.0);
        Ok(())
    }

    #[tokio::test]
    pub async fn test_non_finite_quotas_rejected() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();
        let result = tenancy
            .add_namespace(&ctx, &namespace("poison", Some("default"), f64::NAN))
            .await;
        assert!(matches!(result, Err(TenancyErr::NonFiniteQuota { .. })));
        assert!(matches!(
            tenancy.get_namespace(&ctx, "acme", "poison").await,
            Err(TenancyErr::NotFound(_))
        ));

        let result = tenancy
            .set_namespace_resources(&ctx, "acme", "default", &quotas("mem", f64::INFINITY))
            .await;
        assert!(matches!(result, Err(TenancyErr::NonFiniteQuota { .. })));

        let result = tenancy
            .add_namespace(&ctx, &namespace("greedy", Some("default"), 1e6))
            .await;
        assert!(matches!(result, Err(TenancyErr::ExceedsParentCapacity { .. })));
        let root = tenancy.get_namespace(&ctx, "acme", "default").await?;
        assert_eq!(root.available.get(ResourceKind::Mem), 100.0);
        Ok(())
    }

    #[tokio::test]
    pub async fn test_cancelled_request_writes_nothing() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();
        ctx.cancel.cancel();
        let result = tenancy
            .add_namespace(&ctx, &namespace("dev", Some("default"), 1.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::Cancelled)));

        let result = tenancy
            .get_namespace(&RequestCtx::new(), "acme", "dev")
            .await;
        assert!(matches!(result, Err(TenancyErr::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    pub async fn test_deadline_abandons_blocked_write() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();
        tenancy
            .add_namespace(&ctx, &namespace("dev", Some("default"), 40.0))
            .await?;

        // a concurrent writer holds the registry
        let blocker = tenancy.registry().begin(TxMode::Write).await?;
        let ctx = RequestCtx::new().with_timeout(Duration::from_millis(50));
        let result = tenancy
            .set_namespace_resources(&ctx, "acme", "dev", &quotas("mem", 50.0))
            .await;
        assert!(matches!(result, Err(TenancyErr::DeadlineExceeded)));
        blocker.rollback().await?;

        let dev = tenancy
            .get_namespace(&RequestCtx::new(), "acme", "dev")
            .await?;
        assert_eq!(dev.quotas.get(ResourceKind::Mem), 40.0);
        Ok(())
    }

    #[tokio::test]
    pub async fn test_hierarchy() -> Result<(), TenancyErr> {
        let tenancy = tenancy().await?;
        let ctx = RequestCtx::new();
        tenancy
            .add_namespace(&ctx, &namespace("dev", Some("default"), 40.0))
            .await?;
        tenancy
            .add_namespace(&ctx, &namespace("prod", Some("default"), 30.0))
            .await?;
        tenancy.add_app(&ctx, &app("default", "gateway", 5.0)).await?;

        let tree = tenancy.get_hierarchy(&ctx, "acme", "default").await?;
        assert_eq!(tree.root.children.len(), 2);
        assert_eq!(tree.root.apps.len(), 1);
        assert_eq!(tree.root.namespace.available.get(ResourceKind::Mem), 25.0);
        assert_eq!(tree.root.namespace.utilized().get(ResourceKind::Mem), 75.0);

        let apps = tenancy.find_apps(&ctx, "acme", "default").await?;
        assert_eq!(apps.len(), 1);
        let gateway = tenancy.get_app(&ctx, "acme", "default", "gateway").await?;
        assert_eq!(gateway.quotas.get(ResourceKind::Mem), 5.0);
        Ok(())
    }
}
