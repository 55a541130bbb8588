//! Request handling on top of [`Tenancy`].
//!
//! Besides the tenancy operations the handler delegates seccomp profiles to
//! the profile service, tells the authorization service about namespace
//! inheritance and pushes a new app's config to a random share of the org's
//! nodes.

use crate::ctx::RequestCtx;
use crate::env::DisseminationConfig;
use crate::err::TenancyErr;
use crate::handler::api::{
    AddAppReq, AddAppResp, AddNamespaceReq, AddNamespaceResp, AppView, ApplyAppConfigCommand,
    GetNamespaceHierarchyReq, GetNamespaceHierarchyResp, GetNamespaceReq, GetNamespaceResp,
    NamespaceView, RemoveAppReq, RemoveNamespaceReq, SeccompProfileSpec, SetAppResourcesReq,
    SetNamespaceResourcesReq, SetResourcesResp,
};
use crate::handler::collab::{
    select_random_nodes, Administrator, AuthResource, Disseminator, NodeDirectory, ProfileService,
};
use crate::space::{NamespaceTreeNode, ProfileDefinition, ProfileStrategy, SeccompProfile};
use crate::tenancy::{AppSpec, NamespaceSpec, Tenancy};
use async_recursion::async_recursion;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod api;
pub mod collab;

#[derive(Clone)]
pub struct TenancyHandler {
    tenancy: Tenancy,
    profiles: Arc<dyn ProfileService>,
    administrator: Arc<dyn Administrator>,
    nodes: Arc<dyn NodeDirectory>,
    disseminator: Arc<dyn Disseminator>,
    config: DisseminationConfig,
}

impl TenancyHandler {
    pub fn new(
        tenancy: Tenancy,
        profiles: Arc<dyn ProfileService>,
        administrator: Arc<dyn Administrator>,
        nodes: Arc<dyn NodeDirectory>,
        disseminator: Arc<dyn Disseminator>,
        config: DisseminationConfig,
    ) -> Self {
        Self {
            tenancy,
            profiles,
            administrator,
            nodes,
            disseminator,
            config,
        }
    }

    pub async fn add_namespace(
        &self,
        ctx: &RequestCtx,
        req: &AddNamespaceReq,
    ) -> Result<AddNamespaceResp, TenancyErr> {
        let spec = NamespaceSpec {
            org: req.org_id.clone(),
            name: req.name.clone(),
            parent: req.parent_name.clone(),
            profile_version: req.profile.version.clone(),
            labels: req.labels.clone(),
            quotas: req.quotas.clone(),
        };
        let (namespace, parent) = self.tenancy.check_namespace(ctx, &spec).await?;

        let parent_profile = parent.as_ref().map(|parent| parent.seccomp_profile());
        ctx.run(self.send_profile(
            ProfileStrategy::parse(&req.seccomp_definition_strategy),
            &namespace.seccomp_profile(),
            &req.profile,
            parent_profile.as_ref(),
        ))
        .await?;

        let namespace = self
            .tenancy
            .create_namespace(ctx, &namespace, parent.as_ref())
            .await?;

        let from = match &parent {
            Some(parent) => AuthResource::namespace(parent.id()),
            None => AuthResource::org(&req.org_id),
        };
        let to = AuthResource::namespace(namespace.id());
        if let Err(err) = ctx
            .run(async {
                self.administrator
                    .create_inheritance(&from, &to)
                    .await
                    .map_err(|err| TenancyErr::collaborator("administrator", err))
            })
            .await
        {
            warn!("inheritance of '{}' from '{}' not recorded: {}", to.id, from.id, err);
        }

        Ok(AddNamespaceResp { namespace })
    }

    pub async fn remove_namespace(
        &self,
        ctx: &RequestCtx,
        req: &RemoveNamespaceReq,
    ) -> Result<(), TenancyErr> {
        self.tenancy
            .remove_namespace(ctx, &req.org_id, &req.name)
            .await
    }

    pub async fn add_app(&self, ctx: &RequestCtx, req: &AddAppReq) -> Result<AddAppResp, TenancyErr> {
        let spec = AppSpec {
            org: req.org_id.clone(),
            namespace: req.namespace.clone(),
            name: req.name.clone(),
            profile_version: req.profile.version.clone(),
            quotas: req.quotas.clone(),
        };
        let (app, namespace) = self.tenancy.check_app(ctx, &spec).await?;

        let profile = app.seccomp_profile();
        ctx.run(self.send_profile(
            ProfileStrategy::parse(&req.seccomp_definition_strategy),
            &profile,
            &req.profile,
            Some(&namespace.seccomp_profile()),
        ))
        .await?;

        let app = self.tenancy.create_app(ctx, &app).await?;

        let nodes = ctx
            .run(async {
                self.nodes
                    .org_nodes(&req.org_id)
                    .await
                    .map_err(|err| TenancyErr::collaborator("node directory", err))
            })
            .await?;
        let nodes = select_random_nodes(nodes, self.config.percentage);
        debug!("disseminating '{}' to {} nodes", app.id(), nodes.len());

        let seccomp_profile = serde_json::to_string_pretty(&self.profile_view(&profile).await)
            .map_err(TenancyErr::invalid)?;
        let command = ApplyAppConfigCommand {
            org_id: req.org_id.clone(),
            namespace_name: req.namespace.clone(),
            app_name: req.name.clone(),
            seccomp_profile,
            strategy: req.seccomp_definition_strategy.clone(),
            quotas: req.quotas.clone(),
        };
        let config = command.to_bytes().map_err(TenancyErr::invalid)?;

        for node in nodes.iter() {
            ctx.run(async {
                self.disseminator
                    .disseminate(node, &config)
                    .await
                    .map_err(|err| TenancyErr::collaborator("dissemination", err))
            })
            .await?;
        }
        info!("app '{}' disseminated to {:?}", app.id(), nodes);

        Ok(AddAppResp { app, nodes })
    }

    pub async fn remove_app(&self, ctx: &RequestCtx, req: &RemoveAppReq) -> Result<(), TenancyErr> {
        self.tenancy
            .remove_app(ctx, &req.org_id, &req.namespace, &req.name)
            .await
    }

    pub async fn get_namespace(
        &self,
        ctx: &RequestCtx,
        req: &GetNamespaceReq,
    ) -> Result<GetNamespaceResp, TenancyErr> {
        let namespace = self
            .tenancy
            .get_namespace(ctx, &req.org_id, &req.name)
            .await?;
        let profile = self.profile_view(&namespace.seccomp_profile()).await;
        Ok(GetNamespaceResp {
            namespace: NamespaceView::new(&namespace, profile),
        })
    }

    /// the org's hierarchy from its root namespace down
    pub async fn get_namespace_hierarchy(
        &self,
        ctx: &RequestCtx,
        req: &GetNamespaceHierarchyReq,
    ) -> Result<GetNamespaceHierarchyResp, TenancyErr> {
        let tree = self
            .tenancy
            .get_hierarchy(ctx, &req.org_id, &self.config.root_namespace)
            .await?;
        Ok(self.map_tree_node(&tree.root).await)
    }

    pub async fn set_namespace_resources(
        &self,
        ctx: &RequestCtx,
        req: &SetNamespaceResourcesReq,
    ) -> Result<SetResourcesResp, TenancyErr> {
        let quotas = self
            .tenancy
            .set_namespace_resources(ctx, &req.org_id, &req.name, &req.quotas)
            .await?;
        Ok(SetResourcesResp { quotas })
    }

    pub async fn set_app_resources(
        &self,
        ctx: &RequestCtx,
        req: &SetAppResourcesReq,
    ) -> Result<SetResourcesResp, TenancyErr> {
        let quotas = self
            .tenancy
            .set_app_resources(ctx, &req.org_id, &req.namespace, &req.name, &req.quotas)
            .await?;
        Ok(SetResourcesResp { quotas })
    }

    #[async_recursion]
    async fn map_tree_node(&self, node: &NamespaceTreeNode) -> GetNamespaceHierarchyResp {
        let profile = self.profile_view(&node.namespace.seccomp_profile()).await;
        let mut apps = vec![];
        for app in node.apps.iter() {
            apps.push(AppView {
                name: app.name.clone(),
                total: app.quotas.clone(),
                profile: self.profile_view(&app.seccomp_profile()).await,
            });
        }
        let mut namespaces = vec![];
        for child in node.children.iter() {
            namespaces.push(self.map_tree_node(child).await);
        }
        GetNamespaceHierarchyResp {
            namespace: NamespaceView::new(&node.namespace, profile),
            apps,
            namespaces,
        }
    }

    async fn send_profile(
        &self,
        strategy: ProfileStrategy,
        profile: &SeccompProfile,
        spec: &SeccompProfileSpec,
        parent: Option<&SeccompProfile>,
    ) -> Result<(), TenancyErr> {
        let result = match strategy {
            ProfileStrategy::Redefine => {
                let definition = ProfileDefinition {
                    default_action: spec.default_action.clone(),
                    architectures: vec![profile.architecture.clone()],
                    syscalls: spec.syscalls.clone(),
                };
                self.profiles.define(profile, &definition).await
            }
            ProfileStrategy::Extend => {
                let parent = parent.ok_or_else(no_parent_profile)?;
                self.profiles.extend(parent, profile, &spec.syscalls).await
            }
            ProfileStrategy::Inherit => {
                let parent = parent.ok_or_else(no_parent_profile)?;
                match self.profiles.get(parent).await {
                    Ok(definition) => self.profiles.define(profile, &definition).await,
                    Err(err) => Err(err),
                }
            }
        };
        result.map_err(|err| TenancyErr::collaborator("profile", err))
    }

    /// lookup failures are logged and leave the profile out
    async fn profile_view(&self, profile: &SeccompProfile) -> Option<SeccompProfileSpec> {
        match self.profiles.get(profile).await {
            Ok(definition) => Some(SeccompProfileSpec {
                version: profile.version.clone(),
                default_action: definition.default_action,
                syscalls: definition.syscalls,
            }),
            Err(err) => {
                warn!("profile '{}' unavailable: {}", profile.name, err);
                None
            }
        }
    }
}

fn no_parent_profile() -> TenancyErr {
    TenancyErr::invalid("cannot inherit or extend seccomp profiles: there is no parent")
}

#[cfg(test)]
pub mod test {
    use crate::ctx::RequestCtx;
    use crate::env::DisseminationConfig;
    use crate::err::TenancyErr;
    use crate::handler::api::{
        AddAppReq, AddNamespaceReq, ApplyAppConfigCommand, GetNamespaceHierarchyReq,
        GetNamespaceReq, RemoveNamespaceReq, SeccompProfileSpec, SetAppResourcesReq,
    };
    use crate::handler::collab::{
        Administrator, AuthResource, CollabErr, Disseminator, MemoryProfiles, NodeDirectory,
        NodeId, ProfileService,
    };
    use crate::handler::TenancyHandler;
    use crate::registry::mem::MemoryRegistry;
    use crate::space::{EntityId, QuotaRequest, ResourceKind, SeccompProfile, SyscallRule};
    use crate::tenancy::Tenancy;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Admin {
        fail: bool,
        relations: Mutex<Vec<(AuthResource, AuthResource)>>,
    }

    #[async_trait]
    impl Administrator for Admin {
        async fn create_inheritance<'a>(
            &'a self,
            from: &'a AuthResource,
            to: &'a AuthResource,
        ) -> Result<(), CollabErr> {
            if self.fail {
                return Err(CollabErr::Unavailable("administrator".to_string()));
            }
            self.relations.lock().unwrap().push((from.clone(), to.clone()));
            Ok(())
        }
    }

    struct Nodes(Vec<NodeId>);

    #[async_trait]
    impl NodeDirectory for Nodes {
        async fn org_nodes<'a>(&'a self, _org: &'a str) -> Result<Vec<NodeId>, CollabErr> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Gossip {
        fail: bool,
        sent: Mutex<Vec<(NodeId, Vec<u8>)>>,
    }

    #[async_trait]
    impl Disseminator for Gossip {
        async fn disseminate<'a>(&'a self, node: &'a NodeId, config: &'a [u8]) -> Result<(), CollabErr> {
            if self.fail {
                return Err(CollabErr::msg("queue full"));
            }
            self.sent.lock().unwrap().push((node.clone(), config.to_vec()));
            Ok(())
        }
    }

    struct Fixture {
        handler: TenancyHandler,
        profiles: MemoryProfiles,
        admin: Arc<Admin>,
        gossip: Arc<Gossip>,
    }

    fn fixture(admin: Admin, gossip: Gossip) -> Fixture {
        let tenancy = Tenancy::new(Arc::new(MemoryRegistry::new()));
        let profiles = MemoryProfiles::new();
        let admin = Arc::new(admin);
        let gossip = Arc::new(gossip);
        let nodes = Nodes(vec!["n1".to_string(), "n2".to_string(), "n3".to_string()]);
        let handler = TenancyHandler::new(
            tenancy,
            Arc::new(profiles.clone()),
            admin.clone(),
            Arc::new(nodes),
            gossip.clone(),
            DisseminationConfig::default(),
        );
        Fixture {
            handler,
            profiles,
            admin,
            gossip,
        }
    }

    fn quotas(mem: f64) -> QuotaRequest {
        let mut quotas = QuotaRequest::new();
        quotas.insert("mem".to_string(), mem);
        quotas
    }

    fn profile() -> SeccompProfileSpec {
        SeccompProfileSpec {
            version: "v1".to_string(),
            default_action: "SCMP_ACT_ERRNO".to_string(),
            syscalls: vec![SyscallRule {
                names: vec!["read".to_string()],
                action: "SCMP_ACT_ALLOW".to_string(),
            }],
        }
    }

    fn namespace(name: &str, parent: Option<&str>, strategy: &str) -> AddNamespaceReq {
        AddNamespaceReq {
            org_id: "acme".to_string(),
            name: name.to_string(),
            parent_name: parent.map(|parent| parent.to_string()),
            profile: profile(),
            seccomp_definition_strategy: strategy.to_string(),
            labels: Default::default(),
            quotas: quotas(100.0),
        }
    }

    fn app(name: &str, mem: f64) -> AddAppReq {
        AddAppReq {
            org_id: "acme".to_string(),
            namespace: "default".to_string(),
            name: name.to_string(),
            profile: profile(),
            seccomp_definition_strategy: String::new(),
            quotas: quotas(mem),
        }
    }

    #[tokio::test]
    pub async fn test_namespace_profiles_and_inheritance() -> Result<(), TenancyErr> {
        let fixture = fixture(Admin::default(), Gossip::default());
        let ctx = RequestCtx::new();
        fixture
            .handler
            .add_namespace(&ctx, &namespace("default", None, "redefine"))
            .await?;
        let mut dev = namespace("dev", Some("default"), "extend");
        dev.quotas = quotas(10.0);
        dev.profile.syscalls[0].names = vec!["write".to_string()];
        fixture.handler.add_namespace(&ctx, &dev).await?;
        let mut qa = namespace("qa", Some("default"), "");
        qa.quotas = quotas(10.0);
        fixture.handler.add_namespace(&ctx, &qa).await?;

        let root = SeccompProfile::for_namespace(&EntityId::namespace("acme", "default"), "v1");
        let dev = SeccompProfile::for_namespace(&EntityId::namespace("acme", "dev"), "v1");
        let qa = SeccompProfile::for_namespace(&EntityId::namespace("acme", "qa"), "v1");
        assert_eq!(fixture.profiles.get(&root).await.unwrap().syscalls.len(), 1);
        assert_eq!(fixture.profiles.get(&dev).await.unwrap().syscalls.len(), 2);
        assert_eq!(
            fixture.profiles.get(&qa).await.unwrap(),
            fixture.profiles.get(&root).await.unwrap()
        );

        let relations = fixture.admin.relations.lock().unwrap().clone();
        assert_eq!(relations.len(), 3);
        assert_eq!(relations[0].0, AuthResource::org("acme"));
        assert_eq!(relations[1].0, AuthResource::namespace("acme/default"));
        assert_eq!(relations[1].1, AuthResource::namespace("acme/dev"));
        Ok(())
    }

    #[tokio::test]
    pub async fn test_profile_strategy_needs_parent() -> Result<(), TenancyErr> {
        let fixture = fixture(Admin::default(), Gossip::default());
        let ctx = RequestCtx::new();
        for strategy in ["extend", "inherit"] {
            let result = fixture
                .handler
                .add_namespace(&ctx, &namespace("default", None, strategy))
                .await;
            assert!(matches!(result, Err(TenancyErr::InvalidArgument(_))));
        }
        let result = fixture
            .handler
            .get_namespace(
                &ctx,
                &GetNamespaceReq {
                    org_id: "acme".to_string(),
                    name: "default".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(TenancyErr::NotFound(_))));
        assert!(fixture.profiles.is_empty());
        Ok(())
    }

    #[tokio::test]
    pub async fn test_administrator_failure_is_ignored() -> Result<(), TenancyErr> {
        let admin = Admin {
            fail: true,
            ..Default::default()
        };
        let fixture = fixture(admin, Gossip::default());
        let resp = fixture
            .handler
            .add_namespace(&RequestCtx::new(), &namespace("default", None, "redefine"))
            .await?;
        assert_eq!(resp.namespace.quotas.get(ResourceKind::Mem), 100.0);
        Ok(())
    }

    #[tokio::test]
    pub async fn test_add_app_disseminates() -> Result<(), TenancyErr> {
        let fixture = fixture(Admin::default(), Gossip::default());
        let ctx = RequestCtx::new();
        fixture
            .handler
            .add_namespace(&ctx, &namespace("default", None, "redefine"))
            .await?;
        let resp = fixture.handler.add_app(&ctx, &app("api", 20.0)).await?;
        assert_eq!(resp.nodes.len(), 2);

        let sent = fixture.gossip.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        let command = ApplyAppConfigCommand::from_bytes(&sent[0].1).unwrap();
        assert_eq!(command.app_name, "api");
        assert_eq!(command.namespace_name, "default");
        assert_eq!(command.quotas.get("mem"), Some(&20.0));
        assert!(command.seccomp_profile.contains("SCMP_ACT_ERRNO"));

        let resp = fixture
            .handler
            .set_app_resources(
                &ctx,
                &SetAppResourcesReq {
                    org_id: "acme".to_string(),
                    namespace: "default".to_string(),
                    name: "api".to_string(),
                    quotas: quotas(100.0),
                },
            )
            .await?;
        assert_eq!(resp.quotas.get(ResourceKind::Mem), 100.0);

        let result = fixture
            .handler
            .remove_namespace(
                &ctx,
                &RemoveNamespaceReq {
                    org_id: "acme".to_string(),
                    name: "default".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(TenancyErr::NonEmptySubtree { apps: 1, .. })));
        Ok(())
    }

    #[tokio::test]
    pub async fn test_dissemination_failure_is_returned() -> Result<(), TenancyErr> {
        let gossip = Gossip {
            fail: true,
            ..Default::default()
        };
        let fixture = fixture(Admin::default(), gossip);
        let ctx = RequestCtx::new();
        fixture
            .handler
            .add_namespace(&ctx, &namespace("default", None, "redefine"))
            .await?;
        let result = fixture.handler.add_app(&ctx, &app("api", 20.0)).await;
        assert!(matches!(
            result,
            Err(TenancyErr::Collaborator {
                service: "dissemination",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    pub async fn test_hierarchy_view() -> Result<(), TenancyErr> {
        let fixture = fixture(Admin::default(), Gossip::default());
        let ctx = RequestCtx::new();
        fixture
            .handler
            .add_namespace(&ctx, &namespace("default", None, "redefine"))
            .await?;
        let mut dev = namespace("dev", Some("default"), "inherit");
        dev.quotas = quotas(40.0);
        fixture.handler.add_namespace(&ctx, &dev).await?;
        fixture.handler.add_app(&ctx, &app("api", 10.0)).await?;

        let resp = fixture
            .handler
            .get_namespace_hierarchy(
                &ctx,
                &GetNamespaceHierarchyReq {
                    org_id: "acme".to_string(),
                },
            )
            .await?;
        assert_eq!(resp.namespace.name, "default");
        assert_eq!(resp.namespace.available.get(ResourceKind::Mem), 50.0);
        assert_eq!(resp.namespace.utilized.get(ResourceKind::Mem), 50.0);
        assert!(resp.namespace.profile.is_some());
        assert_eq!(resp.apps.len(), 1);
        assert_eq!(resp.namespaces.len(), 1);
        assert_eq!(resp.namespaces[0].namespace.name, "dev");
        Ok(())
    }
}
