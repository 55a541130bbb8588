use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::str::FromStr;
use tenantry::ctx::RequestCtx;
use tenantry::env::{config, config_path, TenantryConfig};
use tenantry::registry;
use tenantry::shutdown::{is_shutting_down, shutdown, shutdown_token};
use tenantry::space::{EntityId, Labels, QuotaRequest};
use tenantry::tenancy::{AppSpec, NamespaceSpec};
use tenantry::{Tenancy, TenancyErr, VERSION};
use tokio::runtime::Builder;
use tracing::{error, warn, Level};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand, strum_macros::Display)]
enum Commands {
    #[command(subcommand)]
    Namespace(NamespaceCmd),
    #[command(subcommand)]
    App(AppCmd),
    /// print an org's namespace tree with quotas resolved at every node
    Hierarchy {
        #[arg(long)]
        org: String,
        #[arg(long, default_value = "default")]
        root: String,
    },
    /// drop every namespace and app
    Scorch,
    /// print the effective config
    Config,
    Version,
}

#[derive(Debug, Args)]
struct NamespaceArgs {
    #[arg(long)]
    org: String,
    #[arg(long)]
    name: String,
}

#[derive(Debug, Args)]
struct AppArgs {
    #[arg(long)]
    org: String,
    #[arg(long)]
    namespace: String,
    #[arg(long)]
    name: String,
}

#[derive(Debug, Subcommand)]
enum NamespaceCmd {
    Add {
        #[command(flatten)]
        target: NamespaceArgs,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long, default_value = "v1")]
        profile_version: String,
        /// `key=value`, repeatable
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
        /// `kind=quantity`, repeatable
        #[arg(long = "quota", value_parser = parse_quota)]
        quotas: Vec<(String, f64)>,
    },
    Get {
        #[command(flatten)]
        target: NamespaceArgs,
    },
    Remove {
        #[command(flatten)]
        target: NamespaceArgs,
    },
    Quota {
        #[command(flatten)]
        target: NamespaceArgs,
        #[arg(long = "quota", value_parser = parse_quota, required = true)]
        quotas: Vec<(String, f64)>,
    },
    Available {
        #[command(flatten)]
        target: NamespaceArgs,
    },
}

#[derive(Debug, Subcommand)]
enum AppCmd {
    Add {
        #[command(flatten)]
        target: AppArgs,
        #[arg(long, default_value = "v1")]
        profile_version: String,
        #[arg(long = "quota", value_parser = parse_quota)]
        quotas: Vec<(String, f64)>,
    },
    Get {
        #[command(flatten)]
        target: AppArgs,
    },
    Remove {
        #[command(flatten)]
        target: AppArgs,
    },
    Quota {
        #[command(flatten)]
        target: AppArgs,
        #[arg(long = "quota", value_parser = parse_quota, required = true)]
        quotas: Vec<(String, f64)>,
    },
    /// apps attached to a namespace
    List {
        #[arg(long)]
        org: String,
        #[arg(long)]
        namespace: String,
    },
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn parse_quota(s: &str) -> Result<(String, f64), String> {
    let (kind, quota) = parse_label(s)?;
    let quota = f64::from_str(quota.as_str()).map_err(|err| format!("'{}': {}", s, err))?;
    if !quota.is_finite() {
        return Err(format!("'{}': quota must be a finite number", s));
    }
    Ok((kind, quota))
}

pub fn main() -> Result<(), anyhow::Error> {
    ctrlc::set_handler(shutdown)?;

    let cli = Cli::parse();
    let config = config().map_err(|err| anyhow!("'{}': {}", config_path(), err))?;

    tracing_subscriber::fmt()
        .with_max_level(Level::from_str(config.log.level.as_str()).unwrap_or(Level::INFO))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{}", VERSION);
            Ok(())
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        command => {
            let runtime = Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(async move { run(command, config).await })
        }
    }
}

async fn run(command: Commands, config: TenantryConfig) -> Result<(), anyhow::Error> {
    let registry = registry::connect(&config.registry).await?;
    let tenancy = Tenancy::new(registry.clone());
    let mut ctx = RequestCtx::with_cancel(shutdown_token());
    if let Some(timeout) = config.request.timeout() {
        ctx = ctx.with_timeout(timeout);
    }

    let result = exec(&tenancy, &ctx, command).await;
    if let Err(err) = &result {
        match err.downcast_ref::<TenancyErr>() {
            Some(err) if err.is_retryable() && !is_shutting_down() => {
                error!("{} (the request may be retried)", err)
            }
            Some(err) if err.is_validation() => warn!("{}", err),
            _ => error!("{}", err),
        }
    }
    registry.close().await;
    result
}

async fn exec(tenancy: &Tenancy, ctx: &RequestCtx, command: Commands) -> Result<(), anyhow::Error> {
    match command {
        Commands::Namespace(NamespaceCmd::Add {
            target,
            parent,
            profile_version,
            labels,
            quotas,
        }) => {
            let spec = NamespaceSpec {
                org: target.org,
                name: target.name,
                parent,
                profile_version,
                labels: labels.into_iter().collect::<Labels>(),
                quotas: quotas.into_iter().collect::<QuotaRequest>(),
            };
            print(&tenancy.add_namespace(ctx, &spec).await?)
        }
        Commands::Namespace(NamespaceCmd::Get { target }) => {
            print(&tenancy.get_namespace(ctx, &target.org, &target.name).await?)
        }
        Commands::Namespace(NamespaceCmd::Remove { target }) => {
            tenancy
                .remove_namespace(ctx, &target.org, &target.name)
                .await?;
            Ok(())
        }
        Commands::Namespace(NamespaceCmd::Quota { target, quotas }) => {
            let quotas = quotas.into_iter().collect::<QuotaRequest>();
            print(
                &tenancy
                    .set_namespace_resources(ctx, &target.org, &target.name, &quotas)
                    .await?,
            )
        }
        Commands::Namespace(NamespaceCmd::Available { target }) => {
            let id = EntityId::namespace(&target.org, &target.name);
            print(&tenancy.available_resources(ctx, &id).await?)
        }
        Commands::App(AppCmd::Add {
            target,
            profile_version,
            quotas,
        }) => {
            let spec = AppSpec {
                org: target.org,
                namespace: target.namespace,
                name: target.name,
                profile_version,
                quotas: quotas.into_iter().collect::<QuotaRequest>(),
            };
            print(&tenancy.add_app(ctx, &spec).await?)
        }
        Commands::App(AppCmd::Get { target }) => print(
            &tenancy
                .get_app(ctx, &target.org, &target.namespace, &target.name)
                .await?,
        ),
        Commands::App(AppCmd::Remove { target }) => {
            tenancy
                .remove_app(ctx, &target.org, &target.namespace, &target.name)
                .await?;
            Ok(())
        }
        Commands::App(AppCmd::Quota { target, quotas }) => {
            let quotas = quotas.into_iter().collect::<QuotaRequest>();
            print(
                &tenancy
                    .set_app_resources(ctx, &target.org, &target.namespace, &target.name, &quotas)
                    .await?,
            )
        }
        Commands::App(AppCmd::List { org, namespace }) => {
            print(&tenancy.find_apps(ctx, &org, &namespace).await?)
        }
        Commands::Hierarchy { org, root } => print(&tenancy.get_hierarchy(ctx, &org, &root).await?),
        Commands::Scorch => {
            tenancy.registry().scorch().await?;
            Ok(())
        }
        other => Err(anyhow!("'{}' does not use the registry", other)),
    }
}

fn print<S: Serialize>(value: &S) -> Result<(), anyhow::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
