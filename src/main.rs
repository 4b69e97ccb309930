//! Warden - tenant-aware authorization decisions for platform APIs

use clap::{Args, Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tracing::info;

use warden_authz::locator::RequestLocator;
use warden_authz::{
    AuthorizeOptions, AuthzConfig, AuthzEngine, Constraints, Dimension, GroupResource, MatchMode,
};
use warden_common::crd::{User, UserBinding};
use warden_common::telemetry::{init_telemetry, TelemetryConfig};

/// Warden - resolve what a subject may do anywhere in the tenancy tree
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
struct Cli {
    /// Human-readable logs instead of JSON
    #[arg(long, global = true, env = "WARDEN_PRETTY_LOGS")]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the User and UserBinding CRD manifests
    Crd,

    /// Decide whether a subject may perform a request
    ///
    /// Syncs users, bindings and role families from the current
    /// kubeconfig context, locates the path, and prints allow or deny.
    Check(CheckArgs),

    /// List the actions a subject has on a resource
    Actions(ActionsArgs),
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Constraint matching policy (strict or legacy)
    #[arg(long, env = "WARDEN_MATCH_MODE", default_value = "strict")]
    match_mode: MatchMode,

    /// Product path prefixes treated as resource requests
    #[arg(long = "prefix", env = "WARDEN_API_PREFIXES", value_delimiter = ',')]
    prefixes: Vec<String>,
}

impl EngineArgs {
    fn config(&self) -> AuthzConfig {
        let config = AuthzConfig::default().with_match_mode(self.match_mode);
        if self.prefixes.is_empty() {
            config
        } else {
            config.with_api_prefixes(self.prefixes.iter().cloned())
        }
    }
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[command(flatten)]
    engine: EngineArgs,

    /// Subject name (hashed email)
    #[arg(long)]
    subject: String,

    /// HTTP method
    #[arg(long, default_value = "GET")]
    method: String,

    /// Request path, e.g. /api/apps/v1/projects/p1/pods
    #[arg(long)]
    path: String,

    /// Raw query string
    #[arg(long)]
    query: Option<String>,

    /// Resource remapping, `resource.group=resource.group`
    #[arg(long = "map", value_parser = parse_mapping)]
    mappings: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct ActionsArgs {
    #[command(flatten)]
    engine: EngineArgs,

    /// Subject name (hashed email)
    #[arg(long)]
    subject: String,

    /// API group of the resource
    #[arg(long, default_value = "")]
    group: String,

    /// Resource (plural)
    #[arg(long)]
    resource: String,

    /// Project constraint
    #[arg(long)]
    project: Option<String>,

    /// Cluster constraint
    #[arg(long)]
    cluster: Option<String>,

    /// Namespace constraint
    #[arg(long)]
    namespace: Option<String>,

    /// Resource instance name
    #[arg(long)]
    name: Option<String>,
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .ok_or_else(|| format!("expected FROM=TO, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        pretty: cli.pretty,
        ..Default::default()
    })?;

    match cli.command {
        Commands::Crd => print_crds(),
        Commands::Check(args) => run_check(args).await,
        Commands::Actions(args) => run_actions(args).await,
    }
}

fn print_crds() -> anyhow::Result<()> {
    let user = serde_yaml::to_string(&User::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize User CRD: {}", e))?;
    let binding = serde_yaml::to_string(&UserBinding::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize UserBinding CRD: {}", e))?;
    println!("{user}---\n{binding}");
    Ok(())
}

async fn start_engine(args: &EngineArgs) -> anyhow::Result<AuthzEngine> {
    let client = Client::try_default().await?;
    let engine = AuthzEngine::start(client, args.config()).await?;
    info!(match_mode = %args.match_mode, "Engine synced");
    Ok(engine)
}

async fn run_check(args: CheckArgs) -> anyhow::Result<()> {
    let engine = start_engine(&args.engine).await?;

    let locator = RequestLocator::new(engine.config().api_prefixes.iter().cloned());
    let location = locator.locate_with_query(&args.method, &args.path, args.query.as_deref());
    if !location.is_resource_request {
        engine.shutdown().await;
        anyhow::bail!("{} is not a resource request", args.path);
    }

    let options = args
        .mappings
        .into_iter()
        .fold(AuthorizeOptions::default(), |opts, (from, to)| {
            opts.map_resource(from, to)
        });
    let resource = warden_authz::authorizer::remap_resource(&location, Some(&options));
    let constraints = warden_authz::authorizer::request_constraints(&location);

    let allowed = engine
        .verify(&args.subject, &location.verb, &resource, &constraints)
        .await;
    engine.shutdown().await;

    let allowed = allowed?;
    println!(
        "{} {} {} on {} {:?}",
        if allowed { "ALLOW" } else { "DENY" },
        args.subject,
        location.verb,
        resource,
        constraints
    );
    Ok(())
}

async fn run_actions(args: ActionsArgs) -> anyhow::Result<()> {
    let engine = start_engine(&args.engine).await?;

    let constraints: Constraints = [
        (Dimension::Project, args.project),
        (Dimension::Cluster, args.cluster),
        (Dimension::Namespace, args.namespace),
        (Dimension::ResourceName, args.name),
    ]
    .into_iter()
    .filter_map(|(dim, value)| value.filter(|v| !v.is_empty()).map(|v| (dim, v)))
    .collect();
    let resource = GroupResource::new(args.group, args.resource);

    let actions = engine
        .get_actions(&args.subject, &resource, &constraints)
        .await;
    engine.shutdown().await;

    let actions = actions?;
    if actions.is_empty() {
        println!("(none)");
    } else {
        println!("{}", actions.into_vec().join("\n"));
    }
    Ok(())
}
