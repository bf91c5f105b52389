use anyhow::{Context, Result};
use apigee_dc::config::{parse_dc_names, Overrides, ProviderConfig};
use apigee_dc::datacollector::plan::{self, ApplyOptions, Manifest};
use apigee_dc::datacollector::state;
use apigee_dc::gcp::http::format_api_error;
use apigee_dc::{ApigeeClient, DataCollectorSpec, DcError, OpContext, ResourceData, ResourceReconciler};
use clap::{Parser, Subcommand, ValueEnum};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Manage Apigee data collectors
#[derive(Parser, Debug)]
#[command(name = "apigee-dc", version, about, long_about = None)]
struct Args {
    /// Apigee organization (overrides ORG_NAME)
    #[arg(short, long)]
    org: Option<String>,

    /// Managed data collector names, comma separated (overrides DC_NAMES)
    #[arg(long)]
    dc_names: Option<String>,

    /// Service account key file or inline JSON (overrides GOOGLE_CREDENTIALS)
    #[arg(long)]
    credentials: Option<String>,

    /// API base URL (overrides APIGEE_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Give up on the whole command after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a data collector
    Create(SpecArgs),
    /// Read a data collector
    Read { name: String },
    /// Update description and type of a data collector
    Update(SpecArgs),
    /// Delete a data collector
    Delete { name: String },
    /// Import an existing data collector by "project_id/name"
    Import { id: String },
    /// List all data collectors in the organization
    List,
    /// Read every managed data collector (dc_names)
    Status,
    /// Show what apply would change
    Plan(ManifestArgs),
    /// Reconcile the organization with a manifest
    Apply(ManifestArgs),
}

#[derive(clap::Args, Debug)]
struct SpecArgs {
    #[arg(long)]
    name: String,
    #[arg(long = "type")]
    kind: String,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(clap::Args, Debug)]
struct ManifestArgs {
    /// YAML manifest listing desired collectors
    manifest: PathBuf,
    /// Delete managed collectors missing from the manifest
    #[arg(long)]
    prune: bool,
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Retries per change for transient failures
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = std::env::var("RUST_LOG").ok().map(EnvFilter::new);
    let filter = match (env_filter, level.to_tracing_level()) {
        (Some(filter), _) => filter,
        (None, Some(tracing_level)) => {
            EnvFilter::default().add_directive(LevelFilter::from_level(tracing_level).into())
        }
        (None, None) => return Ok(None),
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("apigee-dc started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("apigee-dc").join("apigee-dc.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".apigee-dc").join("apigee-dc.log");
    }
    PathBuf::from("apigee-dc.log")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:?}");
            None
        }
    };

    if let Err(err) = run(args).await {
        match err.downcast_ref::<DcError>() {
            Some(dc_err) => eprintln!("Error: {}", format_api_error(dc_err)),
            None => eprintln!("Error: {err:?}"),
        }
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let overrides = Overrides {
        org_name: args.org.clone(),
        dc_names: args.dc_names.as_deref().map(parse_dc_names),
        google_credentials: args.credentials.clone(),
        base_url: args.base_url.clone(),
        request_timeout_secs: args.request_timeout,
    };
    let config = ProviderConfig::load(&overrides)?;
    tracing::info!("Using organization: {}", config.org_name);

    let client = ApigeeClient::new(&config).await?;
    let reconciler = ResourceReconciler::new(client);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight operations");
            on_interrupt.cancel();
        }
    });

    let mut ctx = OpContext::new(cancel);
    if let Some(secs) = args.deadline {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    match args.command {
        Command::Create(spec) => {
            let mut data = ResourceData::from_spec(&spec.into_spec());
            state::create(&reconciler, &ctx, &mut data).await?;
            print_json(&data)
        }
        Command::Read { name } => print_json(&reconciler.read(&ctx, &name).await?),
        Command::Update(spec) => {
            let spec = spec.into_spec();
            let mut data = ResourceData::from_spec(&spec);
            data.id = Some(spec.name.clone());
            state::update(&reconciler, &ctx, &data).await?;
            print_json(&data)
        }
        Command::Delete { name } => {
            let mut data = ResourceData {
                id: Some(name.clone()),
                name,
                ..Default::default()
            };
            state::delete(&reconciler, &ctx, &mut data).await?;
            print_json(&data)
        }
        Command::Import { id } => print_json(&state::import(&reconciler, &ctx, &id).await?),
        Command::List => print_json(&reconciler.list(&ctx).await?),
        Command::Status => {
            if config.dc_names.is_empty() {
                anyhow::bail!("No managed data collectors. Set DC_NAMES or use --dc-names");
            }
            let results: Vec<_> = stream::iter(&config.dc_names)
                .map(|name| {
                    let (reconciler, ctx) = (&reconciler, &ctx);
                    async move { (name.clone(), reconciler.read(ctx, name).await) }
                })
                .buffer_unordered(4)
                .collect()
                .await;

            let mut status = BTreeMap::new();
            for (name, observed) in results {
                status.insert(name, observed?);
            }
            print_json(&status)
        }
        Command::Plan(m) => {
            let manifest = Manifest::load(&m.manifest)?;
            let changes =
                plan::plan_manifest(&reconciler, &ctx, &manifest, &config.dc_names, m.prune, m.concurrency)
                    .await?;
            print_json(&changes)
        }
        Command::Apply(m) => {
            let manifest = Manifest::load(&m.manifest)?;
            let changes =
                plan::plan_manifest(&reconciler, &ctx, &manifest, &config.dc_names, m.prune, m.concurrency)
                    .await?;
            let options = ApplyOptions {
                concurrency: m.concurrency,
                max_retries: m.retries,
                ..Default::default()
            };
            let report = plan::apply(&reconciler, &ctx, &changes, &options).await;
            print_json(&report)?;

            let failures = report.failures();
            if failures > 0 {
                anyhow::bail!("{} of {} changes failed", failures, report.outcomes.len());
            }
            Ok(())
        }
    }
}

impl SpecArgs {
    fn into_spec(self) -> DataCollectorSpec {
        DataCollectorSpec {
            name: self.name,
            description: self.description,
            kind: self.kind,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
