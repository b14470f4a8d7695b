// Command-line front end for the boot environment engine
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use provisioner_bootenv::{
    publish_os_summary, AttributeSink, BootEnvController, JsonDirStore, OsSummary,
    ProvisionerConfig,
};
use provisioner_crd::{BootEnv, Machine};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::stderr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

const DEFAULT_CONFIG: &str = "/var/lib/provisioner/config.toml";

#[derive(Parser, Debug)]
#[command(author, version, about = "Boot environment rendering and lifecycle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Install root, overrides the configuration file
    #[arg(long, global = true)]
    file_root: Option<PathBuf>,

    /// Provisioner URL, overrides the configuration file
    #[arg(long, global = true)]
    provisioner_url: Option<String>,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and prepare a boot environment, re-rendering bound machines on update
    Prepare(PrepareArgs),
    /// Render a boot environment for one machine
    Render(MachineArgs),
    /// Remove one machine's rendered artifacts
    Clean(MachineArgs),
    /// Check that a boot environment can be deleted
    Retire(RetireArgs),
    /// Print the installable OSes and the preferred default
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
struct PrepareArgs {
    /// Boot environment definition (JSON)
    #[arg(long)]
    bootenv: PathBuf,

    /// Currently stored definition, when this is an update
    #[arg(long)]
    previous: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MachineArgs {
    /// Boot environment definition (JSON)
    #[arg(long)]
    bootenv: PathBuf,

    /// Machine record (JSON)
    #[arg(long)]
    machine: PathBuf,
}

#[derive(Args, Debug)]
struct RetireArgs {
    /// Boot environment definition (JSON)
    #[arg(long)]
    bootenv: PathBuf,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    /// Boot environment definitions (JSON)
    #[arg(long = "bootenv", required = true, num_args = 1..)]
    bootenvs: Vec<PathBuf>,
}

/// Writes published attributes to stdout as `name = value`
struct StdoutSink;

#[async_trait]
impl AttributeSink for StdoutSink {
    async fn set_attribute(&self, name: &str, value: Value) -> provisioner_bootenv::Result<()> {
        println!("{} = {}", name, value);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to verbose/info for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "provisioner={level},provisioner_bootenv={level},provisioner_render={level},\
         reqwest=warn,hyper=warn,rustls=warn",
        level = level
    );
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    let config = load_config(&cli).await?;
    debug!(?config, "Loaded configuration");

    let store = Arc::new(JsonDirStore::new(&config.machines_dir, &config.templates_dir));
    let controller = BootEnvController::new(config, store.clone(), store);

    match cli.command {
        Commands::Prepare(args) => {
            let bootenv: BootEnv = read_record(&args.bootenv).await?;
            let previous: Option<BootEnv> = match &args.previous {
                Some(path) => Some(read_record(path).await?),
                None => None,
            };

            let rendered = controller.on_change(&bootenv, previous.as_ref()).await?;
            println!("Prepared {}", bootenv.name);
            for artifacts in &rendered {
                println!("Rendered {} ({} files)", artifacts.machine, artifacts.files.len());
            }
        }
        Commands::Render(args) => {
            let bootenv: BootEnv = read_record(&args.bootenv).await?;
            let machine: Machine = read_record(&args.machine).await?;

            let artifacts = controller.apply_to_machine(&bootenv, &machine).await?;
            for file in &artifacts.files {
                println!("{} {}", file.name, file.path.display());
            }
        }
        Commands::Clean(args) => {
            let bootenv: BootEnv = read_record(&args.bootenv).await?;
            let machine: Machine = read_record(&args.machine).await?;

            let removed = controller.remove_from_machine(&bootenv, &machine).await?;
            println!("Removed {} files", removed);
        }
        Commands::Retire(args) => {
            let bootenv: BootEnv = read_record(&args.bootenv).await?;

            controller.guard_delete(&bootenv.name).await?;
            println!("Retired {}", bootenv.name);
        }
        Commands::Summary(args) => {
            let mut bootenvs = Vec::with_capacity(args.bootenvs.len());
            for path in &args.bootenvs {
                let bootenv: BootEnv = read_record(path).await?;
                bootenvs.push(bootenv);
            }

            let summary = OsSummary::from_bootenvs(&bootenvs);
            publish_os_summary(&StdoutSink, &summary).await?;
        }
    }

    Ok(())
}

/// Load the config file, then apply command-line overrides
///
/// An explicit `--config` must exist. The default location is optional.
async fn load_config(cli: &Cli) -> Result<ProvisionerConfig> {
    let mut config = match &cli.config {
        Some(path) => ProvisionerConfig::load(path)
            .await
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            ProvisionerConfig::load(Path::new(DEFAULT_CONFIG)).await?
        }
        None => {
            info!("No config file found, using defaults");
            ProvisionerConfig::default()
        }
    };

    if let Some(file_root) = &cli.file_root {
        config = config.with_file_root(file_root);
    }
    if let Some(url) = &cli.provisioner_url {
        config = config.with_provisioner_url(url);
    }
    Ok(config)
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).wrap_err_with(|| format!("failed to parse {}", path.display()))
}
