use anyhow::Result;
use appkit::runtime::{build, prepare_dev, RunOptions};
use appkit_bootstrap::cache::resolve_cache_dir;
use appkit_bootstrap::{AppConfig, CliArgs};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod calculator;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// The calculator's own source in this checkout. Only exists on the machine that built the binary.
const DEFAULT_SOURCE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src/calculator.rs");

/// Calculator Server - a typed appkit app behind an HTTP API
#[derive(Parser)]
#[command(name = "calculator-server")]
#[command(about = "Calculator Server - a typed appkit app behind an HTTP API")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Source file declaring the app; its requirements are read from here.
    /// The default points into the source checkout and is meant for development;
    /// deployed binaries must pass --file
    #[arg(short, long, default_value = DEFAULT_SOURCE)]
    file: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install requirements, validate the app, download weights
    Build,
    /// Serve the app (requires a previous build)
    Dev,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        verbose: cli.verbose,
    };

    // 1) defaults -> 2) YAML (if provided) -> 3) env (APPKIT__*) -> 4) CLI overrides
    let mut config = AppConfig::load_layered(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    // Log files live next to the build cache when one is configured.
    let logging_config = config.logging.clone().unwrap_or_default();
    let log_base = config
        .cache_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    appkit_bootstrap::logging::init_logging_unified(&logging_config, &log_base);

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Dev) {
        Commands::Build => build_app(config, source_file(&cli.file)?).await,
        Commands::Dev => serve_app(config, source_file(&cli.file)?).await,
        Commands::Check => check_config(config),
    }
}

fn source_file(file: &Path) -> Result<&Path> {
    if file.is_file() {
        return Ok(file);
    }
    if file == Path::new(DEFAULT_SOURCE) {
        anyhow::bail!(
            "default app source {} does not exist on this machine; pass --file <path>",
            file.display()
        );
    }
    anyhow::bail!("app source {} does not exist", file.display())
}

async fn build_app(config: AppConfig, file: &Path) -> Result<()> {
    let cache_dir = resolve_cache_dir(config.cache_dir.as_deref())?;
    println!("✓ Cache directory: {}", cache_dir.display());

    let report = build(RunOptions::new(file, config)).await?;
    if report.requirements.is_empty() {
        println!("✓ No requirements to install");
    } else {
        println!("✓ Installed requirements: {}", report.requirements.join(", "));
    }
    println!("✓ Loaded app: {}", report.app_name);
    println!("✓ Downloaded weights");
    println!("✓ Build complete!");
    Ok(())
}

async fn serve_app(config: AppConfig, file: &Path) -> Result<()> {
    tracing::info!(file = %file.display(), "Calculator Server starting");

    let server = prepare_dev(RunOptions::new(file, config)).await?;
    let addr = server.addr();
    println!("\nServing {} at http://{addr}", server.service().app_name());
    println!("OpenAPI at http://{addr}/openapi.json\n");
    println!("Endpoints: {}\n", server.endpoints().join(", "));

    server.serve().await?;
    tracing::info!("Calculator Server stopped");
    Ok(())
}

fn check_config(config: AppConfig) -> Result<()> {
    println!("Checking configuration...");
    match resolve_cache_dir(config.cache_dir.as_deref()) {
        Ok(dir) => println!("Cache directory: {}", dir.display()),
        Err(e) => println!("Warning: {e}"),
    }
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}
