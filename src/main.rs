//! Stacks-Crawler main entry point
//!
//! This is the command-line interface for the Stacks-Crawler document harvester.

use anyhow::{Context, Result};
use clap::Parser;
use stacks_crawler::actuator::WebDriverFactory;
use stacks_crawler::config::{
    load_config_with_hash, resolve_credentials, validate_unit_id, Config, Credentials,
};
use stacks_crawler::crawler::{shutdown_channel, CrawlOrchestrator, ShutdownHandle};
use stacks_crawler::output::{print_run_summary, write_markdown_report};
use stacks_crawler::store::FsArtifactStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Units crawled when neither the command line nor the config names any
const DEFAULT_UNITS: &[&str] = &["2023", "2024", "2025"];

/// Stacks-Crawler: a session-driven document harvester
///
/// Logs into a library portal, reaches the target search system through the
/// proxy, and downloads every result page of a collection, one unit (e.g. a
/// publication year) at a time.
#[derive(Parser, Debug)]
#[command(name = "stacks-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A session-driven document harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Crawl a single unit
    #[arg(long, value_name = "YEAR", conflicts_with = "years")]
    year: Option<String>,

    /// Crawl several units in order
    #[arg(long, value_name = "YEAR", num_args = 1..)]
    years: Vec<String>,

    /// Override the destination root from the config
    #[arg(long, value_name = "DIR")]
    save_path: Option<PathBuf>,

    /// Portal username (overrides the credentials file)
    #[arg(long)]
    username: Option<String>,

    /// Portal password (overrides the credentials file)
    #[arg(long)]
    password: Option<String>,

    /// JSON credentials file (defaults to ./credentials.json)
    #[arg(long, value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, conflicts_with = "windowed")]
    headless: bool,

    /// Run the browser with a visible window
    #[arg(long)]
    windowed: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Write a markdown report of the run
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&cli, &mut config);
    let units = resolve_units(&cli, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &units);
        return Ok(());
    }

    let credentials = resolve_credentials(
        cli.username.clone(),
        cli.password.clone(),
        cli.credentials.as_deref(),
    )
    .context("Failed to resolve portal credentials")?;

    handle_crawl(config, config_hash, &units, &credentials, cli.summary.as_deref()).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("stacks_crawler=info,warn"),
            1 => EnvFilter::new("stacks_crawler=debug,info"),
            2 => EnvFilter::new("stacks_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(path) = &cli.save_path {
        config.crawl.destination_root = path.clone();
    }
    if cli.headless {
        config.browser.headless = Some(true);
    } else if cli.windowed {
        config.browser.headless = Some(false);
    }
}

/// Command line units win over config units, which win over the defaults
fn resolve_units(cli: &Cli, config: &Config) -> Result<Vec<String>> {
    let units: Vec<String> = if let Some(year) = &cli.year {
        vec![year.clone()]
    } else if !cli.years.is_empty() {
        cli.years.clone()
    } else if !config.crawl.units.is_empty() {
        config.crawl.units.clone()
    } else {
        DEFAULT_UNITS.iter().map(|u| u.to_string()).collect()
    };

    for unit in &units {
        validate_unit_id(unit)?;
    }
    Ok(units)
}

/// Handles the --dry-run mode: shows the resolved plan
fn handle_dry_run(config: &Config, units: &[String]) {
    println!("=== Stacks-Crawler Dry Run ===\n");

    println!("Crawl:");
    println!("  Collection: {}", config.crawl.collection);
    println!("  Start page: {}", config.crawl.start_page);
    println!("  Max page visits: {}", config.crawl.max_page_visits);
    println!("  Page size: {}", config.crawl.page_size);
    println!(
        "  Accepted extensions: {}",
        config.crawl.accepted_extensions.join(", ")
    );
    println!("  On page failure: {:?}", config.crawl.on_page_failure);

    println!("\nBrowser:");
    println!("  WebDriver: {}", config.browser.webdriver_url);
    println!(
        "  Mode: {}",
        if config.browser.is_headless() {
            "headless"
        } else {
            "windowed"
        }
    );

    println!("\nSite:");
    println!("  Login: {}", config.site.login_url);
    println!("  Direct target: {}", config.site.direct_target_url);

    println!("\nUnits ({}):", units.len());
    for unit in units {
        println!(
            "  - {} -> {}",
            unit,
            config.crawl.destination_root.join(unit).display()
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    units: &[String],
    credentials: &Credentials,
    report_path: Option<&std::path::Path>,
) -> Result<()> {
    let factory = WebDriverFactory::new(config.browser.clone())
        .context("Failed to build WebDriver client")?;

    let (handle, signal) = shutdown_channel();
    tokio::spawn(forward_shutdown(handle));

    let orchestrator = CrawlOrchestrator::new(
        config,
        Arc::new(factory),
        Arc::new(FsArtifactStore::new()),
        signal,
    );
    let units = orchestrator.plan_units(units);

    tracing::info!(
        "Crawling {} unit(s) of '{}'",
        units.len(),
        orchestrator.config().crawl.collection
    );

    let mut summary = orchestrator.run_all(&units, credentials).await;
    summary.config_hash = Some(config_hash);

    print_run_summary(&summary);

    if let Some(path) = report_path {
        write_markdown_report(&summary, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("\n✓ Report written to: {}", path.display());
    }

    if summary.failed_units() > 0 {
        anyhow::bail!("{} unit(s) failed", summary.failed_units());
    }
    Ok(())
}

/// Triggers cooperative shutdown on Ctrl+C or SIGTERM
async fn forward_shutdown(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::warn!("Shutdown requested, finishing current step");
    handle.trigger();
}
