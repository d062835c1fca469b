use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use mangagrab::browser::ChromiumDriver;
use mangagrab::config::Config;
use mangagrab::models::{parse_source_url, DownloadRequest};
use mangagrab::orchestrator::{Orchestrator, OrchestratorSettings};
use mangagrab::registry::AdapterRegistry;
use mangagrab::server::{self, AppState};
use mangagrab::storage::StorageManager;

#[derive(Parser)]
#[command(name = "mangagrab")]
#[command(about = "Headless-browser manga chapter downloader")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Download a single chapter
    Download {
        /// Chapter URL to download
        url: String,
        /// Site identifier (e.g. "erosscans"); detected from the URL when omitted
        #[arg(short, long)]
        site: Option<String>,
        /// Folder name under the downloads root; derived from the URL when omitted
        #[arg(short, long)]
        title: Option<String>,
    },
    /// List supported sites
    Sites,
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let config = Config::load(&cli.config)?;
            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }

            let state = AppState::new(AdapterRegistry::new(), build_orchestrator(&config)?);
            server::run(&server_config, state).await?;
        }
        Commands::Download { url, site, title } => {
            let config = Config::load(&cli.config)?;
            let registry = AdapterRegistry::new();
            run_download(&config, &registry, &url, site.as_deref(), title.as_deref()).await?;
        }
        Commands::Sites => show_sites(&AdapterRegistry::new()),
        Commands::Init => write_default_config(Path::new(&cli.config))?,
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("mangagrab={},tower_http={}", level, level))
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();

    Ok(())
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let driver = ChromiumDriver::new(config.browser.clone())?;
    Ok(Orchestrator::new(
        Arc::new(driver),
        StorageManager::new(&config.storage),
        OrchestratorSettings::from(&config.browser),
    ))
}

async fn run_download(
    config: &Config,
    registry: &AdapterRegistry,
    url: &str,
    site: Option<&str>,
    title: Option<&str>,
) -> Result<()> {
    let source_url = parse_source_url(url)?;
    let adapter = match site {
        Some(site) => registry.lookup(site)?,
        None => registry
            .detect(&source_url)
            .with_context(|| format!("Cannot detect site for {}; pass --site", source_url))?,
    };

    info!("Downloading chapter from {}: {}", adapter.site(), source_url);
    let request = DownloadRequest::new(source_url.as_str(), adapter.site(), title)?;
    let orchestrator = build_orchestrator(config)?;

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let result = orchestrator
        .run_with_progress(&request, adapter.as_ref(), &progress)
        .await;

    if result.success {
        let folder = result
            .folder
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "✅ Downloaded {}/{} images to {}",
            result.count, result.candidates, folder
        );
        Ok(())
    } else if let Some(error) = result.error {
        bail!("Download failed: {}", error)
    } else {
        bail!("No images found on {}", request.source_url)
    }
}

fn show_sites(registry: &AdapterRegistry) {
    println!("{:<12} {:<28} {:<40}", "Site", "Identifiers", "Hosts");
    println!("{}", "-".repeat(80));

    for adapter in registry.adapters() {
        let site = adapter.site();
        let hosts = if adapter.hosts().is_empty() {
            "(any, pass --site)".to_string()
        } else {
            adapter.hosts().join(", ")
        };
        println!(
            "{:<12} {:<28} {:<40}",
            site.as_str(),
            site.identifiers().join(", "),
            hosts
        );
    }
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists, refusing to overwrite", path.display());
    }

    let rendered = Config::default().to_toml()?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}
