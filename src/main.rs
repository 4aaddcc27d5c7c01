//! Edge blocklist sync CLI.

use anyhow::Result;
use clap::Parser;
use edge_blocklist_sync::edge::cloudflare::CloudflareClient;
use edge_blocklist_sync::source::cscli::CscliSource;
use edge_blocklist_sync::{Config, Mode, Surface, Syncer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "edge-blocklist-sync")]
#[command(about = "Sync CrowdSec decisions into Cloudflare IP lists, KV values and WAF rules")]
#[command(version)]
struct Args {
    /// Path to configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write out what would be sent to Cloudflare, but make no changes
    #[arg(long)]
    dry_run: bool,

    /// Surface to sync (repeatable; defaults to every configured surface)
    #[arg(short, long, value_enum)]
    surface: Vec<Surface>,

    /// Print results as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env()?
        }
    };

    let surfaces = if args.surface.is_empty() {
        config.configured_surfaces()
    } else {
        args.surface.clone()
    };
    config.validate_for(&surfaces)?;

    // Handle --validate
    if args.validate {
        info!(surfaces = ?surfaces, "Configuration is valid");
        return Ok(());
    }

    let api = CloudflareClient::new(&config.settings)?;
    let source = CscliSource::new(config.source.clone());
    let mode = Mode::from_dry_run(args.dry_run);

    let results = Syncer::new(&config, &api, &source)
        .run(&surfaces, mode)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    info!(surfaces = results.len(), mode = ?mode, "Sync complete");
    Ok(())
}
