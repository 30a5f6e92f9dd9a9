//! pilot-daemon - Background daemon for the post pipeline
//!
//! Runs the periodic trigger loops (content fetch, post generation, publish
//! sweep, approval-expiry sweep) over a dependency-injected orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use libpostpilot::approval::ApprovalGateway;
use libpostpilot::channel::mock::MockChannel;
use libpostpilot::channel::MessageChannel;
use libpostpilot::content::mock::{MockDirectory, MockFeed, MockGenerator};
use libpostpilot::credentials::mock::MockRefresher;
use libpostpilot::credentials::CredentialManager;
use libpostpilot::publishers::create_publishers;
use libpostpilot::triggers::{TriggerIntervals, TriggerSet};
use libpostpilot::{Config, Database, PostOrchestrator, Result};

#[derive(Parser, Debug)]
#[command(name = "pilot-daemon")]
#[command(version)]
#[command(about = "Background daemon for the post pipeline")]
#[command(long_about = "\
pilot-daemon - Background daemon for the post pipeline

DESCRIPTION:
    pilot-daemon runs the periodic triggers that drive posts through their
    lifecycle: fetching content, generating posts, publishing approved posts
    at their scheduled slots, and expiring stale approval requests.

    Each trigger fires on its own cadence and calls exactly one batch
    operation. Overlapping firings are safe: every state transition is a
    conditional update, so concurrent sweeps cannot double-publish a post.

    The collaborator seams (content feed, text generator, approval channel,
    token refresher, platform adapters) default to the in-process mock
    implementations. Embed libpostpilot to wire real ones.

USAGE:
    # Run in foreground (logs to stderr)
    pilot-daemon

    # Run every sweep once and exit
    pilot-daemon --once

    # Enable verbose logging
    pilot-daemon --verbose

SIGNALS:
    SIGINT - Graceful shutdown

CONFIGURATION:
    Configuration file: ~/.config/postpilot/config.toml
    Database location: ~/.local/share/postpilot/posts.db

    [triggers]
    fetch = \"4h\"      # content fetch cadence
    generate = \"6h\"   # generation cadence
    publish = \"1h\"    # publish sweep cadence
    expire = \"1h\"     # approval-expiry sweep cadence

    Override the config path with the POSTPILOT_CONFIG environment variable.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Credential or authorization error
    3 - Invalid input

For more information, visit: https://github.com/postpilot/postpilot
")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run every sweep once and exit (for testing)
    #[arg(long)]
    #[arg(help = "Run each trigger's batch operation once and exit")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let db = Arc::new(Database::new(&config.database.path).await?);

    // Mock collaborators stand in for the external services; swap these for
    // real implementations when embedding the library.
    let channel: Arc<dyn MessageChannel> = Arc::new(MockChannel::reachable());
    let gateway = Arc::new(ApprovalGateway::new(Arc::clone(&db), channel));
    let credentials = Arc::new(CredentialManager::new(
        Arc::clone(&db),
        Arc::new(MockRefresher::success(3_600)),
    ));
    let publishers = create_publishers(&config)?;
    let feed = Arc::new(MockFeed::default());

    let orchestrator = Arc::new(PostOrchestrator::new(
        Arc::clone(&db),
        gateway,
        credentials,
        publishers,
        Arc::new(MockGenerator::success(Vec::new())),
        feed.clone(),
        Arc::new(MockDirectory::default()),
        config.publish.workers,
    ));

    let intervals = TriggerIntervals::from_config(&config.triggers)?;
    let triggers = TriggerSet::new(orchestrator, feed, intervals);

    info!("pilot-daemon starting");

    if cli.once {
        triggers.run_once().await?;
        info!("pilot-daemon: ran all sweeps once, exiting");
        return Ok(());
    }

    let handles = triggers.spawn();

    // Park until interrupted; the trigger loops do the work.
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");

    for handle in handles {
        handle.abort();
    }

    info!("pilot-daemon stopped");
    Ok(())
}
