//! pilot-queue - Inspect and manage the post queue
//!
//! Unix-style tool for looking at the post lifecycle from the outside:
//! list posts by state, show due posts, show queue statistics, and apply
//! manual approval decisions.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use libpostpilot::approval::ApprovalGateway;
use libpostpilot::channel::mock::MockChannel;
use libpostpilot::channel::MessageChannel;
use libpostpilot::content::mock::{MockDirectory, MockFeed, MockGenerator};
use libpostpilot::credentials::mock::MockRefresher;
use libpostpilot::credentials::CredentialManager;
use libpostpilot::orchestrator::{ResolveOutcome, DEFAULT_PUBLISH_WORKERS};
use libpostpilot::publishers::PublisherRegistry;
use libpostpilot::types::ApprovalDecision;
use libpostpilot::{Config, Database, PostOrchestrator, PostPilotError, PostStatus, Result};

#[derive(Parser, Debug)]
#[command(name = "pilot-queue")]
#[command(version)]
#[command(about = "Inspect and manage the post queue")]
#[command(long_about = "\
pilot-queue - Inspect and manage the post queue

DESCRIPTION:
    pilot-queue is a Unix-style tool for inspecting posts as they move
    through the lifecycle, and for applying manual approval decisions when
    the normal approval channel is unavailable.

COMMANDS:
    list        List posts in a given lifecycle state
    due         List posts due for the next publish sweep
    stats       Show post counts per lifecycle state
    resolve     Approve or reject a pending post
    expire      Run the approval-expiry sweep once

USAGE EXAMPLES:
    # List scheduled posts
    pilot-queue list

    # List failed posts in JSON format
    pilot-queue list --status failed --format json

    # Approve a pending post from the command line
    pilot-queue resolve <POST_ID> approve --actor ops

    # Run the expiry sweep once
    pilot-queue expire

CONFIGURATION:
    Configuration file: ~/.config/postpilot/config.toml
    Database location: ~/.local/share/postpilot/posts.db

    Override with environment variables:
        POSTPILOT_CONFIG    - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Credential or authorization error
    3 - Invalid input (bad post ID, unknown status, etc.)

For more information, visit: https://github.com/postpilot/postpilot
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts in a given lifecycle state
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Lifecycle state to list (draft, pending_approval, scheduled, ...)
        #[arg(short, long, default_value = "scheduled")]
        status: String,

        /// Maximum number of posts to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// List posts due for the next publish sweep
    Due {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show post counts per lifecycle state
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Approve or reject a pending post
    Resolve {
        /// Post ID to resolve
        post_id: String,

        /// Decision: approve or reject
        decision: String,

        /// Who is making the decision
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Run the approval-expiry sweep once
    Expire,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    // Run the main logic and handle errors
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Arc::new(Database::new(&config.database.path).await?);

    // Execute command
    match cli.command {
        Commands::List {
            format,
            status,
            limit,
        } => {
            cmd_list(&db, &format, &status, limit).await?;
        }
        Commands::Due { format } => {
            cmd_due(&db, &format).await?;
        }
        Commands::Stats { format } => {
            cmd_stats(&db, &format).await?;
        }
        Commands::Resolve {
            post_id,
            decision,
            actor,
        } => {
            cmd_resolve(Arc::clone(&db), &post_id, &decision, &actor).await?;
        }
        Commands::Expire => {
            cmd_expire(Arc::clone(&db)).await?;
        }
    }

    Ok(())
}

/// An orchestrator over the shared store, with mock collaborators for the
/// seams this tool never exercises.
fn build_orchestrator(db: Arc<Database>) -> PostOrchestrator {
    let channel: Arc<dyn MessageChannel> = Arc::new(MockChannel::reachable());
    let gateway = Arc::new(ApprovalGateway::new(Arc::clone(&db), channel));
    let credentials = Arc::new(CredentialManager::new(
        Arc::clone(&db),
        Arc::new(MockRefresher::success(3_600)),
    ));

    PostOrchestrator::new(
        db,
        gateway,
        credentials,
        PublisherRegistry::new(),
        Arc::new(MockGenerator::success(Vec::new())),
        Arc::new(MockFeed::default()),
        Arc::new(MockDirectory::default()),
        DEFAULT_PUBLISH_WORKERS,
    )
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(PostPilotError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// List posts in a lifecycle state
async fn cmd_list(db: &Database, format: &str, status: &str, limit: usize) -> Result<()> {
    validate_format(format)?;

    let status = PostStatus::parse_str(status).ok_or_else(|| {
        PostPilotError::InvalidInput(format!("Unknown status '{}'", status))
    })?;

    let posts = db.list_posts_by_status(status, limit).await?;

    if format == "json" {
        output_posts_json(&posts);
    } else {
        output_posts_text(&posts);
    }

    Ok(())
}

/// List posts due for the next publish sweep
async fn cmd_due(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;

    let now = chrono::Utc::now().timestamp();
    let posts = db.list_due_posts(now).await?;

    if format == "json" {
        output_posts_json(&posts);
    } else {
        output_posts_text(&posts);
    }

    Ok(())
}

/// Show queue statistics
async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;

    let counts = db.count_posts_by_status().await?;

    if format == "json" {
        let json: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(status, n)| (status.clone(), serde_json::json!(n)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        if counts.is_empty() {
            println!("No posts.");
            return Ok(());
        }
        for (status, n) in counts {
            println!("{:<18} {}", status, n);
        }
    }

    Ok(())
}

/// Apply a manual approval decision
async fn cmd_resolve(db: Arc<Database>, post_id: &str, decision: &str, actor: &str) -> Result<()> {
    let decision = match decision.to_lowercase().as_str() {
        "approve" | "approved" => ApprovalDecision::Approved,
        "reject" | "rejected" => ApprovalDecision::Rejected,
        other => {
            return Err(PostPilotError::InvalidInput(format!(
                "Unknown decision '{}'. Must be 'approve' or 'reject'",
                other
            )));
        }
    };

    let orchestrator = build_orchestrator(db);
    let outcome = orchestrator.resolve_approval(post_id, decision, actor).await?;

    match outcome {
        ResolveOutcome::Approved => println!("{} approved", post_id),
        ResolveOutcome::Rejected => println!("{} rejected", post_id),
        ResolveOutcome::AlreadyResolved => println!("{} was already resolved; nothing changed", post_id),
        ResolveOutcome::NotFound => {
            return Err(PostPilotError::InvalidInput(format!(
                "Post not found: {}",
                post_id
            )));
        }
    }

    Ok(())
}

/// Run the approval-expiry sweep once
async fn cmd_expire(db: Arc<Database>) -> Result<()> {
    let orchestrator = build_orchestrator(db);
    let now = chrono::Utc::now().timestamp();
    let expired = orchestrator.expire_stale_pending_approvals(now).await?;
    println!("{} post(s) expired", expired);
    Ok(())
}

/// Output posts as JSON
fn output_posts_json(posts: &[libpostpilot::Post]) {
    let json: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "platform": p.platform.as_str(),
                "content": p.content,
                "status": p.status.as_str(),
                "approval_status": p.approval_status.as_str(),
                "scheduled_for": p.scheduled_for,
                "created_at": p.created_at,
                "retry_count": p.retry_count,
                "error_message": p.error_message,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}

/// Output posts as human-readable text
fn output_posts_text(posts: &[libpostpilot::Post]) {
    if posts.is_empty() {
        return;
    }

    let now = chrono::Utc::now().timestamp();

    for post in posts {
        let content_preview = truncate_content(&post.content, 50);
        let when = post
            .scheduled_for
            .map(|ts| format_time_until(now, ts))
            .unwrap_or_else(|| "unscheduled".to_string());

        println!(
            "{} | {} | {} | {}",
            post.id,
            post.platform.as_str(),
            content_preview,
            when
        );
    }
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let kept: String = content.chars().take(max_len).collect();
        format!("{}...", kept)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
