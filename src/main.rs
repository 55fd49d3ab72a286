//! Statline main entry point
//!
//! Command-line interface for the Statline crawl control plane.

use clap::Parser;
use statline::config::load_config_with_hash;
use statline::crawler::{HrefScanParser, Orchestrator};
use statline::queue::{QueueStore, SqliteQueue, TargetStatus};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Statline: a resilient crawler for sports statistics
///
/// Statline crawls a rate-limit-hostile statistics source through a staged
/// pipeline, adapting its request cadence and network identity as the
/// source pushes back, and persisting every unit of work so interrupted
/// runs resume exactly where they stopped.
#[derive(Parser, Debug)]
#[command(name = "statline")]
#[command(version = "1.0.0")]
#[command(about = "A resilient sports statistics crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding the existing queue database
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "reset_errors", "unblock_identities"])]
    dry_run: bool,

    /// Show queue statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "reset_errors", "unblock_identities"])]
    stats: bool,

    /// Operator reset: return errored targets to pending and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    reset_errors: bool,

    /// Operator reset: clear identity blocks before crawling
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    unblock_identities: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.reset_errors {
        handle_reset_errors(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh, cli.unblock_identities).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("statline=info,warn"),
            1 => EnvFilter::new("statline=debug,info"),
            2 => EnvFilter::new("statline=trace,debug"),
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

/// Handles --dry-run: validates config and shows what would be crawled
fn handle_dry_run(config: &statline::Config) {
    println!("=== Statline Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url);

    println!("\nThrottle:");
    println!("  Base delay: {}ms", config.throttle.base_delay_ms);
    println!(
        "  Delay bounds: {}ms - {}ms",
        config.throttle.min_delay_ms, config.throttle.max_delay_ms
    );
    println!(
        "  Reconfigure after {} throttled failures, halt after {} identity changes",
        config.throttle.failures_before_reconfigure, config.throttle.max_identity_changes
    );

    println!("\nIdentities:");
    if config.proxies.is_empty() {
        println!("  No proxies configured; direct connection only");
    } else {
        for proxy in &config.proxies {
            let kind = if proxy.residential {
                "residential"
            } else {
                "datacenter"
            };
            println!("  - {}:{} ({})", proxy.host, proxy.port, kind);
        }
    }

    println!("\nCompetitions ({}):", config.competitions.len());
    for competition in &config.competitions {
        println!(
            "  - {} [{}] ({} known seasons)",
            competition.name,
            competition.slug,
            competition.known_seasons.len()
        );
        println!("    * {}", competition.url);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would seed {} competition pages",
        config.competitions.len()
    );
}

/// Handles --stats: shows queue statistics from the database
fn handle_stats(config: &statline::Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let queue = SqliteQueue::new(Path::new(&config.output.database_path))?;

    if let Some(run) = queue.get_latest_run()? {
        println!(
            "Latest run: {} ({}), started {}",
            run.id,
            run.status.to_db_string(),
            run.started_at
        );
    } else {
        println!("No runs recorded yet");
    }

    println!("\nTargets: {} total", queue.count_total()?);
    let breakdown = queue.status_breakdown()?;
    let mut statuses: Vec<_> = breakdown.iter().collect();
    statuses.sort_by_key(|(status, _)| status.to_db_string());
    for (status, count) in statuses {
        println!("  {}: {}", status, count);
    }

    Ok(())
}

/// Handles --reset-errors: operator reset of errored targets
fn handle_reset_errors(config: &statline::Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut queue = SqliteQueue::new(Path::new(&config.output.database_path))?;
    let reset = queue.reset_terminal(TargetStatus::Error)?;
    println!("Reset {} errored targets to pending", reset);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: statline::Config,
    config_hash: &str,
    fresh: bool,
    unblock_identities: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        let db_path = Path::new(&config.output.database_path);
        if db_path.exists() {
            tracing::info!("Starting fresh: removing {}", db_path.display());
            std::fs::remove_file(db_path)?;
        }
    } else {
        tracing::info!("Starting crawl (will resume if an interrupted run exists)");
    }

    tracing::info!(
        "Competitions: {}, proxies: {}",
        config.competitions.len(),
        config.proxies.len()
    );

    let mut orchestrator = Orchestrator::new(config, config_hash, HrefScanParser)?;

    if unblock_identities {
        orchestrator.unblock_identities();
    }

    match orchestrator.run().await {
        Ok(report) => {
            if report.halted {
                tracing::error!(
                    "Run {} halted; rerun with --reset-errors after investigating",
                    report.run_id
                );
                return Err("crawl session halted".into());
            }
            if let Some(kind) = report.failed_stage {
                tracing::error!(
                    "Run {} ended by a failing {} stage; rerun to retry",
                    report.run_id,
                    kind
                );
                return Err("mandatory crawl stage failed".into());
            }
            tracing::info!("Crawl run {} finished", report.run_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
