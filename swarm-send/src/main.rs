//! swarm-send - Unattended multi-account publication daemon
//!
//! Loads the account registry, starts one publication worker per eligible
//! account with staggered startup, and runs until all accounts reach a
//! terminal state or a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use libswarmpost::{
    logging, Config, ContentPublisher, MockPublisher, Orchestrator, Result, StopFlag, SwarmError,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "swarm-send")]
#[command(version)]
#[command(about = "Unattended multi-account publication daemon")]
#[command(long_about = "\
swarm-send - Unattended multi-account publication daemon

DESCRIPTION:
    swarm-send reads the account registry, starts one worker per enabled,
    alive account, and publishes that account's content group on a
    humanized randomized cadence until stopped.

    Accounts that hit a dead proxy or a platform ban are quarantined;
    accounts redirected to a login surface are marked require_login.
    Both are skipped on subsequent runs until an operator restores them.
    Failures are appended to a durable failure log.

USAGE:
    # Dry run: publish against the in-memory test publisher
    swarm-send --dry-run

    # Enable verbose logging
    swarm-send --dry-run --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (workers stop within a second)

CONFIGURATION:
    Configuration file: ~/.config/swarmpost/config.toml
    Account registry:   ~/.local/share/swarmpost/accounts.json
    Failure log:        ~/.local/share/swarmpost/failures.json
    Content groups:     ~/.local/share/swarmpost/groups/<group>.json

    [pacing]
    min_minutes = 17
    max_minutes = 33
    jitter_minutes = 3
    use_individual_delays = false

    [runner]
    selection = \"sequential\"   # or \"random\"
    max_requeues = 3
    stagger_min_secs = 13
    stagger_max_secs = 47

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
    3 - Invalid arguments
")]
struct Cli {
    /// Publish against the in-memory test publisher instead of a platform
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("SWARMPOST_LOG_LEVEL", "debug");
    }
    logging::init_default();

    if let Err(e) = run(&cli).await {
        tracing::error!("swarm-send failed: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load()?;

    // TODO: wire a platform publisher once a protocol backend lands
    let publisher: Arc<dyn ContentPublisher> = if cli.dry_run {
        info!("dry run: using the in-memory publisher");
        Arc::new(MockPublisher::new())
    } else {
        return Err(SwarmError::InvalidInput(
            "no platform publisher is configured; run with --dry-run".to_string(),
        ));
    };

    let orchestrator = Orchestrator::new(&config, publisher);
    setup_signal_handlers(orchestrator.stop_flag())?;

    info!("swarm-send daemon starting");
    orchestrator.run().await?;
    info!("swarm-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(stop: StopFlag) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| SwarmError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    stop.stop();
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_stop: StopFlag) -> Result<()> {
    Ok(())
}
