// Draft monitor entry point.
//
// Replays a captured draft-room message log (file or stdin) through the event
// processor, one line at a time and in order.
//
// Startup sequence:
// 1. Initialize tracing (log file under logs/, or stderr)
// 2. Load config
// 3. Load player data and open the player cache
// 4. Warm the resolver cache and spawn the reconciler
// 5. Build the event processor
// 6. Process input lines, validating after every pick
// 7. Shut down background tasks and print the final report

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use draftops_core::config;
use draftops_core::db::PlayerCacheDb;
use draftops_core::players;
use draftops_core::processor::{DraftNotification, EventProcessor, ProcessOutcome};
use draftops_core::reconcile::spawn_reconciler;
use draftops_core::resolver::{CachedPositionResolver, ResolverCache};

const DEFAULT_LOG_FILTER: &str = "draftops_core=info,draftops_monitor=info,warn";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Message log to replay, one draft-room message per line ("-" for stdin).
    #[arg(default_value = "-")]
    input: String,

    /// Directory holding defaults/, config/ and the data files.
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Log to stderr instead of logs/draftops-monitor.log.
    #[arg(long)]
    log_stderr: bool,

    /// Stop processing when validation finds counter regression or duplicates.
    #[arg(long)]
    halt_on_corruption: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1. Initialize tracing
    init_tracing(&args.base_dir, args.log_stderr)?;
    info!("Draft monitor starting up");

    // 2. Load config
    let config = config::load_config(&args.base_dir).context("failed to load configuration")?;
    let session = &config.session;
    info!(
        "Config loaded: league={}, team {} of {}, {} rounds",
        session.league_id, session.team_id, session.team_count, session.roster_size
    );

    // 3. Player data and cache
    let players_path = config::resolve_path(&args.base_dir, &config.data.players_csv);
    let players = match players::load_players(&players_path) {
        Ok(players) => {
            info!("Loaded {} players from {}", players.len(), players_path.display());
            players
        }
        Err(e) => {
            warn!("Starting with an empty player pool: {}", e);
            Vec::new()
        }
    };

    let db_path = config::resolve_path(&args.base_dir, &config.data.cache_db);
    let db = Arc::new(
        PlayerCacheDb::open(&db_path.to_string_lossy()).context("failed to open player cache")?,
    );
    if !players.is_empty() {
        db.import_players(&players)
            .context("failed to import players into cache")?;
    }
    info!(
        "Player cache at {} holds {} players",
        db_path.display(),
        db.player_count()?
    );

    // 4. Resolver cache and background reconciliation
    let cache = ResolverCache::new();
    cache.extend(db.load_positions().context("failed to warm resolver cache")?);
    let (resolver, miss_rx) =
        CachedPositionResolver::with_queue(cache.clone(), config.resolver.queue_capacity);
    let resolver = Arc::new(resolver);
    let reconciler = spawn_reconciler(
        miss_rx,
        cache.clone(),
        db.clone(),
        config.resolver.reconciler_config(),
    );

    // 5. Event processor
    let mut processor = EventProcessor::new(
        session.league_id.clone(),
        session.team_id,
        session.team_count,
        session.roster_size,
    );
    processor.set_position_resolver(resolver.clone());
    processor.initialize_player_pool(players.iter().map(|p| p.player_id.clone()));
    if let Some(order) = &session.draft_order {
        processor.set_draft_order(order.clone());
    }

    let notifier = tokio::spawn(log_notifications(processor.subscribe()));

    // 6. Process input
    let reader = open_input(&args.input).await?;
    let mut lines = reader.lines();
    let mut halted = false;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        if line.trim().is_empty() {
            continue;
        }
        let outcome = processor.process_message(&line);
        if outcome != ProcessOutcome::Applied("SELECTED") {
            continue;
        }

        let validation = processor.validate();
        if !validation.is_valid {
            error!("Draft state inconsistent: {}", validation.errors.join("; "));
            if args.halt_on_corruption && validation.has_critical_errors() {
                halted = true;
                break;
            }
        }
    }

    // 7. Shutdown and report
    let summary = processor.state().read().summary();
    let stats = processor.stats();
    let validation = processor.validate();
    let resolver_stats = resolver.stats();

    // Dropping every resolver handle closes the miss queue and ends the reconciler;
    // dropping the processor closes the notification channel.
    drop(processor);
    drop(resolver);
    let reconcile_report = reconciler.await.context("reconciler task failed")?;
    let _ = notifier.await;

    info!(
        "Processed {} messages: {:.1}% ok, {} parse errors, {} anomalies, {} duplicates",
        stats.total_messages,
        stats.success_rate() * 100.0,
        stats.parse_errors,
        stats.anomalies,
        stats.duplicates
    );

    let report = serde_json::json!({
        "summary": summary,
        "stats": stats,
        "resolver": resolver_stats,
        "reconciler": reconcile_report,
        "validation": validation,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize report")?
    );

    if halted {
        anyhow::bail!("halted on inconsistent draft state");
    }
    info!("Draft monitor shut down cleanly");
    Ok(())
}

async fn open_input(input: &str) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if input == "-" {
        info!("Reading draft messages from stdin");
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("failed to open message log {input}"))?;
    info!("Reading draft messages from {}", input);
    Ok(Box::new(BufReader::new(file)))
}

async fn log_notifications(mut rx: tokio::sync::broadcast::Receiver<DraftNotification>) {
    loop {
        match rx.recv().await {
            Ok(DraftNotification::PickMade(pick)) => {
                debug!(
                    "Notified: pick #{} {} ({}) to team {}",
                    pick.pick_number, pick.player_id, pick.position, pick.team_id
                );
            }
            Ok(other) => debug!("Notified: {:?}", other),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Notification consumer lagged, skipped {} notifications", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Initialize tracing to a log file under `logs/`, or to stderr on request.
fn init_tracing(base_dir: &Path, log_stderr: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    if log_stderr {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("failed to set tracing subscriber")?;
    } else {
        let log_dir = base_dir.join("logs");
        std::fs::create_dir_all(&log_dir)?;
        let log_file = std::fs::File::create(log_dir.join("draftops-monitor.log"))?;
        let subscriber = builder.with_writer(log_file).with_ansi(false).finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("failed to set tracing subscriber")?;
    }

    Ok(())
}
