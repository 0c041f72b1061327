use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use strava_client::config::Config;
use strava_client::http_client::ReqwestStravaClient;
use strava_client::retry::RetryPolicy;
use strava_export::{
    ActivityStore, Clock, ExportConfig, Fetcher, Granularity, PassReport, PassRequest,
    RateGovernor, RateLimitMode, SyncOrchestrator, SyncStrategy, SystemClock,
};
use tokio::sync::watch;

/// Export Strava activities into a local SQLite database.
#[derive(Debug, Parser)]
#[command(name = "strava-export", version, about)]
struct Cli {
    /// SQLite database file (overrides STRAVA_EXPORT_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Sleep through rate limits instead of stopping with a resume hint.
    #[arg(long, global = true)]
    wait: bool,

    /// Print the pass report as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mirror activity summaries.
    Summaries(PassArgs),
    /// Mirror activity details for summaries already stored.
    Details(PassArgs),
}

#[derive(Debug, Args)]
struct PassArgs {
    /// OVERWRITE_IF_CHANGED or ONLY_MISSING (details only).
    #[arg(long)]
    strategy: SyncStrategy,

    /// Only activities starting after this instant (epoch seconds or RFC 3339 with offset).
    #[arg(long, value_parser = parse_timestamp)]
    after_ts: Option<DateTime<Utc>>,

    /// Only activities starting before this instant; defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    before_ts: Option<DateTime<Utc>>,
}

const EXIT_FAILURE: u8 = 1;
const EXIT_SUSPENDED: u8 = 2;

/// Epoch seconds, or RFC 3339 carrying an explicit offset. Naive datetimes
/// are ambiguous and rejected.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| format!("epoch seconds {secs} out of range"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            format!(
                "{raw:?} is neither epoch seconds nor an RFC 3339 timestamp with a UTC offset \
                 (e.g. 2025-01-18T14:30:00+01:00)"
            )
        })
}

fn init_tracing() {
    // `STRAVA_EXPORT_LOG_LEVEL`, then `RUST_LOG`, default `info`.
    let log_env = std::env::var("STRAVA_EXPORT_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&log_env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::debug!("strava-export: log filter: {}", log_env);
}

/// Flip the cancel flag on the first Ctrl+C; a second one quits immediately.
fn spawn_shutdown_handler(cancel: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("could not install Ctrl+C handler");
            return;
        }
        tracing::warn!("shutdown requested, finishing the current record");
        let _ = cancel.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

async fn run(cli: Cli) -> anyhow::Result<PassReport> {
    let mut config = ExportConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let (granularity, args) = match cli.command {
        Command::Summaries(args) => (Granularity::Summary, args),
        Command::Details(args) => (Granularity::Detail, args),
    };
    let request = PassRequest {
        granularity,
        strategy: args.strategy,
        after: args.after_ts,
        before: args.before_ts,
    };
    // Fail on a bad strategy before touching credentials or the database.
    request.strategy.validate_for(request.granularity)?;

    let client = ReqwestStravaClient::from_config(&Config::from_env()?)?;
    let store = ActivityStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let governor = RateGovernor::new(config.calls_per_window, clock.now());
    let retry = RetryPolicy {
        max_retries: config.max_retries,
        ..RetryPolicy::default()
    };
    let mode = if cli.wait {
        RateLimitMode::Wait
    } else {
        RateLimitMode::Stop
    };
    let fetcher = Fetcher::new(Arc::new(client), clock, governor, retry, mode);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    spawn_shutdown_handler(cancel_tx);

    let mut orchestrator =
        SyncOrchestrator::new(fetcher, store, config.page_size).with_cancel(cancel_rx);
    Ok(orchestrator.run(&request).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing();
    let json = cli.json;

    match run(cli).await {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(body) => println!("{body}"),
                    Err(err) => {
                        eprintln!("error: could not serialize report: {err}");
                        return ExitCode::from(EXIT_FAILURE);
                    }
                }
            } else {
                print!("{report}");
            }
            if report.is_completed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_SUSPENDED)
            }
        }
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_need_an_offset() {
        assert_eq!(
            parse_timestamp("1737210600").unwrap(),
            DateTime::from_timestamp(1_737_210_600, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2025-01-18T14:30:00+01:00").unwrap(),
            DateTime::from_timestamp(1_737_207_000, 0).unwrap()
        );
        assert!(parse_timestamp("2025-01-18T14:30:00").is_err());
        assert!(parse_timestamp("2025-01-18").is_err());
    }

    #[test]
    fn parses_pass_arguments() {
        let cli = Cli::try_parse_from([
            "strava-export",
            "--wait",
            "details",
            "--strategy",
            "ONLY_MISSING",
            "--after-ts",
            "1700000000",
        ])
        .unwrap();
        assert!(cli.wait);
        let Command::Details(args) = cli.command else {
            panic!("expected details");
        };
        assert_eq!(args.strategy, SyncStrategy::OnlyMissing);
        assert_eq!(args.after_ts.map(|t| t.timestamp()), Some(1_700_000_000));
        assert!(args.before_ts.is_none());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(
            Cli::try_parse_from(["strava-export", "summaries", "--strategy", "ALWAYS"]).is_err()
        );
    }
}
