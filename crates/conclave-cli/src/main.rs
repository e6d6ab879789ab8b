//! Conclave session tracker inspection CLI.
//!
//! Reads the same file-backed tracker store the session hosts publish to,
//! so operators can answer "what is live right now" without touching a
//! running host:
//!
//! ```text
//! conclave --data-dir /var/lib/conclave sessions   # list live sessions
//! conclave --data-dir /var/lib/conclave show <id>  # full record as JSON
//! conclave --data-dir /var/lib/conclave prune      # sweep dead entries
//! ```
//!
//! Logging: `--debug` > `--verbose` > `RUST_LOG` > default `warn`.
//! Exit codes: 0 success, 1 error, 2 not found.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use conclave_tracker::{FileBackend, TrackerConfig, TrackerError, TrackerStore};
use conclave_types::SessionId;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const EXIT_NOT_FOUND: i32 = 2;

/// Conclave session tracker inspector.
#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(version, about, long_about = None)]
struct Args {
    /// Tracker store directory.
    #[arg(long, value_name = "DIR")]
    data_dir: PathBuf,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List live session trackers.
    Sessions,
    /// Print one session's full tracker record as JSON.
    Show {
        /// Session id.
        id: String,
    },
    /// Sweep terminated-and-aged or expired tracker entries.
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    info!(path = %args.data_dir.display(), "opening tracker store");
    let backend = FileBackend::new(&args.data_dir)
        .with_context(|| format!("cannot open data dir {}", args.data_dir.display()))?;
    let store = TrackerStore::new(Arc::new(backend), TrackerConfig::default())
        .await
        .context("cannot open tracker store")?;

    match args.command {
        Command::Sessions => sessions(&store).await,
        Command::Show { id } => show(&store, &id).await,
        Command::Prune => prune(&store).await,
    }
}

async fn sessions(store: &TrackerStore) -> Result<()> {
    let mut records = store.list().await.context("cannot list sessions")?;
    if records.is_empty() {
        println!("No active sessions.");
        return Ok(());
    }

    records.sort_by_key(|r| r.created);

    println!(
        "{:<36}  {:<4}  {:<10}  {:<12}  {:>7}  AGE",
        "ID", "KIND", "STATE", "HOST USER", "PARTIES"
    );
    let now = Utc::now();
    for record in records {
        let age = now.signed_duration_since(record.created);
        println!(
            "{:<36}  {:<4}  {:<10}  {:<12}  {:>7}  {}",
            record.session_id,
            record.kind,
            record.state,
            record.host_user,
            record.participants.len(),
            format_age(age),
        );
    }

    Ok(())
}

async fn show(store: &TrackerStore, id: &str) -> Result<()> {
    let session_id = match SessionId::parse(id) {
        Ok(session_id) => session_id,
        Err(_) => {
            eprintln!("'{id}' is not a valid session id");
            std::process::exit(EXIT_NOT_FOUND);
        }
    };

    match store.get(session_id).await {
        Ok(record) => {
            let json =
                serde_json::to_string_pretty(&record).context("cannot render record")?;
            println!("{json}");
            Ok(())
        }
        Err(TrackerError::NotFound(_)) => {
            eprintln!("session {id} not found");
            std::process::exit(EXIT_NOT_FOUND);
        }
        Err(e) => Err(e).context("cannot read session"),
    }
}

async fn prune(store: &TrackerStore) -> Result<()> {
    let collected = store.prune().await.context("prune failed")?;
    match collected.len() {
        0 => println!("Nothing to prune."),
        1 => println!("Pruned 1 session: {}", collected[0]),
        n => {
            println!("Pruned {n} sessions:");
            for id in collected {
                println!("  {id}");
            }
        }
    }
    Ok(())
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_age_buckets() {
        assert_eq!(format_age(chrono::Duration::seconds(5)), "5s");
        assert_eq!(format_age(chrono::Duration::seconds(185)), "3m");
        assert_eq!(format_age(chrono::Duration::seconds(3700)), "1h1m");
        assert_eq!(format_age(chrono::Duration::seconds(-30)), "0s");
    }

    #[test]
    fn args_parse_subcommands() {
        let args = Args::parse_from(["conclave", "--data-dir", "/tmp/x", "sessions"]);
        assert!(matches!(args.command, Command::Sessions));

        let args =
            Args::parse_from(["conclave", "--data-dir", "/tmp/x", "show", "abc"]);
        assert!(matches!(args.command, Command::Show { .. }));

        let args = Args::parse_from(["conclave", "--data-dir", "/tmp/x", "--debug", "prune"]);
        assert!(args.debug);
        assert!(matches!(args.command, Command::Prune));
    }

    #[test]
    fn data_dir_is_required() {
        assert!(Args::try_parse_from(["conclave", "sessions"]).is_err());
    }
}
