//! BhavLab CLI: fetch the NSE F&O bhavcopy and print signals.
//!
//! Commands:
//! - `run`: acquire the latest session, diff against history, print signals
//! - `session`: report whether a date is a trading session
//! - `store status`: list stored sessions and record counts
//! - `config init`: write the default `bhavlab.toml`

use anyhow::{bail, Context, Result};
use bhavlab_core::data::SnapshotStore;
use bhavlab_runner::config::DEFAULT_CONFIG_FILE;
use bhavlab_runner::{
    build_calendar, render_summary, save_artifacts, BhavlabConfig, Pipeline, RunError,
    SignalReport,
};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bhavlab",
    about = "BhavLab CLI: NSE F&O bhavcopy acquisition and signals"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire the most recent bhavcopy and print signals.
    Run {
        /// Path to a TOML config file. Defaults to ./bhavlab.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Start date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Skip the remote holiday list and use weekdays only.
        #[arg(long, default_value_t = false)]
        offline_calendar: bool,

        /// Number of movers to list.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Only report futures contracts.
        #[arg(long, default_value_t = false)]
        futures_only: bool,

        /// Write signals.json, signals.csv and summary.txt here.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Report whether a date is a trading session.
    Session {
        /// Date to check (YYYY-MM-DD).
        date: String,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip the remote holiday list and use weekdays only.
        #[arg(long, default_value_t = false)]
        offline_calendar: bool,
    },
    /// Snapshot store commands.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
    /// Configuration file commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// List stored sessions with record counts and sources.
    Status {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the built-in defaults to a TOML file.
    Init {
        /// Destination path.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            date,
            offline_calendar,
            top,
            futures_only,
            output_dir,
        } => run_cmd(
            config.as_deref(),
            date.as_deref(),
            offline_calendar,
            top,
            futures_only,
            output_dir.as_deref(),
        ),
        Commands::Session {
            date,
            config,
            offline_calendar,
        } => run_session(&date, config.as_deref(), offline_calendar),
        Commands::Store { action } => match action {
            StoreAction::Status { config } => run_store_status(config.as_deref()),
        },
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => run_config_init(&path, force),
        },
    }
}

/// Explicit path, else `./bhavlab.toml` when present, else built-in defaults.
fn load_config(path: Option<&Path>) -> Result<BhavlabConfig> {
    match path {
        Some(p) => BhavlabConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Ok(BhavlabConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?)
        }
        None => Ok(BhavlabConfig::default()),
    }
}

fn parse_date(date: Option<&str>) -> Result<NaiveDate> {
    Ok(date
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("dates must be YYYY-MM-DD")?
        .unwrap_or_else(|| chrono::Local::now().date_naive()))
}

fn run_cmd(
    config_path: Option<&Path>,
    date: Option<&str>,
    offline_calendar: bool,
    top: usize,
    futures_only: bool,
    output_dir: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let today = parse_date(date)?;

    let pipeline = Pipeline::from_config(config, offline_calendar)?;
    if pipeline.calendar().is_degraded() {
        println!("WARNING: holiday list unavailable, treating every weekday as a session");
    }

    let output = match pipeline.run(today) {
        Ok(output) => output,
        Err(RunError::ExhaustedWindow { attempts }) => {
            eprintln!("No bhavcopy found. Tried {} locations:", attempts.len());
            for attempt in &attempts {
                eprintln!("  {attempt}");
            }
            bail!("lookback window exhausted");
        }
        Err(e) => return Err(e.into()),
    };

    let mut report = SignalReport::from_run(&output);
    if futures_only {
        report = report.futures_only();
    }

    print!("{}", render_summary(&report, top));

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&report, dir, top)?;
        info!(dir = %run_dir.display(), "artifacts written");
        println!("\nArtifacts saved to: {}", run_dir.display());
    }

    Ok(())
}

fn run_session(date: &str, config_path: Option<&Path>, offline_calendar: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let date = parse_date(Some(date))?;
    let calendar = build_calendar(&config.holidays, offline_calendar);

    let status = if calendar.is_session(date) {
        "SESSION"
    } else if calendar.is_holiday(date) {
        "HOLIDAY"
    } else {
        "WEEKEND"
    };
    println!("{date} ({}): {status}", date.weekday());
    if calendar.is_degraded() {
        println!("  (holiday list unavailable, weekday-only calendar)");
    }
    match calendar.previous_session(date, config.store.lookback_days) {
        Some(prev) => println!("Previous session: {prev} ({})", prev.weekday()),
        None => println!("Previous session: none within lookback"),
    }
    Ok(())
}

fn run_store_status(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = SnapshotStore::new(config.store.root.clone());

    let sessions = store.status()?;
    if sessions.is_empty() {
        println!("No stored sessions in {}", store.root().display());
        return Ok(());
    }

    println!("Store: {}", store.root().display());
    println!("{:<12} {:>8}  {:<20} Source", "Session", "Records", "Stored at");
    println!("{}", "-".repeat(72));
    for s in &sessions {
        println!(
            "{:<12} {:>8}  {:<20} {}",
            s.session_date,
            s.record_count.map(|n| n.to_string()).unwrap_or_else(|| "?".into()),
            s.stored_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            s.source_url.as_deref().unwrap_or("-"),
        );
    }
    println!("\nTotal: {} sessions", sessions.len());
    Ok(())
}

fn run_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let toml = BhavlabConfig::default().to_toml()?;
    std::fs::write(path, toml).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "bhavlab",
            "run",
            "--date",
            "2024-11-15",
            "--offline-calendar",
            "--top",
            "5",
            "--futures-only",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                date,
                offline_calendar,
                top,
                futures_only,
                ..
            } => {
                assert_eq!(date.as_deref(), Some("2024-11-15"));
                assert!(offline_calendar);
                assert_eq!(top, 5);
                assert!(futures_only);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_parses_nested_subcommands() {
        let cli = Cli::try_parse_from(["bhavlab", "store", "status"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Store {
                action: StoreAction::Status { config: None }
            }
        ));
        let cli = Cli::try_parse_from(["bhavlab", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true, .. }
            }
        ));
    }

    #[test]
    fn bad_dates_are_rejected() {
        assert!(parse_date(Some("15-11-2024")).is_err());
        assert_eq!(
            parse_date(Some("2024-11-15")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 15).unwrap()
        );
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!("bhavlab_cli_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bhavlab.toml");

        run_config_init(&path, false).unwrap();
        assert!(run_config_init(&path, false).is_err());
        run_config_init(&path, true).unwrap();
        BhavlabConfig::from_file(&path).unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }
}
