#![warn(clippy::all, rust_2018_idioms)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;
use tokio::sync::mpsc;

use cwtail::app::cloudwatch_logs::{CloudWatchLogsClient, LogEvent, TailController};
use cwtail::app::config::TailConfig;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_BRANCH"),
    "@",
    env!("GIT_COMMIT"),
    ")"
);

/// Tail or replay the events of a CloudWatch Logs log group
///
/// Without --end the log group is tailed until interrupted.
#[derive(Parser, Debug)]
#[command(name = "cwtail")]
#[command(version = VERSION, about, long_about = None)]
struct Cli {
    /// Log groups to read (only the first one is followed)
    #[arg(value_name = "LOG_GROUP", required = true)]
    log_groups: Vec<String>,

    /// AWS profile name
    #[arg(short, long)]
    profile: Option<String>,

    /// AWS region
    #[arg(short, long)]
    region: Option<String>,

    /// Path to a TOML tail configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start time: RFC 3339 or relative to now (-30s, -15m, -2h, -1d)
    #[arg(long, value_name = "TIME", value_parser = parse_time, allow_hyphen_values = true)]
    start: Option<i64>,

    /// End time, same format as --start; reads a fixed range and exits
    #[arg(
        long,
        value_name = "TIME",
        value_parser = parse_time,
        allow_hyphen_values = true,
        requires = "start"
    )]
    end: Option<i64>,

    /// Prefix each event with its shortened stream name
    #[arg(short, long)]
    show_stream_names: bool,

    /// Print each event as a JSON object
    #[arg(short, long)]
    json: bool,
}

fn parse_time(value: &str) -> Result<i64> {
    parse_time_at(value, Utc::now())
}

/// Parse an absolute RFC 3339 time or a relative offset like `-15m`
fn parse_time_at(value: &str, now: DateTime<Utc>) -> Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }

    let relative = value
        .strip_prefix('-')
        .ok_or_else(|| anyhow!("invalid time {:?}", value))?;
    let Some((unit_at, _)) = relative.char_indices().last() else {
        bail!("invalid time {:?}", value);
    };
    let (amount, unit) = relative.split_at(unit_at);
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("invalid time {:?}", value))?;
    let offset = match unit {
        "s" => TimeDelta::try_seconds(amount),
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        _ => bail!("invalid time unit in {:?}", value),
    };
    offset
        .and_then(|offset| now.checked_sub_signed(offset))
        .map(|time| time.timestamp_millis())
        .ok_or_else(|| anyhow!("time {:?} is out of range", value))
}

fn init_logging() {
    use tracing_subscriber::prelude::*;

    // stdout carries the events, so diagnostics go to a file
    let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "cwtail") else {
        return;
    };
    let log_dir = proj_dirs.data_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_path = log_dir.join("cwtail.log");

    let file = match std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("cwtail: cannot open log file {:?}: {}", log_path, e);
            return;
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "cwtail=info,aws_config=warn,aws_smithy_runtime=warn,aws_sigv4=warn,hyper=warn",
        )
    });

    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false), // No ANSI colors in file
    );

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("cwtail: failed to set tracing subscriber: {}", e);
        return;
    }
    tracing::info!("Logging initialized to: {:?}", log_path);
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        tracing::error!("cwtail panicked at {}: {}", location, panic_info);
        eprintln!("cwtail crashed at {}: {}", location, panic_info);
    }));
}

fn format_event(event: &LogEvent, cli: &Cli) -> String {
    if cli.json {
        return serde_json::to_string(event).unwrap_or_else(|_| event.message().to_string());
    }
    if cli.show_stream_names {
        format!("[{}] {}", event.short_stream_name(), event.message())
    } else {
        event.message().to_string()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();
    let cli = Cli::parse();

    init_logging();
    tracing::info!("cwtail starting: {:?}", cli);

    let config = match &cli.config {
        Some(path) => TailConfig::load_from_file(path)?,
        None => TailConfig::default(),
    };

    let client = Arc::new(
        CloudWatchLogsClient::from_env(cli.profile.as_deref(), cli.region.as_deref()).await,
    );
    let (tx, mut rx) = mpsc::channel(config.channel_capacity());

    let mut session = TailController::new(client, config)
        .begin(tx, &cli.log_groups, cli.start, cli.end)
        .await?;

    if let Some(mut errors) = session.take_errors() {
        tokio::spawn(async move {
            while let Some(error) = errors.recv().await {
                eprintln!("cwtail: {}", error);
            }
        });
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => println!("{}", format_event(&event, &cli)),
                None => break,
            },
            _ = &mut shutdown => {
                session.stop();
                break;
            }
        }
    }

    session.join().await;
    tracing::info!("cwtail finished");
    Ok(())
}
