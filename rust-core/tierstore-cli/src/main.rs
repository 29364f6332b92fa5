// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! tierstore: command-line access to one TierStore collection.
//!
//! The primary is a redb file under `--data-dir`; the fallback is a JSON
//! file next to it. Configuration comes from `TIERSTORE_*` variables, with
//! the device flags below layered on top.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tierstore::{
    DeviceProfile, FileFlatStore, KvStore, KvStoreBuilder, RedbConnector, StoreConfig,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "tierstore", version = VERSION, about = "Tiered key-value store")]
struct Cli {
    /// Directory holding the primary database and the fallback file.
    #[arg(long, default_value = ".tierstore")]
    data_dir: PathBuf,

    /// Collection to operate on.
    #[arg(long, default_value = "default")]
    collection: String,

    /// Size batches for a mobile-class device.
    #[arg(long)]
    mobile: bool,

    /// Device memory in GB, used for low-memory batch sizing.
    #[arg(long)]
    memory_gb: Option<f64>,

    /// Print operation timings after the command.
    #[arg(long)]
    timings: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under KEY.
    Get { key: String },
    /// Store VALUE under KEY. VALUE is parsed as JSON, else kept as a string.
    Set { key: String, value: String },
    /// Remove KEY.
    Remove { key: String },
    /// Remove every key in the collection.
    Clear,
    /// Bulk-write the top-level entries of a JSON object file.
    Import { file: PathBuf },
    /// Show tier, batch size and configuration.
    Info,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let store = open_store(&cli).await?;
    store.enable_performance_monitoring(cli.timings);

    run(&store, cli.command).await?;

    if cli.timings {
        let metrics = store.performance_metrics();
        eprintln!(
            "{} operation(s), {:.3} ms total, {:.3} ms average",
            metrics.operations, metrics.total_time, metrics.avg_time
        );
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(cli: &Cli) -> anyhow::Result<KvStore> {
    let config = StoreConfig::from_env().context("reading TIERSTORE_* configuration")?;

    let device = DeviceProfile {
        is_mobile: cli.mobile,
        device_memory_gb: cli.memory_gb,
    };

    let fallback_path = cli.data_dir.join("fallback.json");
    let fallback = FileFlatStore::open(&fallback_path)
        .with_context(|| format!("opening fallback store {}", fallback_path.display()))?;

    let store = KvStoreBuilder::new(cli.collection.clone())
        .config(config)
        .device(device)
        .primary(RedbConnector::new(cli.data_dir.join("primary.redb")))
        .fallback(Arc::new(fallback))
        .open()
        .await?;

    tracing::debug!(
        data_dir = %cli.data_dir.display(),
        collection = %cli.collection,
        "store ready"
    );
    Ok(store)
}

async fn run(store: &KvStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Get { key } => match store.get(&key).await {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => bail!("no value for '{key}'"),
        },
        Command::Set { key, value } => {
            let value = parse_value(value);
            if store.set(&key, &value).await.is_none() {
                bail!("could not store '{key}'");
            }
        }
        Command::Remove { key } => {
            if !store.remove_item(&key).await {
                bail!("could not remove '{key}'");
            }
        }
        Command::Clear => {
            if !store.clear().await {
                bail!("could not clear '{}'", store.name());
            }
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let document: Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", file.display()))?;
            let Value::Object(entries) = document else {
                bail!("{} must contain a JSON object", file.display());
            };
            let report = store.batch_set_with_report(entries).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                bail!("{} of {} entries were not stored", report.failed, report.attempted());
            }
        }
        Command::Info => {
            let tier = store.ensure_ready().await;
            let info = json!({
                "collection": store.name(),
                "active_tier": tier,
                "state": store.backend_state(),
                "batch_size": store.batch_size(),
                "baseline_batch_size": store.baseline_batch_size(),
                "config": store.config(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }
    Ok(())
}

fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42".into()), json!(42));
        assert_eq!(parse_value(r#"{"a":1}"#.into()), json!({"a": 1}));
        assert_eq!(parse_value("plain text".into()), json!("plain text"));
    }

    #[test]
    fn test_cli_parses_device_flags() {
        let cli = Cli::parse_from([
            "tierstore",
            "--mobile",
            "--memory-gb",
            "1.5",
            "--collection",
            "notes",
            "set",
            "k",
            "v",
        ]);
        assert!(cli.mobile);
        assert_eq!(cli.memory_gb, Some(1.5));
        assert_eq!(cli.collection, "notes");
        assert!(matches!(cli.command, Command::Set { .. }));
    }
}
