//! flowbatch-source: runs a pollable batching source against a synthetic
//! producer and a logging sink.
//!
//! The producer pushes JSON messages onto the shared queue at a fixed rate;
//! the runner drains them into batches and logs each dispatched batch.
//! Stops on Ctrl-C, or shortly after the producer finishes when
//! `--messages` is set.

use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Map};
use tracing::{info, warn};

use flowbatch_core::config::load_dotenv;
use flowbatch_core::SourceConfig;
use flowbatch_queue::{
    channel, BatchSink, Event, PollableSource, QueueMessage, QueueProducer, SinkError,
    SourceRunner, StopHandle,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Pollable batching source demo.
#[derive(Parser, Debug)]
#[command(name = "flowbatch-source", version, about)]
struct Cli {
    /// Path to a TOML source config. Environment variables are used when absent.
    #[arg(long, env = "FLOWBATCH_CONFIG")]
    config: Option<String>,

    /// Override the maximum batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the maximum cycle duration in milliseconds.
    #[arg(long)]
    batch_duration_ms: Option<u64>,

    /// Delay between produced messages in milliseconds.
    #[arg(long, env = "FLOWBATCH_PRODUCE_EVERY_MS", default_value_t = 5)]
    produce_every_ms: u64,

    /// Number of messages to produce (0 = until Ctrl-C).
    #[arg(long, env = "FLOWBATCH_MESSAGES", default_value_t = 0)]
    messages: u64,
}

// ── LoggingSink ─────────────────────────────────────────────────────

/// Logs every batch it receives.
struct LoggingSink;

#[async_trait]
impl BatchSink for LoggingSink {
    async fn process_batch(&self, events: Vec<Event>) -> Result<(), SinkError> {
        let bytes: usize = events.iter().map(|e| e.body().len()).sum();
        let first = events
            .first()
            .map(|e| String::from_utf8_lossy(e.body()).into_owned())
            .unwrap_or_default();
        info!(events = events.len(), bytes, first = %first, "batch received");
        Ok(())
    }
}

// ── Producer ────────────────────────────────────────────────────────

async fn produce(producer: &QueueProducer, every: Duration, limit: u64) {
    let mut seq: u64 = 0;
    loop {
        if limit > 0 && seq >= limit {
            break;
        }
        let mut fields = Map::new();
        fields.insert("body".into(), json!(format!("event-{seq}")));
        fields.insert("seq".into(), json!(seq));
        if producer.push(QueueMessage::new(fields)).is_err() {
            warn!("queue closed, producer exiting");
            return;
        }
        seq += 1;
        tokio::time::sleep(every).await;
    }
    info!(produced = seq, "producer finished");
}

fn load_config(cli: &Cli) -> anyhow::Result<SourceConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let cfg = SourceConfig::from_file(path)?;
            info!(path = %path, "loaded source config");
            cfg
        }
        None => SourceConfig::from_env()?,
    };
    if let Some(size) = cli.batch_size {
        config.batch_size = size;
    }
    if let Some(ms) = cli.batch_duration_ms {
        config.batch_duration_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn stop_on_ctrl_c(handle: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping");
            handle.stop();
        }
    });
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.log_summary();

    let (producer, queue) = channel();
    let mut source = PollableSource::new("flowbatch-source", queue, LoggingSink);
    source.configure(config.clone())?;

    let handle = source.stop_handle();
    stop_on_ctrl_c(handle.clone());

    let every = Duration::from_millis(cli.produce_every_ms);
    let limit = cli.messages;
    let linger = config.batch_duration() * 2 + Duration::from_millis(100);
    tokio::spawn(async move {
        produce(&producer, every, limit).await;
        if limit > 0 {
            // let the last partial batch go out before stopping
            tokio::time::sleep(linger).await;
            handle.stop();
        }
    });

    let runner = SourceRunner::from_config(&config);
    let stats = runner.run(&mut source).await;

    info!(
        cycles = stats.cycles,
        ready = stats.ready,
        backoff = stats.backoff,
        "flowbatch-source exited cleanly"
    );
    println!("{}", serde_json::to_string_pretty(&source.counter().snapshot())?);
    Ok(())
}
