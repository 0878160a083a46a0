//! Pollable source: lifecycle, configuration and the per-cycle dispatch
//! decision.
//!
//! The host calls [`PollableSource::process`] repeatedly. Each call runs one
//! bounded poll and either hands a non-empty batch to the sink
//! ([`Status::Ready`]) or reports back-pressure ([`Status::Backoff`]).
//! Failures never escape a cycle; they end up in the [`SourceCounter`].

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use flowbatch_core::{Context, SourceConfig};

use crate::accumulator::BatchAccumulator;
use crate::counter::SourceCounter;
use crate::error::{CycleError, SourceError};
use crate::message::Event;
use crate::poller::BoundedPoller;
use crate::queue::MessageQueue;
use crate::sink::BatchSink;

/// Outcome of one cycle, used by the host to pick its polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// A batch was dispatched.
    Ready,
    /// Nothing was dispatched: no events, a failure, or the source is not running.
    Backoff,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => f.write_str("READY"),
            Status::Backoff => f.write_str("BACKOFF"),
        }
    }
}

/// Raises the stop signal of a source from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Ask the in-flight cycle (and any runner) to finish at the next checkpoint.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Drains a shared queue into batches for a downstream sink.
pub struct PollableSource<Q, S> {
    name: String,
    config: SourceConfig,
    queue: Q,
    sink: S,
    poller: BoundedPoller,
    batch: BatchAccumulator<Event>,
    counter: Arc<SourceCounter>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    running: bool,
}

impl<Q, S> PollableSource<Q, S>
where
    Q: MessageQueue,
    S: BatchSink,
{
    /// Create a stopped source with the default configuration.
    pub fn new(name: impl Into<String>, queue: Q, sink: S) -> Self {
        let name = name.into();
        let config = SourceConfig::default();
        let (stop_tx, stop_rx) = watch::channel(true);
        Self {
            poller: BoundedPoller::new(config.payload_key.clone(), config.batch_duration()),
            batch: BatchAccumulator::new(config.batch_size),
            counter: Arc::new(SourceCounter::new(name.clone())),
            name,
            config,
            queue,
            sink,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            running: false,
        }
    }

    /// Apply a configuration. Only allowed while stopped.
    pub fn configure(&mut self, config: SourceConfig) -> Result<(), SourceError> {
        if self.running {
            return Err(SourceError::Running);
        }
        config.validate()?;
        self.poller = BoundedPoller::new(config.payload_key.clone(), config.batch_duration());
        self.batch = BatchAccumulator::new(config.batch_size);
        self.config = config;
        info!(
            source = %self.name,
            batch_size = self.config.batch_size,
            batch_duration_ms = self.config.batch_duration_ms,
            payload_key = %self.config.payload_key,
            "source configured"
        );
        Ok(())
    }

    /// Apply a host key/value context.
    pub fn configure_context(&mut self, ctx: &Context) -> Result<(), SourceError> {
        let config = SourceConfig::from_context(ctx)?;
        self.configure(config)
    }

    /// Reset the counters and accept cycles.
    ///
    /// A running source whose stop signal was raised through a [`StopHandle`]
    /// is restarted.
    pub fn start(&mut self) {
        if self.running {
            if !*self.stop_tx.borrow() {
                warn!(source = %self.name, "start called on a running source");
                return;
            }
            info!(source = %self.name, "restarting source after stop signal");
        }
        self.batch.discard();
        self.counter.start();
        self.stop_tx.send_replace(false);
        self.running = true;
        info!(source = %self.name, "source started");
    }

    /// Raise the stop signal and finalize the counters.
    pub fn stop(&mut self) {
        self.stop_tx.send_replace(true);
        if !self.running {
            return;
        }
        self.running = false;
        self.counter.stop();
        let snap = self.counter.snapshot();
        info!(
            source = %self.name,
            events_received = snap.events_received,
            failures = snap.failures,
            "source stopped"
        );
    }

    /// Run one polling cycle. Never fails; errors become [`Status::Backoff`].
    pub async fn process(&mut self) -> Status {
        if !self.running {
            debug!(source = %self.name, "process called on a stopped source");
            return Status::Backoff;
        }

        match self.run_cycle().await {
            Ok(status) => status,
            Err(err) => {
                let dropped = self.batch.discard();
                self.counter.add_discarded(dropped as u64);
                self.counter.record_failure(&err);
                warn!(
                    source = %self.name,
                    kind = %err.kind(),
                    error = %err,
                    dropped,
                    "cycle failed, partial batch discarded"
                );
                Status::Backoff
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<Status, CycleError> {
        let started = Instant::now();
        let reason = self
            .poller
            .poll(&mut self.queue, &mut self.batch, &mut self.stop_rx)
            .await?;

        if self.batch.is_empty() {
            debug!(source = %self.name, %reason, "no events, backing off");
            return Ok(Status::Backoff);
        }

        let events = self.batch.take();
        let count = events.len();
        self.counter.add_received(count as u64);
        if let Err(e) = self.sink.process_batch(events).await {
            self.counter.add_discarded(count as u64);
            return Err(e.into());
        }
        self.counter.add_batch_dispatched();

        debug!(
            source = %self.name,
            events = count,
            %reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch dispatched"
        );
        Ok(Status::Ready)
    }

    /// Cloneable handle that can stop this source from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    pub(crate) fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Maximum number of events per dispatched batch.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn counter(&self) -> Arc<SourceCounter> {
        self.counter.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
