//! Drives a [`PollableSource`] the way a host scheduler would: cycle after
//! cycle, sleeping longer after each consecutive back-off.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use flowbatch_core::SourceConfig;

use crate::poller::stop_requested;
use crate::queue::MessageQueue;
use crate::sink::BatchSink;
use crate::source::{PollableSource, Status};

/// Totals of one [`SourceRunner::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub cycles: u64,
    pub ready: u64,
    pub backoff: u64,
}

/// Re-invokes a source until its stop signal is raised.
#[derive(Debug, Clone)]
pub struct SourceRunner {
    backoff_increment: Duration,
    max_backoff: Duration,
}

impl SourceRunner {
    pub fn new(backoff_increment: Duration, max_backoff: Duration) -> Self {
        Self {
            backoff_increment,
            max_backoff,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.backoff_increment(), config.max_backoff())
    }

    /// Sleep after `consecutive` back-offs in a row.
    pub fn backoff_for(&self, consecutive: u32) -> Duration {
        self.backoff_increment
            .saturating_mul(consecutive)
            .min(self.max_backoff)
    }

    /// Start the source if needed, cycle until stopped, then stop it.
    pub async fn run<Q, S>(&self, source: &mut PollableSource<Q, S>) -> RunStats
    where
        Q: MessageQueue,
        S: BatchSink,
    {
        if !source.is_running() {
            source.start();
        }
        let mut stop = source.stop_signal();
        let mut stats = RunStats::default();
        let mut consecutive: u32 = 0;

        info!(
            source = %source.name(),
            backoff_increment_ms = self.backoff_increment.as_millis() as u64,
            max_backoff_ms = self.max_backoff.as_millis() as u64,
            "runner started"
        );

        while !*stop.borrow() {
            stats.cycles += 1;
            match source.process().await {
                Status::Ready => {
                    stats.ready += 1;
                    consecutive = 0;
                }
                Status::Backoff => {
                    stats.backoff += 1;
                    consecutive = consecutive.saturating_add(1);
                    let pause = self.backoff_for(consecutive);
                    debug!(
                        source = %source.name(),
                        consecutive,
                        pause_ms = pause.as_millis() as u64,
                        "backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = stop_requested(&mut stop) => break,
                    }
                }
            }
        }

        source.stop();
        info!(
            source = %source.name(),
            cycles = stats.cycles,
            ready = stats.ready,
            backoff = stats.backoff,
            "runner stopped"
        );
        stats
    }
}
