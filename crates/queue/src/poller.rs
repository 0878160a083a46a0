//! Bounded-time poller: fills the open batch until it is full, the cycle
//! deadline passes, or a stop is requested.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::accumulator::BatchAccumulator;
use crate::error::CycleError;
use crate::message::Event;
use crate::queue::MessageQueue;

/// Why a poll returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStop {
    /// The batch reached its maximum size.
    Full,
    /// The cycle deadline passed.
    Deadline,
    /// A stop was requested.
    Cancelled,
}

impl fmt::Display for PollStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollStop::Full => "full",
            PollStop::Deadline => "deadline",
            PollStop::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Drains a [`MessageQueue`] into a [`BatchAccumulator`] within a time budget.
#[derive(Debug, Clone)]
pub struct BoundedPoller {
    payload_key: String,
    max_duration: Duration,
}

impl BoundedPoller {
    pub fn new(payload_key: impl Into<String>, max_duration: Duration) -> Self {
        Self {
            payload_key: payload_key.into(),
            max_duration,
        }
    }

    /// Run one bounded poll.
    ///
    /// The first take is attempted even with a zero budget. After that, size,
    /// deadline and stop are re-checked before every take. When the queue is
    /// empty the poller waits for the next message, at most until the
    /// deadline. A message is only removed when it is about to be
    /// transformed, so a timeout or stop never drops one.
    ///
    /// On error the batch keeps whatever was appended; the caller decides
    /// what to do with it.
    pub async fn poll<Q>(
        &self,
        queue: &mut Q,
        batch: &mut BatchAccumulator<Event>,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<PollStop, CycleError>
    where
        Q: MessageQueue + ?Sized,
    {
        let deadline = Instant::now() + self.max_duration;
        let mut attempted = false;

        loop {
            if batch.is_full() {
                return Ok(PollStop::Full);
            }
            if *stop.borrow() {
                return Ok(PollStop::Cancelled);
            }
            if attempted && Instant::now() >= deadline {
                return Ok(PollStop::Deadline);
            }
            attempted = true;

            let message = match queue.try_take()? {
                Some(message) => message,
                None => {
                    let taken = tokio::select! {
                        biased;
                        _ = stop_requested(stop) => return Ok(PollStop::Cancelled),
                        taken = queue.take_until(deadline) => taken?,
                    };
                    match taken {
                        Some(message) => message,
                        None => return Ok(PollStop::Deadline),
                    }
                }
            };

            batch.push(Event::from_message(&message, &self.payload_key)?);
        }
    }
}

/// Resolve once the stop flag is raised. Never resolves if the sender is gone
/// without having raised it.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
