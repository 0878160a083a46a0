pub mod accumulator;
pub mod counter;
pub mod error;
pub mod message;
pub mod poller;
pub mod queue;
pub mod runner;
pub mod sink;
pub mod source;

pub use accumulator::BatchAccumulator;
pub use counter::{CounterSnapshot, FailureRecord, SourceCounter};
pub use error::{CycleError, FailureKind, QueueError, SinkError, SourceError};
pub use message::{Event, QueueMessage};
pub use poller::{BoundedPoller, PollStop};
pub use queue::{channel, ChannelQueue, MessageQueue, QueueProducer};
pub use runner::{RunStats, SourceRunner};
pub use sink::{BatchSink, ChannelSink};
pub use source::{PollableSource, Status, StopHandle};
