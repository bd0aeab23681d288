//! Queue broker: the contract and the in-process implementation.

mod broker;
mod memory;
mod types;

pub use broker::{JobHandler, NullListener, QueueBroker, QueueListener};
pub use memory::MemoryBroker;
pub use types::{EnqueueOptions, QueueCounts, QueueError, QueuedJob, WorkerError};
