//! Background Workers
//!
//! Decoupled background execution: a bounded worker pool for fire-and-forget
//! tasks and a size-or-time batching buffer for downstream sinks.

pub mod batch_processor;
pub mod task_queue;

pub use batch_processor::{BatchProcessor, BatchSink};
pub use task_queue::{QueuePolicy, TaskQueue, TaskQueueError};
