//! Batch Processor
//!
//! Buffers items and flushes them as a batch when the buffer reaches
//! `batch_size` or when `flush_interval` has elapsed since the last flush,
//! whichever comes first. Used to decouple bursty producers (fill reports,
//! status snapshots) from slower downstream consumers.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Downstream consumer of flushed batches. Errors are logged and isolated;
/// a failing sink never blocks further buffering.
#[async_trait]
pub trait BatchSink<T>: Send + Sync {
    async fn process_batch(&self, items: Vec<T>) -> anyhow::Result<()>;
}

struct Shared<T> {
    buffer: Mutex<Vec<T>>,
    last_flush: Mutex<Instant>,
    batch_size: usize,
    sink: Arc<dyn BatchSink<T>>,
}

impl<T: Send + 'static> Shared<T> {
    /// Swap the buffer out atomically with respect to concurrent `add`,
    /// then hand the whole slice to the sink in one call.
    async fn flush(&self) {
        let items = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            if buffer.is_empty() {
                *self.last_flush.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
                return;
            }
            std::mem::take(&mut *buffer)
        };
        *self.last_flush.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();

        let count = items.len();
        if let Err(e) = self.sink.process_batch(items).await {
            tracing::warn!("Batch sink failed for {} item(s): {:#}", count, e);
        }
    }
}

/// Size-or-time batching buffer with a background interval flusher
pub struct BatchProcessor<T> {
    shared: Arc<Shared<T>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> BatchProcessor<T> {
    pub fn new(batch_size: usize, flush_interval: Duration, sink: Arc<dyn BatchSink<T>>) -> Self {
        let shared = Arc::new(Shared {
            buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
            batch_size: batch_size.max(1),
            sink,
        });

        let ticker = {
            let shared = Arc::clone(&shared);
            // Check at a fraction of the interval so a time-triggered flush
            // lands close to the deadline
            let tick = flush_interval.checked_div(4).unwrap_or(flush_interval);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    let due = {
                        let last = *shared.last_flush.lock().unwrap_or_else(|e| e.into_inner());
                        Instant::now().duration_since(last) >= flush_interval
                    };
                    let non_empty = !shared
                        .buffer
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .is_empty();
                    if due && non_empty {
                        shared.flush().await;
                    }
                }
            })
        };

        Self {
            shared,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    /// Buffer an item; triggers an immediate flush once the buffer reaches
    /// the configured batch size.
    pub async fn add(&self, item: T) {
        let should_flush = {
            let mut buffer = self.shared.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.push(item);
            buffer.len() >= self.shared.batch_size
        };
        if should_flush {
            self.shared.flush().await;
        }
    }

    /// Number of items currently buffered
    pub fn buffered(&self) -> usize {
        self.shared
            .buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Force an out-of-band flush of whatever is buffered
    pub async fn flush(&self) {
        self.shared.flush().await;
    }

    /// Stop the background ticker and flush any remaining items so nothing
    /// buffered is lost at shutdown.
    pub async fn stop(&self) {
        let ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        self.shared.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<u32>>>,
    }

    #[async_trait]
    impl BatchSink<u32> for RecordingSink {
        async fn process_batch(&self, items: Vec<u32>) -> anyhow::Result<()> {
            self.batches
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(items);
            Ok(())
        }
    }

    impl RecordingSink {
        fn batches(&self) -> Vec<Vec<u32>> {
            self.batches
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_triggered_flush() {
        let sink = Arc::new(RecordingSink::default());
        let processor = BatchProcessor::new(3, Duration::from_secs(60), sink.clone());

        processor.add(1).await;
        processor.add(2).await;
        assert!(sink.batches().is_empty());

        processor.add(3).await;
        assert_eq!(sink.batches(), vec![vec![1, 2, 3]]);
        assert_eq!(processor.buffered(), 0);

        processor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_triggered_flush() {
        let sink = Arc::new(RecordingSink::default());
        let processor = BatchProcessor::new(100, Duration::from_secs(2), sink.clone());

        processor.add(7).await;
        processor.add(8).await;
        assert!(sink.batches().is_empty());

        // Waiting past the interval produces exactly one flush with the
        // short buffer
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.batches(), vec![vec![7, 8]]);

        processor.stop().await;
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_flush() {
        let sink = Arc::new(RecordingSink::default());
        let processor = BatchProcessor::new(100, Duration::from_secs(60), sink.clone());

        processor.add(1).await;
        processor.flush().await;
        assert_eq!(sink.batches(), vec![vec![1]]);

        // Empty flush is a no-op, not an empty batch
        processor.flush().await;
        assert_eq!(sink.batches().len(), 1);

        processor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_remainder() {
        let sink = Arc::new(RecordingSink::default());
        let processor = BatchProcessor::new(100, Duration::from_secs(60), sink.clone());

        processor.add(5).await;
        processor.add(6).await;
        processor.stop().await;

        assert_eq!(sink.batches(), vec![vec![5, 6]]);
    }

    struct FailingSink;

    #[async_trait]
    impl BatchSink<u32> for FailingSink {
        async fn process_batch(&self, _items: Vec<u32>) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_does_not_poison_buffer() {
        let processor = BatchProcessor::new(2, Duration::from_secs(60), Arc::new(FailingSink));

        processor.add(1).await;
        processor.add(2).await;
        // Failed batch is dropped after logging; buffering continues
        assert_eq!(processor.buffered(), 0);
        processor.add(3).await;
        assert_eq!(processor.buffered(), 1);

        processor.stop().await;
    }
}
