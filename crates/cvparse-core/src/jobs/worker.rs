//! Groups incoming notification messages into batches.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// Batch window for the batch worker.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum messages per batch (the queue's batch size)
    pub max_size: usize,
    /// Maximum time to hold a partial batch after its first message
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_wait: Duration::from_secs(1),
        }
    }
}

/// Collects items into batches by size or by age of the oldest item.
pub struct Batcher<T> {
    rx: mpsc::Receiver<T>,
    config: BatchConfig,
    buffer: Vec<T>,
    deadline: Option<Instant>,
}

impl<T> Batcher<T> {
    pub fn new(rx: mpsc::Receiver<T>, config: BatchConfig) -> Self {
        let capacity = config.max_size.max(1);
        Self {
            rx,
            config,
            buffer: Vec::with_capacity(capacity),
            deadline: None,
        }
    }

    /// Next batch, once it is full, once its window has elapsed, or once
    /// the channel closes with items left.
    ///
    /// Returns `None` when the channel is closed and drained.
    pub async fn next_batch(&mut self) -> Option<Vec<T>> {
        loop {
            let remaining = self
                .deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::MAX);

            tokio::select! {
                biased;

                _ = tokio::time::sleep(remaining), if self.deadline.is_some() => {
                    self.deadline = None;
                    if !self.buffer.is_empty() {
                        return Some(self.flush());
                    }
                }

                item = self.rx.recv() => match item {
                    Some(item) => {
                        if self.buffer.is_empty() {
                            self.deadline = Some(Instant::now() + self.config.max_wait);
                        }
                        self.buffer.push(item);
                        if self.buffer.len() >= self.config.max_size {
                            return Some(self.flush());
                        }
                    }
                    None => {
                        return (!self.buffer.is_empty()).then(|| self.flush());
                    }
                }
            }
        }
    }

    fn flush(&mut self) -> Vec<T> {
        self.deadline = None;
        std::mem::take(&mut self.buffer)
    }
}
