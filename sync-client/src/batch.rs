//! Rate-limited batch execution.
//!
//! [`BatchExecutor::process_batch`] runs an async processor over a list in
//! consecutive chunks. Items within a chunk run concurrently; a chunk starts
//! only after the previous one has settled and a fixed delay has elapsed.
//! The first error aborts the whole call.
//!
//! [`BatchExecutor::process_all`] does the same with the executor's default
//! chunk size, taken from `[batch] default_size` when built from config.

use crate::config::BatchConfig;
use chatsync_core::chunk_ranges;
use futures_util::future::try_join_all;
use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::debug;

/// Chunked, delayed executor for bulk async work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchExecutor {
    delay: Duration,
    default_size: NonZeroUsize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl BatchExecutor {
    /// Pause between chunks when none is configured.
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

    /// Chunk size for [`process_all`](Self::process_all) when none is configured.
    pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(10) {
        Some(size) => size,
        None => NonZeroUsize::MIN,
    };

    /// Create an executor pausing `delay` between chunks.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            default_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Create an executor from the `[batch]` configuration section.
    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.delay()).with_default_size(config.size())
    }

    /// Use `size` as the chunk size of [`process_all`](Self::process_all).
    pub fn with_default_size(mut self, size: NonZeroUsize) -> Self {
        self.default_size = size;
        self
    }

    /// Pause between chunks.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Chunk size used by [`process_all`](Self::process_all).
    pub fn default_batch_size(&self) -> NonZeroUsize {
        self.default_size
    }

    /// Apply `processor` to every item, `batch_size` at a time.
    ///
    /// Results come back in input order. The delay is slept between chunks
    /// only, never before the first or after the last. On the first error
    /// the remaining work is dropped and that error is returned; no partial
    /// results are produced.
    pub async fn process_batch<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        processor: F,
        batch_size: NonZeroUsize,
    ) -> Result<Vec<R>, E>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut remaining = items.into_iter();

        for (index, range) in chunk_ranges(total, batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.delay).await;
            }
            debug!(
                chunk = index,
                start = range.start,
                len = range.len(),
                "processing chunk"
            );

            let chunk = remaining.by_ref().take(range.len());
            results.extend(try_join_all(chunk.map(&processor)).await?);
        }

        Ok(results)
    }

    /// [`process_batch`](Self::process_batch) with the executor's default
    /// chunk size.
    pub async fn process_all<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        processor: F,
    ) -> Result<Vec<R>, E>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.process_batch(items, processor, self.default_size)
            .await
    }
}
