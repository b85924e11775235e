//! Bounded-concurrency batch execution
//!
//! Runs an async transform over an ordered sequence of inputs in contiguous
//! chunks: chunks are processed strictly in sequence, items within a chunk
//! concurrently. Peak concurrency is therefore capped at exactly the chunk
//! size, and a straggler in one chunk delays the next (chunk-boundary
//! backpressure). Output positions always align with input positions,
//! regardless of completion order within a chunk.

use std::future::Future;

use futures::future::join_all;
use playbill_common::{PlaybillError, Result};

/// Default number of transforms allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Chunked bounded-concurrency mapper.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    concurrency: usize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl BatchExecutor {
    /// Create an executor with the given concurrency limit.
    ///
    /// A limit of 1 degenerates to strictly sequential processing; a limit of
    /// 0 is rejected.
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(PlaybillError::Config(
                "batch concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self { concurrency })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Apply `transform` to every item, returning one tagged outcome per
    /// item, positionally aligned with the input.
    ///
    /// Every chunk runs to completion even when some of its items fail; the
    /// caller decides how to compose the per-item outcomes.
    pub async fn execute<I, T, E, F, Fut>(
        &self,
        items: Vec<I>,
        transform: F,
    ) -> Vec<std::result::Result<T, E>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut outcomes = Vec::with_capacity(items.len());
        let mut remaining = items.into_iter();
        loop {
            let chunk: Vec<I> = remaining.by_ref().take(self.concurrency).collect();
            if chunk.is_empty() {
                break;
            }
            outcomes.extend(join_all(chunk.into_iter().map(&transform)).await);
        }
        outcomes
    }

    /// Fail-fast composition over [`execute`]'s chunk mechanics.
    ///
    /// The chunk containing a failure still runs to completion, then the
    /// first error (in input order) aborts before the next chunk starts.
    pub async fn try_execute<I, T, E, F, Fut>(
        &self,
        items: Vec<I>,
        transform: F,
    ) -> std::result::Result<Vec<T>, E>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut results = Vec::with_capacity(items.len());
        let mut remaining = items.into_iter();
        loop {
            let chunk: Vec<I> = remaining.by_ref().take(self.concurrency).collect();
            if chunk.is_empty() {
                break;
            }
            for outcome in join_all(chunk.into_iter().map(&transform)).await {
                results.push(outcome?);
            }
        }
        Ok(results)
    }
}
