//! Bounded worker pool
//!
//! Runs at most `limit` units of work concurrently and returns each unit's
//! result in its input slot regardless of completion order. The sync engine
//! itself is strictly sequential; callers use this helper when fanning out
//! over many files (e.g. ingesting a batch).

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Run `worker` over `items` with at most `limit` in flight
///
/// Results come back in input order. A `limit` of zero is treated as one.
pub async fn run_bounded<T, F, Fut, R>(limit: usize, items: Vec<T>, worker: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items.into_iter().map(worker))
        .buffered(limit.max(1))
        .collect()
        .await
}
