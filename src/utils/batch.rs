// src/utils/batch.rs

//! Batched async fan-out.
//!
//! Partitions a collection into fixed-size groups, runs an async action
//! concurrently across each group, and pauses between groups. Per-item
//! failures are settled into the result vector instead of aborting the
//! batch: the contract is "attempt everything, stop for no single failure."

use std::future::Future;
use std::time::Duration;

use futures::future;

/// Run `action` over `items` in consecutive batches of `batch_size`.
///
/// Within a batch all actions run concurrently and every one is awaited
/// to completion before the next batch starts. `delay_between_batches`
/// applies between batches, not after the last one. Results come back in
/// input order.
pub async fn run_batched<T, O, E, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    delay_between_batches: Duration,
    action: F,
) -> Vec<std::result::Result<O, E>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = std::result::Result<O, E>>,
{
    let size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut iter = items.into_iter().peekable();

    while iter.peek().is_some() {
        let batch: Vec<T> = iter.by_ref().take(size).collect();
        let settled = future::join_all(batch.into_iter().map(&action)).await;
        results.extend(settled);

        if iter.peek().is_some() && !delay_between_batches.is_zero() {
            tokio::time::sleep(delay_between_batches).await;
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_every_item_is_attempted() {
        let attempted = AtomicUsize::new(0);
        let results = run_batched(
            (0..7).collect::<Vec<_>>(),
            3,
            Duration::ZERO,
            |n| {
                let attempted = &attempted;
                async move {
                    attempted.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(n * 2)
                }
            },
        )
        .await;

        assert_eq!(attempted.load(Ordering::SeqCst), 7);
        assert_eq!(results.len(), 7);
        assert_eq!(results[3].as_ref().unwrap(), &6);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let results = run_batched(
            vec![1, 2, 3, 4],
            2,
            Duration::ZERO,
            |n| async move {
                if n == 2 {
                    Err("boom")
                } else {
                    Ok(n)
                }
            },
        )
        .await;

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert!(results[3].is_ok());
    }

    #[tokio::test]
    async fn test_batch_members_run_together() {
        // With batch_size 2, both members of a batch must be in flight
        // before either completes.
        let in_flight = Mutex::new((0usize, 0usize)); // (current, peak)
        let results = run_batched(
            vec![(), (), (), ()],
            2,
            Duration::ZERO,
            |_| async {
                {
                    let mut guard = in_flight.lock().unwrap();
                    guard.0 += 1;
                    guard.1 = guard.1.max(guard.0);
                }
                tokio::task::yield_now().await;
                in_flight.lock().unwrap().0 -= 1;
                Ok::<_, ()>(())
            },
        )
        .await;

        assert_eq!(results.len(), 4);
        assert!(in_flight.lock().unwrap().1 >= 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results =
            run_batched(Vec::<u8>::new(), 3, Duration::ZERO, |n| async move {
                Ok::<_, ()>(n)
            })
            .await;
        assert!(results.is_empty());
    }
}
