//! Bounded worker pool for independent per-item work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

/// Run `work` over every item with at most `concurrency` tasks in flight.
///
/// Results come back in input order. A task that panics yields its
/// `JoinError` in place so the caller can record a failed outcome for it.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    work: F,
) -> Vec<std::result::Result<R, JoinError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let work = Arc::new(work);

    let mut tasks = AbortOnDrop(Vec::with_capacity(items.len()));
    for item in items {
        let sem = semaphore.clone();
        let work = work.clone();
        tasks.0.push(tokio::spawn(async move {
            // The semaphore lives as long as this function and is never closed.
            let _permit = sem.acquire_owned().await.ok();
            work(item).await
        }));
    }

    let mut results = Vec::with_capacity(tasks.0.len());
    for handle in tasks.0.iter_mut() {
        results.push(handle.await);
    }
    results
}

/// Aborts unfinished tasks when the pool future is dropped (phase budget hit).
struct AbortOnDrop<R>(Vec<JoinHandle<R>>);

impl<R> Drop for AbortOnDrop<R> {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}
