//! Bounded worker pool scoped to a single phase.
//!
//! Each phase builds its own pool and joins it fully before returning, so
//! no task outlives the phase that spawned it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// What a pool run produced.
#[derive(Debug)]
pub struct PoolOutcome<T> {
    /// Results of every dispatched job, in input order
    pub completed: Vec<T>,
    /// Jobs never started because a result halted dispatch
    pub not_dispatched: usize,
    pub halted: bool,
}

/// Run `job` over `items` with at most `workers` in flight.
///
/// When a finished job satisfies `halts`, dispatch stops. Jobs already
/// running are left to finish and their results are still returned.
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    workers: usize,
    job: F,
    halts: fn(&T) -> bool,
) -> Result<PoolOutcome<T>, JoinError>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let halted = Arc::new(AtomicBool::new(false));
    let mut set = JoinSet::new();
    let mut dispatched = 0usize;

    for (index, item) in items.into_iter().enumerate() {
        if halted.load(Ordering::SeqCst) {
            break;
        }
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        // A job may have halted the pool while we waited for the permit.
        if halted.load(Ordering::SeqCst) {
            break;
        }

        dispatched += 1;
        let fut = job(item);
        let halted = halted.clone();
        set.spawn(async move {
            let _permit = permit;
            let out = fut.await;
            if halts(&out) {
                halted.store(true, Ordering::SeqCst);
            }
            (index, out)
        });
    }

    let mut completed = Vec::with_capacity(dispatched);
    while let Some(joined) = set.join_next().await {
        completed.push(joined?);
    }
    completed.sort_by_key(|(index, _)| *index);

    Ok(PoolOutcome {
        completed: completed.into_iter().map(|(_, out)| out).collect(),
        not_dispatched: total - dispatched,
        halted: halted.load(Ordering::SeqCst),
    })
}
