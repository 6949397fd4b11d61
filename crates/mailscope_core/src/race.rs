//! Race-to-first-success over a set of candidates
//!
//! One task is spawned per candidate. The first task whose probe yields a
//! value publishes it into a single-slot channel and cancels the shared
//! token; later finishers find the slot taken (or closed) and their values
//! are dropped. Cancellation is cooperative: a task checks the token before
//! it starts probing, and a probe already in flight runs to completion.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Run `probe` for every candidate concurrently and return the first value
/// any of them produced, or `None` once every candidate came up empty.
///
/// The race uses a child of `parent`, so cancelling the parent stops workers
/// that have not started yet, while a winner only cancels its own race.
/// A panicking probe is confined to its task and counts as a miss.
pub async fn race<C, T, F, Fut>(
    candidates: impl IntoIterator<Item = C>,
    parent: &CancellationToken,
    probe: F,
) -> Option<T>
where
    C: Send + 'static,
    T: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
{
    let cancel = parent.child_token();
    let probe = Arc::new(probe);
    let (slot, mut winner) = mpsc::channel::<T>(1);
    let mut workers = JoinSet::new();

    for candidate in candidates {
        let slot = slot.clone();
        let cancel = cancel.clone();
        let probe = Arc::clone(&probe);
        workers.spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            if let Some(found) = probe(candidate).await {
                // Only the first sender fits in the slot.
                if slot.try_send(found).is_ok() {
                    cancel.cancel();
                }
            }
        });
    }
    // Every worker owns a sender; the channel reports closed once all exit.
    drop(slot);

    let result = winner.recv().await;
    winner.close();

    if result.is_some() {
        debug!("Race decided, {} worker(s) left to finish unobserved", workers.len());
        workers.detach_all();
    } else {
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    warn!("Race worker panicked: {}", err);
                }
            }
        }
    }

    result
}
