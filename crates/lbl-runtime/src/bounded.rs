use std::collections::BTreeSet;
use std::future::Future;

use tokio::task::JoinSet;
use tracing::warn;

/// Runs `f(index, item)` for every item with at most `limit` tasks in flight.
///
/// Items queue in input order and start as slots free up. Every input index appears exactly
/// once in the output, in completion order; `None` marks a task that panicked or was cancelled.
/// A `limit` of 0 is treated as 1.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<(usize, Option<R>)>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let limit = limit.max(1);
    let mut out: Vec<(usize, Option<R>)> = Vec::with_capacity(items.len());
    let mut queue = items.into_iter().enumerate();
    let mut pending: BTreeSet<usize> = BTreeSet::new();
    let mut joinset: JoinSet<(usize, R)> = JoinSet::new();

    loop {
        while joinset.len() < limit {
            let Some((index, item)) = queue.next() else {
                break;
            };
            pending.insert(index);
            let fut = f(index, item);
            joinset.spawn(async move { (index, fut.await) });
        }

        let Some(joined) = joinset.join_next().await else {
            break;
        };
        match joined {
            Ok((index, r)) => {
                pending.remove(&index);
                out.push((index, Some(r)));
            }
            Err(err) => warn!(?err, "bounded task did not complete"),
        }
    }

    out.extend(pending.into_iter().map(|index| (index, None)));
    out
}
