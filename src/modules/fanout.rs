use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::search::{ModuleError, ModuleResult};

/// Outcome of a bounded fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutSummary {
    pub total: usize,
    pub completed: usize,
    /// The callback asked to stop before every probe had finished
    pub stopped_early: bool,
}

/// Run `probe` over `items` with at most `limit` probes in flight.
///
/// Probes run on a child of `token`: cancelling the search, or `on_result`
/// returning `Break`, stops probes that have not acquired a permit yet and
/// drops in-flight ones. `on_result` is called on the caller's task with the
/// number of finished probes and the probe's output, in completion order.
pub async fn fan_out<I, T, F, Fut, C>(
    token: &CancellationToken,
    limit: usize,
    items: Vec<I>,
    probe: F,
    mut on_result: C,
) -> ModuleResult<FanOutSummary>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
    C: FnMut(usize, Option<T>) -> ControlFlow<()>,
{
    let total = items.len();
    let lane = token.child_token();
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let probe = Arc::new(probe);
    let mut set = JoinSet::new();

    for item in items {
        let lane = lane.clone();
        let semaphore = semaphore.clone();
        let probe = probe.clone();

        set.spawn(async move {
            if lane.is_cancelled() {
                return None;
            }
            let _permit = tokio::select! {
                _ = lane.cancelled() => return None,
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return None,
                },
            };
            // Cancelled while queued for a permit
            if lane.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = lane.cancelled() => None,
                output = probe(item) => output,
            }
        });
    }

    let mut completed = 0;
    let mut stopped_early = false;
    while let Some(joined) = set.join_next().await {
        completed += 1;
        let output = match joined {
            Ok(output) => output,
            Err(e) => {
                if e.is_panic() {
                    warn!("Fan-out probe panicked: {}", e);
                }
                None
            }
        };

        if stopped_early || token.is_cancelled() {
            continue;
        }
        if on_result(completed, output).is_break() {
            debug!("Fan-out stopped early after {} of {} probes", completed, total);
            stopped_early = true;
            lane.cancel();
        }
    }

    if token.is_cancelled() {
        return Err(ModuleError::Cancelled);
    }

    Ok(FanOutSummary {
        total,
        completed,
        stopped_early,
    })
}
