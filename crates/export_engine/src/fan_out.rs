use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use export_core::{advance, BatchAction, BatchEvent, BatchPhase};
use export_logging::{export_debug, export_error, export_warn};
use futures_util::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Upper bound on in-flight item fetches; 0 is treated as 1.
    pub max_concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Returned when the caller's token fired before every id was admitted and
/// no fetch had failed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("batch cancelled before every item was fetched")]
pub struct Cancelled;

/// Resolves a set of ids into items with a bounded number of fetches in flight.
#[derive(Debug, Clone, Default)]
pub struct ConcurrentFetcher {
    settings: FetchSettings,
}

impl ConcurrentFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    pub fn max_concurrency(&self) -> usize {
        self.settings.max_concurrency.max(1)
    }

    /// Fetches every id with `fetch_one`, at most `max_concurrency` at a time.
    ///
    /// Items come back in completion order. The first error cancels the
    /// batch token, so ids still waiting for a slot are never started and
    /// in-flight fetches can stop early. The result stream is drained before
    /// returning: every fetch that started has finished by the time this
    /// returns, and only the first error is reported.
    ///
    /// The batch token is a child of `parent`. If `parent` fires while ids
    /// are still waiting for a slot and no fetch failed, the batch fails with
    /// [`Cancelled`].
    pub async fn fetch_all<T, E, F, Fut>(
        &self,
        parent: &CancellationToken,
        ids: &[String],
        fetch_one: F,
    ) -> Result<Vec<T>, E>
    where
        F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<Cancelled> + Send + 'static,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let limit = self.max_concurrency();
        let cancel = parent.child_token();
        let (result_tx, mut result_rx) = mpsc::channel(limit);
        export_debug!("fetching {} items, concurrency {}", ids.len(), limit);

        let producer = tokio::spawn(dispatch(
            ids.to_vec(),
            limit,
            Arc::new(fetch_one),
            cancel.clone(),
            result_tx,
        ));

        let mut phase = BatchPhase::Running;
        let mut items = Vec::with_capacity(ids.len());
        let mut failure = None;
        while !phase.is_terminal() {
            let received = result_rx.recv().await;
            let event = match &received {
                Some(Ok(_)) => BatchEvent::ItemFetched,
                Some(Err(_)) => BatchEvent::ItemFailed,
                None => BatchEvent::StreamClosed,
            };
            let (next, action) = advance(phase, event);
            phase = next;
            match (action, received) {
                (BatchAction::Collect, Some(Ok(item))) => items.push(item),
                (BatchAction::Cancel, Some(Err(err))) => {
                    export_warn!(
                        "item fetch failed after {} of {} items, cancelling batch",
                        items.len(),
                        ids.len()
                    );
                    cancel.cancel();
                    failure = Some(err);
                }
                _ => {}
            }
        }

        // The stream only closes once the producer and all its tasks have
        // dropped their senders, so this join does not block on fetches.
        let dispatched = match producer.await {
            Ok(dispatched) => dispatched,
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Err(_) => 0,
        };

        match failure {
            Some(err) => Err(err),
            None if dispatched < ids.len() => {
                export_warn!(
                    "batch cancelled after dispatching {} of {} items",
                    dispatched,
                    ids.len()
                );
                Err(E::from(Cancelled))
            }
            None => {
                export_debug!("batch {:?} with {} items", phase, items.len());
                Ok(items)
            }
        }
    }
}

/// Admits one task per id, in input order, as slots free up. Returns the
/// number of ids that were started.
///
/// A panicking fetch counts as the first failure: the batch token is
/// cancelled before its slot is released, the remaining tasks are joined,
/// and the panic is resumed afterwards.
async fn dispatch<T, E, F, Fut>(
    ids: Vec<String>,
    limit: usize,
    fetch_one: Arc<F>,
    cancel: CancellationToken,
    results: mpsc::Sender<Result<T, E>>,
) -> usize
where
    F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let slots = Arc::new(Semaphore::new(limit));
    let mut tasks = JoinSet::new();
    let mut dispatched = 0usize;

    for id in ids {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let fetch_one = Arc::clone(&fetch_one);
        let cancel = cancel.clone();
        let results = results.clone();
        tasks.spawn(async move {
            let token = cancel.clone();
            let outcome = AssertUnwindSafe(async move { (*fetch_one)(id, token).await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(result) => {
                    drop(permit);
                    let _ = results.send(result).await;
                }
                Err(payload) => {
                    cancel.cancel();
                    drop(permit);
                    panic::resume_unwind(payload);
                }
            }
        });
        dispatched += 1;
    }
    drop(results);

    let mut first_panic: Option<Box<dyn Any + Send>> = None;
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            if err.is_panic() && first_panic.is_none() {
                first_panic = Some(err.into_panic());
            }
        }
    }
    if let Some(payload) = first_panic {
        export_error!("item fetch panicked after {} items were started", dispatched);
        panic::resume_unwind(payload);
    }
    dispatched
}
