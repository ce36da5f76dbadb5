use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use export_engine::{
    Cancelled, CancellationToken, ConcurrentFetcher, FetchSettings, DEFAULT_MAX_CONCURRENCY,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TestError {
    Boom(String),
    Cancelled,
}

impl From<Cancelled> for TestError {
    fn from(_: Cancelled) -> Self {
        TestError::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    id: String,
}

#[derive(Default)]
struct Gauge {
    started: AtomicUsize,
    finished: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("id-{i}")).collect()
}

fn fetcher(max_concurrency: usize) -> ConcurrentFetcher {
    ConcurrentFetcher::new(FetchSettings { max_concurrency })
}

#[test]
fn default_concurrency_is_ten() {
    assert_eq!(FetchSettings::default().max_concurrency, 10);
    assert_eq!(DEFAULT_MAX_CONCURRENCY, 10);
    assert_eq!(fetcher(0).max_concurrency(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetches_every_id_exactly_once() {
    let input = ids(37);
    let gauge = Arc::new(Gauge::default());
    let cancel = CancellationToken::new();

    let fetch_gauge = Arc::clone(&gauge);
    let records = fetcher(DEFAULT_MAX_CONCURRENCY)
        .fetch_all(&cancel, &input, move |id, _token| {
            let gauge = Arc::clone(&fetch_gauge);
            async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(2)).await;
                gauge.leave();
                Ok::<_, TestError>(Record { id })
            }
        })
        .await
        .expect("batch ok");

    assert_eq!(records.len(), input.len());
    let fetched: HashSet<_> = records.into_iter().map(|r| r.id).collect();
    let expected: HashSet<_> = input.iter().cloned().collect();
    assert_eq!(fetched, expected);
    assert_eq!(gauge.started.load(Ordering::SeqCst), 37);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_exceeds_max_concurrency() {
    for limit in [1, 2, 3] {
        let gauge = Arc::new(Gauge::default());
        let cancel = CancellationToken::new();

        let fetch_gauge = Arc::clone(&gauge);
        let records = fetcher(limit)
            .fetch_all(&cancel, &ids(20), move |id, _token| {
                let gauge = Arc::clone(&fetch_gauge);
                async move {
                    gauge.enter();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    gauge.leave();
                    Ok::<_, TestError>(Record { id })
                }
            })
            .await
            .expect("batch ok");

        assert_eq!(records.len(), 20);
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= limit, "peak {peak} exceeded limit {limit}");
        assert!(peak >= 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_slot_completes_in_input_order() {
    let input = ids(8);
    let cancel = CancellationToken::new();

    let records = fetcher(1)
        .fetch_all(&cancel, &input, |id, _token| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok::<_, TestError>(Record { id })
        })
        .await
        .expect("batch ok");

    let order: Vec<_> = records.into_iter().map(|r| r.id).collect();
    assert_eq!(order, input);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_ids_never_call_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let fetch_calls = Arc::clone(&calls);
    let records = fetcher(4)
        .fetch_all(&cancel, &[], move |id, _token| {
            fetch_calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, TestError>(Record { id }) }
        })
        .await
        .expect("batch ok");

    assert!(records.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_error_fails_batch_and_waits_for_started_fetches() {
    let input = ids(50);
    let gauge = Arc::new(Gauge::default());
    let cancel = CancellationToken::new();

    let fetch_gauge = Arc::clone(&gauge);
    let err = fetcher(4)
        .fetch_all(&cancel, &input, move |id, token| {
            let gauge = Arc::clone(&fetch_gauge);
            async move {
                gauge.enter();
                let result = if id == "id-5" {
                    Err(TestError::Boom(id.clone()))
                } else {
                    tokio::select! {
                        _ = token.cancelled() => Err(TestError::Cancelled),
                        _ = tokio::time::sleep(Duration::from_millis(20)) => Ok(Record { id }),
                    }
                };
                gauge.leave();
                result
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err, TestError::Boom("id-5".to_string()));
    let started = gauge.started.load(Ordering::SeqCst);
    assert_eq!(started, gauge.finished.load(Ordering::SeqCst));
    assert!(started < input.len(), "admission kept going: {started} started");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_fetches_observe_batch_cancellation() {
    let cancelled_seen = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let seen = Arc::clone(&cancelled_seen);
    let err = fetcher(3)
        .fetch_all(&cancel, &ids(3), move |id, token| {
            let seen = Arc::clone(&seen);
            async move {
                if id == "id-0" {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    return Err(TestError::Boom(id));
                }
                token.cancelled().await;
                seen.fetch_add(1, Ordering::SeqCst);
                Err::<Record, _>(TestError::Cancelled)
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err, TestError::Boom("id-0".to_string()));
    assert_eq!(cancelled_seen.load(Ordering::SeqCst), 2);
    assert!(!cancel.is_cancelled(), "batch cancellation must not leak to the caller");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn caller_cancellation_stops_admission() {
    let input = ids(10);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancellationToken::new();

    let fetch_calls = Arc::clone(&calls);
    let caller = cancel.clone();
    let result = fetcher(1)
        .fetch_all(&cancel, &input, move |id, _token| {
            fetch_calls.lock().unwrap().push(id.clone());
            let caller = caller.clone();
            async move {
                if id == "id-1" {
                    caller.cancel();
                }
                Ok::<_, TestError>(Record { id })
            }
        })
        .await;

    assert_eq!(result.unwrap_err(), TestError::Cancelled);
    let calls = calls.lock().unwrap();
    assert!(calls.len() < input.len());
    assert_eq!(calls[..2].to_vec(), vec!["id-0".to_string(), "id-1".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_fetch_stops_admission_and_is_reraised() {
    let gauge = Arc::new(Gauge::default());
    let fetch_gauge = Arc::clone(&gauge);
    let batch = tokio::spawn(async move {
        fetcher(1)
            .fetch_all(&CancellationToken::new(), &ids(20), move |id, _token| {
                let gauge = Arc::clone(&fetch_gauge);
                async move {
                    gauge.enter();
                    if id == "id-0" {
                        panic!("fetch blew up");
                    }
                    gauge.leave();
                    Ok::<_, TestError>(Record { id })
                }
            })
            .await
    });

    let err = batch.await.unwrap_err();
    assert!(err.is_panic());
    let payload = err.into_panic();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"fetch blew up"));
    assert_eq!(gauge.started.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panic_lets_in_flight_fetches_finish() {
    let gauge = Arc::new(Gauge::default());
    let fetch_gauge = Arc::clone(&gauge);
    let batch = tokio::spawn(async move {
        fetcher(3)
            .fetch_all(&CancellationToken::new(), &ids(10), move |id, token| {
                let gauge = Arc::clone(&fetch_gauge);
                async move {
                    gauge.enter();
                    if id == "id-0" {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        panic!("fetch blew up");
                    }
                    token.cancelled().await;
                    gauge.leave();
                    Err::<Record, _>(TestError::Cancelled)
                }
            })
            .await
    });

    assert!(batch.await.unwrap_err().is_panic());
    assert_eq!(gauge.started.load(Ordering::SeqCst), 3);
    assert_eq!(gauge.finished.load(Ordering::SeqCst), 2);
}
