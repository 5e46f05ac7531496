use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_work(
    runs: &Arc<AtomicUsize>,
    value: &'static str,
) -> impl FnOnce() -> std::future::Ready<&'static str> + Send + 'static {
    let runs = Arc::clone(runs);
    move || {
        runs.fetch_add(1, Ordering::SeqCst);
        std::future::ready(value)
    }
}

#[tokio::test(start_paused = true)]
async fn back_to_back_requests_execute_only_the_latest() {
    let debouncer = Debouncer::new(Duration::from_millis(300)).expect("runtime");
    let runs = Arc::new(AtomicUsize::new(0));

    let r1 = debouncer.debounce(counting_work(&runs, "r1"));
    let r2 = debouncer.debounce(counting_work(&runs, "r2"));
    let r3 = debouncer.debounce(counting_work(&runs, "r3"));
    tokio::time::advance(Duration::from_millis(300)).await;

    assert_eq!(r1.await, DebounceOutcome::Superseded);
    assert_eq!(r2.await, DebounceOutcome::Superseded);
    assert_eq!(r3.await, DebounceOutcome::Executed("r3"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!debouncer.is_pending());
}

#[tokio::test(start_paused = true)]
async fn empty_result_is_distinct_from_superseded() {
    let debouncer = Debouncer::new(Duration::from_millis(50)).expect("runtime");

    let first = debouncer.debounce(|| async { Some(1) });
    let second = debouncer.debounce(|| async { None::<u32> });

    let first = first.await;
    let second = second.await;
    assert!(first.is_superseded());
    assert_eq!(second, DebounceOutcome::Executed(None));
    assert_ne!(second, DebounceOutcome::Superseded);
}

#[tokio::test(start_paused = true)]
async fn request_in_a_later_window_runs_again() {
    let debouncer = Debouncer::new(Duration::from_millis(100)).expect("runtime");
    let runs = Arc::new(AtomicUsize::new(0));

    let first = debouncer.debounce(counting_work(&runs, "first"));
    assert_eq!(first.await, DebounceOutcome::Executed("first"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let second = debouncer.debounce(counting_work(&runs, "second"));
    assert_eq!(second.await, DebounceOutcome::Executed("second"));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn each_request_rearms_the_window() {
    let debouncer = Debouncer::new(Duration::from_millis(100)).expect("runtime");
    let runs = Arc::new(AtomicUsize::new(0));
    let started = tokio::time::Instant::now();

    let mut handles = Vec::new();
    for value in ["a", "b", "c", "d"] {
        handles.push(debouncer.debounce(counting_work(&runs, value)));
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
    let last = handles.pop().expect("last handle");
    assert_eq!(last.await, DebounceOutcome::Executed("d"));
    for handle in handles {
        assert!(handle.await.is_superseded());
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_millis(280));
}

#[tokio::test(start_paused = true)]
async fn cancel_supersedes_without_running_work() {
    let debouncer = Debouncer::new(Duration::from_millis(200)).expect("runtime");
    let runs = Arc::new(AtomicUsize::new(0));

    let pending = debouncer.debounce(counting_work(&runs, "never"));
    assert!(debouncer.is_pending());
    debouncer.cancel();
    assert!(!debouncer.is_pending());

    assert_eq!(pending.await, DebounceOutcome::Superseded);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn clones_share_one_slot() {
    let debouncer = Debouncer::new(Duration::from_millis(50)).expect("runtime");
    let clone = debouncer.clone();

    let first = debouncer.debounce(|| async { 1 });
    let second = clone.debounce(|| async { 2 });
    assert!(second.ordinal() > first.ordinal());

    assert_eq!(first.await, DebounceOutcome::Superseded);
    assert_eq!(second.await, DebounceOutcome::Executed(2));
}

#[tokio::test]
async fn window_comes_from_settings() {
    let settings = RuntimeSettings {
        debounce_window_ms: 75,
        ..RuntimeSettings::default()
    };
    let debouncer = Debouncer::from_settings(&settings).expect("runtime");
    assert_eq!(debouncer.window(), Duration::from_millis(75));
}

#[test]
fn construction_outside_a_runtime_is_an_error() {
    let result = Debouncer::new(Duration::from_millis(10));
    assert!(matches!(result, Err(RuntimeError::NoRuntime(_))));
}

#[test]
fn requests_from_a_thread_outside_the_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("build runtime");
    let debouncer = Debouncer::with_runtime(Duration::from_millis(20), runtime.handle().clone());

    let requester = debouncer.clone();
    let (first, second) = std::thread::spawn(move || {
        let first = requester.debounce(|| async { "first" });
        let second = requester.debounce(|| async { "second" });
        (first, second)
    })
    .join()
    .expect("requesting thread");

    assert_eq!(runtime.block_on(first), DebounceOutcome::Superseded);
    assert_eq!(runtime.block_on(second), DebounceOutcome::Executed("second"));
    assert!(!debouncer.is_pending());
}

fn crashing_lookup() -> u32 {
    panic!("lookup crashed");
}

#[tokio::test(start_paused = true)]
async fn panicking_work_is_not_reported_as_superseded() {
    let debouncer = Debouncer::new(Duration::from_millis(50)).expect("runtime");

    let handle = debouncer.debounce(|| async { crashing_lookup() });
    let outcome = AssertUnwindSafe(handle).catch_unwind().await;

    let payload = outcome.expect_err("panic resumed in the waiter");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"lookup crashed"));
    assert!(!debouncer.is_pending());
}

#[test]
fn outcome_helpers() {
    assert_eq!(DebounceOutcome::Executed(3).executed(), Some(3));
    assert_eq!(DebounceOutcome::<u32>::Superseded.executed(), None);
}
