//! Convergence poller timing and error tolerance under a paused clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use commissioner_core::orchestration::{percent_complete, ConvergencePoller, PollBound};
use commissioner_core::{CommissionerError, Result};

const DELAY: Duration = Duration::from_secs(1);

#[tokio::test(start_paused = true)]
async fn test_converges_on_fourth_call_without_trailing_sleep() {
    let calls = Arc::new(AtomicU32::new(0));
    let progress = [0.0, 20.0, 55.0, 100.0];
    let poller = ConvergencePoller::new("WaitForDataMove", DELAY, PollBound::MaxAttempts(10));

    let started = Instant::now();
    let outcome = poller
        .poll(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    let call = calls.fetch_add(1, Ordering::SeqCst) as usize;
                    Ok::<f64, CommissionerError>(progress[call.min(progress.len() - 1)])
                }
            },
            percent_complete,
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.value, 100.0);
    // Three sleeps between four calls, none after the last
    assert_eq!(started.elapsed(), DELAY * 3);
}

#[tokio::test(start_paused = true)]
async fn test_error_tolerance_is_exceeded_on_third_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let poller = ConvergencePoller::new("WaitForLoadBalance", DELAY, PollBound::MaxAttempts(100))
        .with_error_tolerance(2);

    let err = poller
        .poll(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u64, _>(CommissionerError::RemoteUnavailable("connection reset".into()))
                }
            },
            |pending: &u64| *pending == 0,
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        CommissionerError::TooManyErrors {
            operation,
            errors,
            last_error,
        } => {
            assert_eq!(operation, "WaitForLoadBalance");
            assert_eq!(errors, 3);
            assert!(last_error.contains("connection reset"));
        }
        other => panic!("expected TooManyErrors, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_tolerated_errors_do_not_stop_convergence() {
    let calls = Arc::new(AtomicU32::new(0));
    let poller = ConvergencePoller::new("WaitForServerReady", DELAY, PollBound::MaxAttempts(10))
        .with_error_tolerance(2);

    let outcome = poller
        .poll(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err(CommissionerError::RemoteUnavailable("busy".into())),
                        _ => Ok(0u32),
                    }
                }
            },
            |not_running: &u32| *not_running == 0,
        )
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.errors, 2);
}

#[tokio::test(start_paused = true)]
async fn test_duration_bound_times_out_with_last_progress() {
    let poller = ConvergencePoller::new(
        "WaitForDataMove",
        DELAY,
        PollBound::MaxDuration(Duration::from_secs(5)),
    );

    let started = Instant::now();
    let err = poller
        .poll(|| async { Ok::<f64, CommissionerError>(42.5) }, percent_complete)
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_secs(5));
    match err {
        CommissionerError::Timeout { last_progress, .. } => {
            assert_eq!(last_progress.as_deref(), Some("42.5"));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

async fn always_idle() -> Result<u64> {
    Ok(0)
}

#[tokio::test(start_paused = true)]
async fn test_immediate_convergence_never_sleeps() {
    let poller = ConvergencePoller::new("WaitForLoadBalance", DELAY, PollBound::MaxAttempts(1));
    let started = Instant::now();
    let outcome = poller.poll(always_idle, |pending| *pending == 0).await.unwrap();
    assert_eq!(outcome.attempts, 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}
