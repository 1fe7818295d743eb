use librunpod::{
    error::{Error, Result},
    job::{poll::PollState, Job},
    prelude::Poller,
};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(5);

fn status(tag: &str) -> Result<Job> {
    return Ok(Job::with_status(tag));
}

fn poller(max_attempts: u32) -> Poller {
    return Poller::new().interval(INTERVAL).max_attempts(max_attempts);
}

#[tokio::test(start_paused = true)]
async fn completes_after_pending() -> Result<()> {
    let start = Instant::now();
    let mut calls = 0u32;

    let job = poller(5)
        .poll("job-1", |id: &str| {
            assert_eq!(id, "job-1");
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    return status("IN_PROGRESS");
                }
                let mut job = Job::with_status("COMPLETED");
                job.output = Some(json!({"result": "https://cdn.example.com/out.png"}));
                return Ok(job);
            }
        })
        .await?;

    assert_eq!(calls, 3);
    assert!(job.is_completed());
    assert_eq!(job.output_url(), Some("https://cdn.example.com/out.png"));
    assert_eq!(start.elapsed(), INTERVAL * 2);
    return Ok(());
}

#[tokio::test(start_paused = true)]
async fn times_out_without_trailing_sleep() {
    let start = Instant::now();
    let mut calls = 0u32;

    let err = poller(3)
        .poll("job-2", |_: &str| {
            calls += 1;
            async { status("IN_PROGRESS") }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 3);
    assert!(err.is_timeout());
    assert!(matches!(err, Error::PollTimeout { ref id, attempts: 3 } if id == "job-2"));
    assert_eq!(start.elapsed(), INTERVAL * 2);
}

#[tokio::test(start_paused = true)]
async fn failed_is_terminal() -> Result<()> {
    let mut calls = 0u32;

    let job = poller(10)
        .poll("job-3", |_: &str| {
            calls += 1;
            let n = calls;
            async move { status(if n == 1 { "IN_QUEUE" } else { "FAILED" }) }
        })
        .await?;

    assert_eq!(calls, 2);
    assert!(job.is_failed());
    return Ok(());
}

#[tokio::test(start_paused = true)]
async fn query_errors_are_not_retried() {
    let start = Instant::now();
    let mut calls = 0u32;

    let err = poller(5)
        .poll("job-4", |_: &str| {
            calls += 1;
            async { Err::<Job, _>(Error::msg("connection reset")) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(!err.is_timeout());
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn error_after_pending() {
    let mut calls = 0u32;

    let err = poller(5)
        .poll("job-5", |_: &str| {
            calls += 1;
            let n = calls;
            async move {
                match n {
                    1 => status("IN_PROGRESS"),
                    _ => Err(Error::msg("bad gateway")),
                }
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 2);
    assert!(!err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn unrecognized_statuses_keep_polling() {
    let mut seen = Vec::new();
    let mut calls = 0u32;

    let err = poller(4)
        .poll_with_progress(
            "job-6",
            |_: &str| {
                calls += 1;
                let n = calls;
                async move {
                    match n {
                        1 => Ok(Job::default()),
                        2 => status("completed"),
                        _ => status("CANCELLED"),
                    }
                }
            },
            |attempt| {
                seen.push((
                    attempt.attempt,
                    attempt.max_attempts,
                    attempt.status_str().to_string(),
                    attempt.state,
                ))
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(calls, 4);
    assert_eq!(
        seen,
        vec![
            (1, 4, "UNKNOWN".to_string(), PollState::Polling),
            (2, 4, "completed".to_string(), PollState::Polling),
            (3, 4, "CANCELLED".to_string(), PollState::Polling),
            (4, 4, "CANCELLED".to_string(), PollState::Polling),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn zero_attempts() {
    let mut calls = 0u32;

    let err = poller(0)
        .poll("job-7", |_: &str| {
            calls += 1;
            async { status("COMPLETED") }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 0);
    assert!(matches!(err, Error::PollTimeout { attempts: 0, .. }));
}

#[tokio::test(start_paused = true)]
async fn cancelled_while_waiting() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let mut calls = 0u32;

    let err = poller(10)
        .cancel_on(token)
        .poll("job-8", |_: &str| {
            calls += 1;
            trigger.cancel();
            async { status("IN_PROGRESS") }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(matches!(err, Error::Cancelled { ref id } if id == "job-8"));
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let mut calls = 0u32;

    let err = poller(10)
        .cancel_on(token)
        .poll("job-9", |_: &str| {
            calls += 1;
            async { status("COMPLETED") }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 0);
    assert!(matches!(err, Error::Cancelled { .. }));
}
