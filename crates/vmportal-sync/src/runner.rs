// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-interval background job loop.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vmportal_core::PortalError;

/// Run `job` now, then again `interval` after each run finishes, until
/// `cancel` fires.
///
/// Runs never overlap and a slow run never shortens the following delay.
/// A failing run is logged and the loop continues. Cancellation interrupts
/// both a run in progress and the delay between runs.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), PortalError>>,
{
    info!(job = name, interval_secs = interval.as_secs(), "background job started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = job() => {
                if let Err(e) = result {
                    error!(job = name, error = %e, "background job run failed");
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(job = name, "background job shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_and_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let job_cancel = cancel.clone();
        let job_runs = runs.clone();
        run_periodic("test", Duration::from_secs(60), cancel.clone(), move || {
            let cancel = job_cancel.clone();
            let runs = job_runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                Ok(())
            }
        })
        .await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let job_cancel = cancel.clone();
        let job_runs = runs.clone();
        run_periodic("test", Duration::from_secs(1), cancel.clone(), move || {
            let cancel = job_cancel.clone();
            let runs = job_runs.clone();
            async move {
                if runs.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                    cancel.cancel();
                }
                Err(PortalError::Internal("boom".into()))
            }
        })
        .await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_run_is_followed_by_a_full_delay() {
        let cancel = CancellationToken::new();
        let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let origin = tokio::time::Instant::now();

        let job_cancel = cancel.clone();
        let job_starts = starts.clone();
        run_periodic("slow", Duration::from_secs(60), cancel.clone(), move || {
            let cancel = job_cancel.clone();
            let starts = job_starts.clone();
            async move {
                let count = {
                    let mut starts = starts.lock().unwrap();
                    starts.push(origin.elapsed());
                    starts.len()
                };
                tokio::time::sleep(Duration::from_secs(90)).await;
                if count == 2 {
                    cancel.cancel();
                }
                Ok(())
            }
        })
        .await;

        let starts = starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 2);
        // 90s run, then the full 60s delay.
        assert!(starts[1] - starts[0] >= Duration::from_secs(150));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay_stops_the_loop() {
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let job_runs = runs.clone();
        let handle = tokio::spawn(run_periodic(
            "idle",
            Duration::from_secs(3600),
            cancel.clone(),
            move || {
                let runs = job_runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_running_job() {
        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let job_finished = finished.clone();
        let handle = tokio::spawn(run_periodic(
            "slow",
            Duration::from_secs(1),
            cancel.clone(),
            move || {
                let finished = job_finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
