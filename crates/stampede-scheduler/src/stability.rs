//! Stability profile: a long concurrent run with periodic health checks.
//!
//! Every `stability_check_interval_sec` the checker drains the window of
//! outcomes recorded since the previous check and compares its error rate
//! and p95/p99 response times against the configured thresholds. A breach
//! marks the offending interval, records `stability_threshold` as the abort
//! reason and cancels the run. The final partial window is analyzed after
//! the drain (see `LoadScheduler::finish_extras`).

use crate::pool::{WindowBuffer, WindowSample};
use crate::scheduler::LoadScheduler;
use stampede_core::{LoadTask, StabilityThresholds, TaskOutcome};
use stampede_metrics::stats::{nearest_rank, sorted};
use stampede_metrics::{AbortReason, IntervalResult, ProfileExtras};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

pub(crate) async fn run(
    scheduler: &LoadScheduler,
    task: &Arc<dyn LoadTask>,
    tx: &mpsc::Sender<TaskOutcome>,
    window: WindowBuffer,
) -> ProfileExtras {
    let users = scheduler.config.concurrent_users;
    let duration = scheduler.config.stability_duration();
    let interval = scheduler.config.stability_check_interval();
    let thresholds = scheduler.config.stability_thresholds.clone();
    let deadline = Instant::now() + duration;

    info!(
        users,
        duration_sec = duration.as_secs_f64(),
        check_interval_sec = interval.as_secs_f64(),
        "stability load starting"
    );

    let intervals: Mutex<Vec<IntervalResult>> = Mutex::new(Vec::new());

    let checker = async {
        let mut index: u32 = 1;
        let mut next_check = Instant::now() + interval;
        loop {
            let cancelled = tokio::select! {
                _ = sleep_until(next_check) => false,
                _ = scheduler.cancel.cancelled() => true,
            };
            if cancelled || Instant::now() >= deadline {
                break;
            }

            let samples = window.drain();
            let mut result = analyze_window(index, &samples);
            let breached = exceeds_thresholds(&result, &thresholds);
            result.exceeded = breached;

            info!(
                check = index,
                window_requests = result.total_requests,
                error_rate = result.error_rate,
                p95_ms = result.p95_response_time,
                p99_ms = result.p99_response_time,
                "stability checkpoint"
            );

            push_interval(&intervals, result);

            if breached {
                warn!(check = index, "stability thresholds exceeded, aborting run");
                scheduler.abort.set(AbortReason::StabilityThreshold);
                scheduler.cancel.cancel();
                break;
            }

            index += 1;
            next_check += interval;
        }
    };

    let dispatch = scheduler.closed_loop(task, users, deadline, None, tx);
    tokio::join!(dispatch, checker);

    let interval_results = match intervals.into_inner() {
        Ok(results) => results,
        Err(poisoned) => poisoned.into_inner(),
    };
    ProfileExtras::Stability {
        check_interval_sec: interval.as_secs_f64(),
        interval_results,
    }
}

fn push_interval(intervals: &Mutex<Vec<IntervalResult>>, result: IntervalResult) {
    match intervals.lock() {
        Ok(mut results) => results.push(result),
        Err(poisoned) => poisoned.into_inner().push(result),
    }
}

/// Computes one interval's health figures. Percentiles are over successful
/// samples, in milliseconds; the error rate is over the whole window.
pub(crate) fn analyze_window(index: u32, samples: &[WindowSample]) -> IntervalResult {
    let total = samples.len() as u64;
    let failures = samples.iter().filter(|s| !s.success).count() as u64;
    let times = sorted(
        samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.response_time_ms)
            .collect(),
    );

    IntervalResult {
        index,
        total_requests: total,
        error_rate: if total > 0 { failures as f64 / total as f64 } else { 0.0 },
        p50_response_time: nearest_rank(&times, 50.0),
        p95_response_time: nearest_rank(&times, 95.0),
        p99_response_time: nearest_rank(&times, 99.0),
        exceeded: false,
    }
}

/// True when any threshold is met. Rate and latency checks require at least
/// one matching sample so empty windows never abort a healthy run.
fn exceeds_thresholds(result: &IntervalResult, thresholds: &StabilityThresholds) -> bool {
    let failures_present = result.total_requests > 0 && result.error_rate > 0.0;
    if failures_present && result.error_rate >= thresholds.error_rate {
        return true;
    }
    let has_latency = result.p95_response_time > 0.0 || result.p99_response_time > 0.0;
    if has_latency {
        if result.p95_response_time >= thresholds.response_time_p95 * 1000.0 {
            return true;
        }
        if result.p99_response_time >= thresholds.response_time_p99 * 1000.0 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(successes: &[f64], failures: usize) -> Vec<WindowSample> {
        let mut out: Vec<WindowSample> = successes
            .iter()
            .map(|ms| WindowSample {
                success: true,
                response_time_ms: *ms,
            })
            .collect();
        out.extend((0..failures).map(|_| WindowSample {
            success: false,
            response_time_ms: 0.0,
        }));
        out
    }

    #[test]
    fn empty_window_is_healthy() {
        let result = analyze_window(1, &[]);
        assert_eq!(result.total_requests, 0);
        assert_eq!(result.error_rate, 0.0);
        assert!(!exceeds_thresholds(&result, &StabilityThresholds::default()));
    }

    #[test]
    fn error_rate_breach() {
        let result = analyze_window(1, &samples(&[100.0; 9], 1));
        assert!((result.error_rate - 0.1).abs() < 1e-9);
        assert!(exceeds_thresholds(&result, &StabilityThresholds::default()));
    }

    #[test]
    fn p95_breach_in_milliseconds() {
        // Threshold p95 = 1.0s; window p95 is 1500ms.
        let result = analyze_window(1, &samples(&[1500.0; 20], 0));
        assert!(exceeds_thresholds(&result, &StabilityThresholds::default()));

        let result = analyze_window(1, &samples(&[200.0; 20], 0));
        assert!(!exceeds_thresholds(&result, &StabilityThresholds::default()));
    }

    #[test]
    fn percentiles_use_success_samples_only() {
        let result = analyze_window(1, &samples(&[100.0, 200.0, 300.0], 2));
        assert_eq!(result.total_requests, 5);
        assert!(result.p50_response_time >= 100.0);
        assert!(result.p99_response_time <= 300.0);
    }
}
