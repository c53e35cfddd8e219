//! Bounded-concurrency fan-out of one probe over many targets.
//!
//! Every target runs as its own task in a `JoinSet`, gated by a semaphore.
//! A failing or timed-out target is logged and left out of the results;
//! it never cancels its siblings. The batch returns only once every task
//! has finished, and dropping the `JoinSet` aborts any stragglers.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{DiscoverError, Result};

/// Outcome of one fan-out batch.
#[derive(Debug)]
pub struct FanOutReport<R> {
    pub results: Vec<R>,
    pub failures: Vec<FanOutFailure>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct FanOutFailure {
    pub target: String,
    pub error: String,
}

/// Batch progress; the ETA is advisory only.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    completed: usize,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self) {
        self.completed = (self.completed + 1).min(self.total);
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn eta(&self) -> Option<Duration> {
        linear_eta(self.started.elapsed(), self.completed, self.total)
    }
}

/// `elapsed / completed * remaining`; `None` before the first completion.
pub fn linear_eta(elapsed: Duration, completed: usize, total: usize) -> Option<Duration> {
    if completed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(completed) as f64;
    Some(elapsed.div_f64(completed as f64).mul_f64(remaining))
}

/// Run `probe` over every target with at most `max_concurrency` in flight.
///
/// `max_concurrency == 0` means one slot per target. When `probe_timeout`
/// is set, a probe exceeding it counts as a failed target.
pub async fn fan_out<T, R, F, Fut>(
    label: &str,
    targets: Vec<T>,
    max_concurrency: usize,
    probe_timeout: Option<Duration>,
    probe: F,
) -> FanOutReport<R>
where
    T: Display + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let total = targets.len();
    let slots = if max_concurrency == 0 {
        total.max(1)
    } else {
        max_concurrency
    };
    let semaphore = Arc::new(Semaphore::new(slots));

    tracing::info!(batch = %label, total, concurrency = slots, "Fan-out started");

    let mut set: JoinSet<(String, Result<R>)> = JoinSet::new();
    for target in targets {
        let name = target.to_string();
        let work = probe(target);
        let semaphore = semaphore.clone();
        let tool = label.to_string();

        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return (name, Err(DiscoverError::Config(format!("fan-out limiter closed: {e}"))))
                }
            };

            let outcome = match probe_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(DiscoverError::Timeout {
                        tool,
                        target: name.clone(),
                        secs: limit.as_secs(),
                    }),
                },
                None => work.await,
            };
            (name, outcome)
        });
    }

    let mut progress = Progress::new(total);
    let mut results = Vec::with_capacity(total);
    let mut failures = Vec::new();

    while let Some(joined) = set.join_next().await {
        progress.record();
        match joined {
            Ok((_, Ok(result))) => results.push(result),
            Ok((target, Err(e))) => {
                tracing::warn!(batch = %label, target = %target, error = %e, "Probe failed");
                failures.push(FanOutFailure {
                    target,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(batch = %label, error = %e, "Probe task aborted");
                failures.push(FanOutFailure {
                    target: "unknown".to_string(),
                    error: e.to_string(),
                });
            }
        }

        tracing::info!(
            batch = %label,
            completed = progress.completed(),
            total,
            elapsed_secs = progress.started.elapsed().as_secs(),
            eta_secs = progress.eta().map(|d| d.as_secs()),
            "Fan-out progress"
        );
    }

    let elapsed = progress.started.elapsed();
    tracing::info!(
        batch = %label,
        succeeded = results.len(),
        failed = failures.len(),
        duration_ms = elapsed.as_millis(),
        "Fan-out complete"
    );

    FanOutReport {
        results,
        failures,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Barrier;

    use super::*;

    fn boom(target: &str) -> DiscoverError {
        DiscoverError::ToolFailed {
            tool: "probe".to_string(),
            code: 1,
            stderr: format!("{target} unreachable"),
        }
    }

    #[tokio::test]
    async fn test_failed_target_is_isolated() {
        let targets: Vec<String> = (1..=5).map(|i| format!("10.0.0.{i}")).collect();

        let report = fan_out("test", targets, 2, None, |target: String| async move {
            if target == "10.0.0.3" {
                Err(boom(&target))
            } else {
                Ok(target)
            }
        })
        .await;

        assert_eq!(report.results.len(), 4);
        assert!(!report.results.contains(&"10.0.0.3".to_string()));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, "10.0.0.3");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let report = fan_out("bounded", (0..12).collect::<Vec<u32>>(), 3, None, |n| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(n)
            }
        })
        .await;

        assert_eq!(report.results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_zero_means_one_slot_per_target() {
        // Every probe waits for all the others; any bound below the target
        // count would deadlock and trip the outer timeout.
        let barrier = Arc::new(Barrier::new(8));
        let batch = fan_out("unbounded", (0..8).collect::<Vec<u32>>(), 0, None, |n| {
            let barrier = barrier.clone();
            async move {
                barrier.wait().await;
                Ok(n)
            }
        });

        let report = tokio::time::timeout(Duration::from_secs(5), batch)
            .await
            .unwrap();
        assert_eq!(report.results.len(), 8);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let report = fan_out(
            "timeout",
            vec!["fast".to_string(), "slow".to_string()],
            0,
            Some(Duration::from_millis(50)),
            |target: String| async move {
                if target == "slow" {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok(target)
            },
        )
        .await;

        assert_eq!(report.results, vec!["fast".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, "slow");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = fan_out("empty", Vec::<String>::new(), 4, None, |t: String| async move {
            Ok(t)
        })
        .await;
        assert!(report.results.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_linear_eta() {
        assert_eq!(linear_eta(Duration::from_secs(10), 0, 4), None);
        assert_eq!(
            linear_eta(Duration::from_secs(10), 2, 6),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            linear_eta(Duration::from_secs(10), 6, 6),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_progress_counts() {
        let mut progress = Progress::new(2);
        assert!(progress.eta().is_none());
        progress.record();
        progress.record();
        progress.record();
        assert_eq!(progress.completed(), 2);
        assert_eq!(progress.eta(), Some(Duration::ZERO));
    }
}
