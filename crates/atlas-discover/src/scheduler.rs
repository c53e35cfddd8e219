//! Scan scheduling engine.
//!
//! A single control loop re-reads the persisted scheduler configuration on
//! every tick and, when a cycle is due, runs fast, container and deep scans
//! in that order. Cycles never overlap: the next tick is only considered
//! after the previous cycle returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};

use atlas_core::SchedulerState;
use atlas_inventory::InventoryStore;

use crate::error::Result;
use crate::orchestrator::{ScanMode, ScanOrchestrator, ScanReport};

/// Order of the scan modes within one cycle.
pub const CYCLE_ORDER: [ScanMode; 3] = [ScanMode::Fast, ScanMode::Container, ScanMode::Deep];

/// Something that can run one scan mode.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn run_mode(&self, mode: ScanMode) -> Result<ScanReport>;
}

#[async_trait]
impl ScanRunner for ScanOrchestrator {
    async fn run_mode(&self, mode: ScanMode) -> Result<ScanReport> {
        ScanOrchestrator::run_mode(self, mode).await
    }
}

/// What a tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    Disabled,
    /// No cycle has ever completed.
    FirstRun,
    Due { elapsed: chrono::Duration },
    Waiting { remaining: chrono::Duration },
}

impl TickDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, Self::FirstRun | Self::Due { .. })
    }
}

/// Decide whether a cycle is due at `now`.
pub fn evaluate(state: &SchedulerState, now: DateTime<Utc>) -> TickDecision {
    if !state.enabled {
        return TickDecision::Disabled;
    }
    let Some(last_run) = state.last_run else {
        return TickDecision::FirstRun;
    };

    let elapsed = now - last_run;
    if elapsed >= state.interval() {
        TickDecision::Due { elapsed }
    } else {
        TickDecision::Waiting {
            remaining: state.interval() - elapsed,
        }
    }
}

/// Result of one scheduled cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub reports: Vec<ScanReport>,
    pub failed_modes: Vec<(ScanMode, String)>,
    pub finished_at: DateTime<Utc>,
}

pub struct ScanScheduler {
    store: InventoryStore,
    runner: Arc<dyn ScanRunner>,
    tick: Duration,
}

impl ScanScheduler {
    pub fn new(store: InventoryStore, runner: Arc<dyn ScanRunner>, tick: Duration) -> Self {
        Self {
            store,
            runner,
            tick,
        }
    }

    /// Force the persisted interval (and enable scheduling) once at startup.
    pub async fn apply_interval_override(&self, minutes: u32) -> Result<()> {
        self.store.update_scheduler_config(minutes, true).await?;
        tracing::info!(minutes, "Scan interval overridden from environment");
        Ok(())
    }

    /// Run the scheduler loop. Returns only if the runtime shuts down.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(tick_secs = self.tick.as_secs(), "Scheduler started");

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick_at(Utc::now()).await {
                tracing::error!(error = %e, "Scheduler tick failed");
            }
        }
    }

    /// Evaluate one tick and run a cycle if it is due.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<Option<CycleReport>> {
        let state = self.store.scheduler_state().await?;
        let decision = evaluate(&state, now);

        match &decision {
            TickDecision::Disabled => tracing::info!("Scheduler is disabled"),
            TickDecision::FirstRun => tracing::info!("First scheduled run"),
            TickDecision::Due { elapsed } => tracing::info!(
                interval_minutes = state.scan_interval_minutes,
                elapsed_minutes = elapsed.num_minutes(),
                "Scheduled run"
            ),
            TickDecision::Waiting { remaining } => tracing::debug!(
                remaining_secs = remaining.num_seconds(),
                "Next run not due"
            ),
        }

        if !decision.should_run() {
            return Ok(None);
        }
        self.run_cycle().await.map(Some)
    }

    /// Run every mode in `CYCLE_ORDER`, then record the run time even if
    /// some modes failed.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut reports = Vec::new();
        let mut failed_modes = Vec::new();

        for mode in CYCLE_ORDER {
            tracing::info!(mode = %mode, "Running scheduled scan");
            match self.runner.run_mode(mode).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(mode = %mode, error = %e, "Scheduled scan failed");
                    failed_modes.push((mode, e.to_string()));
                }
            }
        }

        let finished_at = Utc::now();
        self.store.record_scheduler_run(finished_at).await?;
        tracing::info!(
            succeeded = reports.len(),
            failed = failed_modes.len(),
            "Scan cycle complete"
        );

        Ok(CycleReport {
            reports,
            failed_modes,
            finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    fn state(enabled: bool, minutes: u32, last_run: Option<DateTime<Utc>>) -> SchedulerState {
        SchedulerState {
            scan_interval_minutes: minutes,
            enabled,
            last_run,
        }
    }

    #[test]
    fn test_disabled_never_runs() {
        let now = Utc::now();
        let decision = evaluate(&state(false, 10, None), now);
        assert_eq!(decision, TickDecision::Disabled);
        assert!(!decision.should_run());
    }

    #[test]
    fn test_cold_start_runs() {
        assert_eq!(
            evaluate(&state(true, 10, None), Utc::now()),
            TickDecision::FirstRun
        );
    }

    #[test]
    fn test_due_after_interval() {
        let now = Utc::now();
        let decision = evaluate(&state(true, 10, Some(now - ChronoDuration::minutes(11))), now);
        assert!(decision.should_run());

        let exact = evaluate(&state(true, 10, Some(now - ChronoDuration::minutes(10))), now);
        assert!(exact.should_run());
    }

    #[test]
    fn test_waiting_before_interval() {
        let now = Utc::now();
        let decision = evaluate(&state(true, 10, Some(now - ChronoDuration::minutes(4))), now);
        assert_eq!(
            decision,
            TickDecision::Waiting {
                remaining: ChronoDuration::minutes(6)
            }
        );
    }

    #[test]
    fn test_cycle_order() {
        assert_eq!(
            CYCLE_ORDER,
            [ScanMode::Fast, ScanMode::Container, ScanMode::Deep]
        );
    }
}
