//! `scheduler` crate: periodic and on-demand invocation of the escalation
//! engine.
//!
//! One loop per process:
//! - every `interval` it runs a scan (the first tick fires immediately);
//! - [`EscalationScheduler::trigger_scan`] requests an extra scan;
//! - flipping the `watch` shutdown signal stops the loop.  A scan that is
//!   already running is finished first.
//!
//! Ticks missed while a slow scan is running are skipped, so scans never
//! overlap and never burst.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use engine::{EngineError, EscalationEngine, ReminderReceipt, ScanSummary};

/// Default time between scans.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_INTERVAL }
    }
}

pub struct EscalationScheduler {
    engine: Arc<EscalationEngine>,
    config: SchedulerConfig,
    trigger_tx: mpsc::Sender<()>,
}

impl EscalationScheduler {
    /// Build the scheduler and the receiving end of its manual trigger,
    /// which is handed to [`EscalationScheduler::start`].
    pub fn new(
        engine: Arc<EscalationEngine>,
        config: SchedulerConfig,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        // One slot: triggers arriving while one is queued coalesce.
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let scheduler = Arc::new(Self { engine, config, trigger_tx });
        (scheduler, trigger_rx)
    }

    pub fn engine(&self) -> &Arc<EscalationEngine> {
        &self.engine
    }

    /// Ask the running loop for an extra scan.  Returns `false` if a
    /// trigger is already queued or the loop has stopped.
    pub fn trigger_scan(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Run a scan right now, outside the loop.
    pub async fn run_once(&self) -> Result<ScanSummary, EngineError> {
        self.engine.check_and_escalate_workflows().await
    }

    /// Operator-initiated reminder; bypasses SLA classification.
    pub async fn send_reminder(
        &self,
        instance_id: Uuid,
        reminder_type: &str,
    ) -> Result<ReminderReceipt, EngineError> {
        self.engine.send_reminder(instance_id, reminder_type).await
    }

    /// Drive scans until `shutdown` becomes `true` (or its sender is
    /// dropped).  Returns the number of scans attempted.
    pub async fn start(
        self: Arc<Self>,
        mut trigger_rx: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        if *shutdown.borrow() {
            return 0;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut scans = 0usize;

        info!("escalation scheduler started (interval {:?})", self.config.interval);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    scans += 1;
                    self.scan("interval").await;
                }
                Some(()) = trigger_rx.recv() => {
                    scans += 1;
                    self.scan("manual").await;
                }
            }
        }

        info!("escalation scheduler stopped after {} scans", scans);
        scans
    }

    /// Listing failures are logged; the next tick retries.
    async fn scan(&self, cause: &str) {
        match self.engine.check_and_escalate_workflows().await {
            Ok(summary) => info!(
                cause,
                checked = summary.total_checked,
                escalated = summary.escalated,
                reminded = summary.reminded,
                failed = summary.failed,
                "escalation scan complete"
            ),
            Err(e) => error!(cause, error = %e, "escalation scan failed"),
        }
    }
}
