//! Escalation counters and the Prometheus-backed `MetricsPort` implementation.

use std::fmt;

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::traits::MetricsPort;

/// The counters tracked by the escalation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    WorkflowsChecked,
    WorkflowsEscalated,
    RemindersSent,
    SlaBreaches,
    EscalationFailures,
}

impl Counter {
    pub const ALL: [Counter; 5] = [
        Counter::WorkflowsChecked,
        Counter::WorkflowsEscalated,
        Counter::RemindersSent,
        Counter::SlaBreaches,
        Counter::EscalationFailures,
    ];

    /// Exported metric name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowsChecked   => "workflows_checked",
            Self::WorkflowsEscalated => "workflows_escalated",
            Self::RemindersSent      => "reminders_sent",
            Self::SlaBreaches        => "sla_breaches",
            Self::EscalationFailures => "escalation_failures",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Self::WorkflowsChecked   => "Instances examined by escalation scans",
            Self::WorkflowsEscalated => "Instances reassigned to their escalation target",
            Self::RemindersSent      => "SLA warnings and manual reminders delivered",
            Self::SlaBreaches        => "Breached stages that reached the escalation write",
            Self::EscalationFailures => "Instances whose escalation check failed",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub workflows_checked: u64,
    pub workflows_escalated: u64,
    pub reminders_sent: u64,
    pub sla_breaches: u64,
    pub escalation_failures: u64,
}

impl MetricsSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::WorkflowsChecked   => self.workflows_checked,
            Counter::WorkflowsEscalated => self.workflows_escalated,
            Counter::RemindersSent      => self.reminders_sent,
            Counter::SlaBreaches        => self.sla_breaches,
            Counter::EscalationFailures => self.escalation_failures,
        }
    }
}

/// Namespace prepended to every exported series.
pub const METRICS_NAMESPACE: &str = "approval_engine";

/// The engine counters as Prometheus `IntCounter`s registered in a
/// [`Registry`].
///
/// One instance per engine keeps tests from leaking counts into each other;
/// [`PrometheusMetrics::register`] lets a process share its registry with
/// other collectors.
pub struct PrometheusMetrics {
    registry: Registry,
    workflows_checked: IntCounter,
    workflows_escalated: IntCounter,
    reminders_sent: IntCounter,
    sla_breaches: IntCounter,
    escalation_failures: IntCounter,
}

impl PrometheusMetrics {
    /// Counters in a private registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::register(Registry::new())
    }

    /// Create the counters and register them in `registry`.
    ///
    /// # Errors
    /// Fails when `registry` already holds series with the same names.
    pub fn register(registry: Registry) -> Result<Self, prometheus::Error> {
        let counter = |c: Counter| -> Result<IntCounter, prometheus::Error> {
            let opts = Opts::new(format!("{}_total", c.as_str()), c.help()).namespace(METRICS_NAMESPACE);
            let counter = IntCounter::with_opts(opts)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            workflows_checked: counter(Counter::WorkflowsChecked)?,
            workflows_escalated: counter(Counter::WorkflowsEscalated)?,
            reminders_sent: counter(Counter::RemindersSent)?,
            sla_breaches: counter(Counter::SlaBreaches)?,
            escalation_failures: counter(Counter::EscalationFailures)?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn cell(&self, counter: Counter) -> &IntCounter {
        match counter {
            Counter::WorkflowsChecked   => &self.workflows_checked,
            Counter::WorkflowsEscalated => &self.workflows_escalated,
            Counter::RemindersSent      => &self.reminders_sent,
            Counter::SlaBreaches        => &self.sla_breaches,
            Counter::EscalationFailures => &self.escalation_failures,
        }
    }
}

impl MetricsPort for PrometheusMetrics {
    fn increment(&self, counter: Counter, value: u64) {
        self.cell(counter).inc_by(value);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workflows_checked: self.workflows_checked.get(),
            workflows_escalated: self.workflows_escalated.get(),
            reminders_sent: self.reminders_sent.get(),
            sla_breaches: self.sla_breaches.get(),
            escalation_failures: self.escalation_failures.get(),
        }
    }

    fn reset(&self) {
        for counter in Counter::ALL {
            self.cell(counter).reset();
        }
    }
}

/// Everything in `registry`, in the Prometheus text exposition format.
pub fn export_text(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
