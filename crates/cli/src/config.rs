//! Command-line and environment configuration.

use std::time::Duration;

use clap::Args;

use engine::EngineConfig;
use scheduler::SchedulerConfig;

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, default_value_t = 10)]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Fraction of the SLA after which reminders start.
    #[arg(long, env = "ESCALATION_WARNING_RATIO", default_value_t = 0.9)]
    pub warning_ratio: f64,

    /// Actor recorded on audit entries written by the engine.
    #[arg(long, env = "ESCALATION_ACTOR", default_value = "system")]
    pub actor: String,
}

impl EngineArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            warning_ratio: self.warning_ratio,
            actor: self.actor.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SchedulerArgs {
    /// Seconds between escalation scans.
    #[arg(long, env = "ESCALATION_INTERVAL_SECS", default_value_t = 300)]
    pub interval_secs: u64,

    /// Also serve the operator API on this address.
    #[arg(long, env = "APPROVAL_ENGINE_BIND")]
    pub bind: Option<String>,
}

impl SchedulerArgs {
    pub fn scheduler_config(&self) -> anyhow::Result<SchedulerConfig> {
        anyhow::ensure!(self.interval_secs > 0, "--interval-secs must be positive");
        Ok(SchedulerConfig { interval: Duration::from_secs(self.interval_secs) })
    }
}
