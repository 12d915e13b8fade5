//! `approval-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`: start the escalation scheduler (and optionally the operator API).
//! - `scan`: run one escalation scan and print the summary.
//! - `remind`: send a manual reminder for one instance.
//! - `history`: print the audit trail of one instance.
//! - `migrate`: run pending database migrations.
//! - `validate`: validate a workflow definition JSON file.
//! - `publish`: validate and publish a workflow definition JSON file.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use prometheus::Registry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use db::{PgAuditLog, PgDefinitionStore, PgInstanceRepository};
use engine::{
    validate_definition, DefinitionStore, EngineContext, EscalationDefaults, EscalationEngine,
    SystemClock, WorkflowDefinition,
};
use ports::{outbox, LoggingEventBus, LoggingNotifier, PrometheusMetrics};
use scheduler::EscalationScheduler;

use config::{DatabaseArgs, EngineArgs, SchedulerArgs};

/// Buffered events awaiting the bus.
const OUTBOX_CAPACITY: usize = 1024;
/// How long to wait for the outbox to drain on exit.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "approval-engine",
    about = "Workflow approval engine with SLA-driven escalation",
    version
)]
struct Cli {
    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the periodic escalation scheduler.
    Run {
        #[command(flatten)]
        db: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        scheduler: SchedulerArgs,
    },
    /// Run a single escalation scan.
    Scan {
        #[command(flatten)]
        db: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Send a manual reminder to the current approver of an instance.
    Remind {
        #[command(flatten)]
        db: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
        instance_id: Uuid,
        #[arg(long, default_value = "manual_reminder")]
        reminder_type: String,
    },
    /// Print the audit trail of an instance.
    History {
        #[command(flatten)]
        db: DatabaseArgs,
        instance_id: Uuid,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: DatabaseArgs,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the definition JSON file.
        path: PathBuf,
    },
    /// Validate and publish a workflow definition JSON file.
    Publish {
        #[command(flatten)]
        db: DatabaseArgs,
        path: PathBuf,
    },
}

/// The wired engine plus the task draining its event outbox.
struct Runtime {
    engine: Arc<EscalationEngine>,
    registry: Registry,
    dispatcher: JoinHandle<usize>,
}

impl Runtime {
    async fn connect(db: &DatabaseArgs, args: &EngineArgs) -> anyhow::Result<Self> {
        let pool = db::create_pool(&db.database_url, db.max_connections)
            .await
            .context("failed to connect to database")?;

        let metrics = PrometheusMetrics::new().context("failed to register metrics")?;
        let registry = metrics.registry().clone();
        let (events, dispatcher) = outbox(Arc::new(LoggingEventBus), OUTBOX_CAPACITY);
        let ctx = EngineContext {
            instances: Arc::new(PgInstanceRepository::new(pool.clone())),
            definitions: Arc::new(PgDefinitionStore::new(pool.clone(), EscalationDefaults::default())),
            notifier: Arc::new(LoggingNotifier),
            audit: Arc::new(PgAuditLog::new(pool)),
            events: Arc::new(events),
            metrics: Arc::new(metrics),
            clock: Arc::new(SystemClock),
        };
        let engine = EscalationEngine::new(ctx, args.engine_config()).context("invalid engine configuration")?;
        engine.reset_metrics();

        Ok(Self {
            engine: Arc::new(engine),
            registry,
            dispatcher: tokio::spawn(dispatcher.run()),
        })
    }

    /// Drop the engine and give the outbox a bounded time to flush.
    async fn finish(self) {
        let Self { engine, dispatcher, .. } = self;
        drop(engine);
        match tokio::time::timeout(DRAIN_TIMEOUT, dispatcher).await {
            Ok(Ok(delivered)) => info!("event outbox drained ({} delivered)", delivered),
            Ok(Err(e)) => warn!("event dispatcher failed: {}", e),
            Err(_) => warn!("event outbox did not drain within {:?}", DRAIN_TIMEOUT),
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn read_definition(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid definition JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Run { db, engine, scheduler } => run(db, engine, scheduler).await?,
        Command::Scan { db, engine } => {
            let runtime = Runtime::connect(&db, &engine).await?;
            let summary = runtime.engine.check_and_escalate_workflows().await;
            runtime.finish().await;
            let summary = summary.context("escalation scan failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Remind { db, engine, instance_id, reminder_type } => {
            let runtime = Runtime::connect(&db, &engine).await?;
            let receipt = runtime.engine.send_reminder(instance_id, &reminder_type).await;
            runtime.finish().await;
            let receipt = receipt.with_context(|| format!("reminder for {instance_id} failed"))?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::History { db, instance_id } => {
            let pool = db::create_pool(&db.database_url, 2).await?;
            let records = PgAuditLog::new(pool).history(instance_id).await?;
            for record in records {
                println!(
                    "{}  {:<22} {:<16} {}",
                    record.timestamp.to_rfc3339(),
                    record.action,
                    record.actor,
                    record.details
                );
            }
        }
        Command::Migrate { db } => {
            info!("Running migrations");
            let pool = db::create_pool(&db.database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let definition = read_definition(&path)?;
            match validate_definition(&definition, &EscalationDefaults::default()) {
                Ok(published) => {
                    println!("Definition '{}' is valid:", published.name);
                    for (index, stage) in published.stages.iter().enumerate() {
                        println!(
                            "  [{index}] order={} approver={} sla={} escalate_to={}",
                            stage.order,
                            stage.approver_role,
                            stage.sla_hours.map_or_else(|| "none".to_owned(), |h| format!("{h}h")),
                            stage.escalation_role.as_deref().unwrap_or("-"),
                        );
                    }
                }
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Publish { db, path } => {
            let definition = read_definition(&path)?;
            let pool = db::create_pool(&db.database_url, 2).await?;
            let store = PgDefinitionStore::new(pool, EscalationDefaults::default());
            let published = store.publish(definition).await.context("publish failed")?;
            println!("Published definition {} ({})", published.id, published.name);
        }
    }

    Ok(())
}

async fn run(db: DatabaseArgs, engine: EngineArgs, args: SchedulerArgs) -> anyhow::Result<()> {
    let config = args.scheduler_config()?;
    let runtime = Runtime::connect(&db, &engine).await?;
    let (scheduler, trigger_rx) = EscalationScheduler::new(runtime.engine.clone(), config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let loop_handle = tokio::spawn(scheduler.clone().start(trigger_rx, shutdown_rx.clone()));

    let server_handle = match args.bind {
        Some(bind) => {
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("cannot bind {bind}"))?;
            let mut server_shutdown = shutdown_rx.clone();
            let state = api::AppState::new(scheduler.clone(), runtime.registry.clone());
            Some(tokio::spawn(api::serve(listener, state, async move {
                let _ = server_shutdown.changed().await;
            })))
        }
        None => None,
    };
    drop(scheduler);

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let scans = loop_handle.await.context("scheduler task panicked")?;
    info!("scheduler ran {} scans", scans);
    if let Some(handle) = server_handle {
        handle.await.context("api task panicked")?.context("api server failed")?;
    }

    runtime.finish().await;
    Ok(())
}
