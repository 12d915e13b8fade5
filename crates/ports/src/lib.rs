//! `ports` crate: the outbound side-effect ports of the approval engine.
//!
//! Notification delivery, audit logging, event publication and metrics are
//! all external collaborators.  The engine crate only ever talks to them
//! through the traits defined in [`traits`]; this crate also ships the
//! in-process adapters and the recording test doubles in [`mock`].

pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod mock;
pub mod traits;

pub use error::PortError;
pub use events::{outbox, topic_matches, InMemoryEventBus, OutboxDispatcher, OutboxEventBus};
pub use logging::{LoggingAuditLog, LoggingEventBus, LoggingNotifier};
pub use metrics::{export_text, Counter, MetricsSnapshot, PrometheusMetrics, METRICS_NAMESPACE};
pub use traits::{AuditLogPort, AuditRecord, Event, EventBus, MetricsPort, NotificationPort};
