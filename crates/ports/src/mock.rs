//! Recording test doubles for the side-effect ports.
//!
//! Useful in unit and integration tests where a real delivery channel is
//! either unavailable or irrelevant.  Every double records the calls it
//! receives and can be told to fail.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::traits::{AuditLogPort, AuditRecord, Event, EventBus, NotificationPort};
use crate::PortError;

/// Behaviour injected into a mock port at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Accept every call.
    Succeed,
    /// Fail every call with `PortError::Unavailable`.
    FailAll(String),
    /// Fail calls addressed to one of these recipients (notifier) or
    /// concerning one of these actions (audit log); accept the rest.
    FailFor(HashSet<String>),
}

impl MockBehaviour {
    fn check(&self, key: &str) -> Result<(), PortError> {
        match self {
            Self::Succeed => Ok(()),
            Self::FailAll(msg) => Err(PortError::Unavailable(msg.clone())),
            Self::FailFor(keys) if keys.contains(key) => {
                Err(PortError::Unavailable(format!("simulated failure for '{key}'")))
            }
            Self::FailFor(_) => Ok(()),
        }
    }
}

fn fail_for<I, S>(keys: I) -> MockBehaviour
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    MockBehaviour::FailFor(keys.into_iter().map(Into::into).collect())
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

/// A notification that reached `MockNotifier`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub user_id: String,
    pub notification_type: String,
    pub payload: Value,
}

/// Records every successful notification; failed attempts are not recorded.
pub struct MockNotifier {
    pub behaviour: MockBehaviour,
    pub sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl MockNotifier {
    pub fn succeeding() -> Self {
        Self::with_behaviour(MockBehaviour::Succeed)
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::FailAll(msg.into()))
    }

    /// Fail only for the given recipients.
    pub fn failing_for<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behaviour(fail_for(recipients))
    }

    pub fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self { behaviour, sent: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of delivered notifications of the given type.
    pub fn count_of(&self, notification_type: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.notification_type == notification_type)
            .count()
    }
}

#[async_trait]
impl NotificationPort for MockNotifier {
    async fn send(
        &self,
        user_id: &str,
        notification_type: &str,
        payload: Value,
    ) -> Result<(), PortError> {
        self.behaviour.check(user_id)?;
        self.sent.lock().unwrap().push(SentNotification {
            user_id: user_id.to_owned(),
            notification_type: notification_type.to_owned(),
            payload,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockAuditLog
// ---------------------------------------------------------------------------

/// Records every appended audit record.
pub struct MockAuditLog {
    pub behaviour: MockBehaviour,
    pub records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MockAuditLog {
    pub fn succeeding() -> Self {
        Self::with_behaviour(MockBehaviour::Succeed)
    }

    /// Fail appends whose `action` is one of `actions`.
    pub fn failing_for<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behaviour(fail_for(actions))
    }

    pub fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self { behaviour, records: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records.lock().unwrap().iter().map(|r| r.action.clone()).collect()
    }

    pub fn count_of(&self, action: &str) -> usize {
        self.records.lock().unwrap().iter().filter(|r| r.action == action).count()
    }
}

#[async_trait]
impl AuditLogPort for MockAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), PortError> {
        self.behaviour.check(&record.action)?;
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockEventBus
// ---------------------------------------------------------------------------

/// Records published events, or fails every publish.
pub struct MockEventBus {
    pub behaviour: MockBehaviour,
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl MockEventBus {
    pub fn succeeding() -> Self {
        Self { behaviour: MockBehaviour::Succeed, events: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::FailAll(msg.into()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn topics(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.topic.clone()).collect()
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PortError> {
        self.behaviour.check(topic)?;
        self.events.lock().unwrap().push(Event { topic: topic.to_owned(), payload });
        Ok(())
    }
}
