//! Event bus plumbing: topic wildcard matching, an in-process bus and the
//! outbox that decouples the engine from bus availability.
//!
//! Topics are `.`-separated segments (`workflow.escalated`).  Subscription
//! patterns may use:
//! - `*`: exactly one segment (`workflow.*`)
//! - `#`: zero or more segments (`workflow.#`, `#`)

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::traits::{Event, EventBus};
use crate::PortError;

// ---------------------------------------------------------------------------
// Wildcard matching
// ---------------------------------------------------------------------------

/// Does `topic` match the subscription `pattern`?
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();
    segments_match(&pattern, &topic)
}

fn segments_match(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&"#", rest)) => {
            segments_match(rest, topic)
                || topic
                    .split_first()
                    .map_or(false, |(_, tail)| segments_match(pattern, tail))
        }
        Some((head, rest)) => match topic.split_first() {
            Some((segment, tail)) => {
                (*head == "*" || head == segment) && segments_match(rest, tail)
            }
            None => false,
        },
    }
}

// ---------------------------------------------------------------------------
// InMemoryEventBus
// ---------------------------------------------------------------------------

struct Subscription {
    pattern: String,
    sender: mpsc::UnboundedSender<Event>,
}

/// Process-local bus.  Keeps a history of everything published and fans
/// events out to every live subscriber whose pattern matches.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    history: Mutex<Vec<Event>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every future event whose topic matches `pattern`.
    pub fn subscribe(&self, pattern: impl Into<String>) -> mpsc::UnboundedReceiver<Event> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.push(Subscription { pattern: pattern.into(), sender });
        }
        receiver
    }

    /// Everything published so far, in publication order.
    pub fn published(&self) -> Vec<Event> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PortError> {
        let event = Event { topic: topic.to_owned(), payload };

        let mut subs = self
            .subscriptions
            .lock()
            .map_err(|_| PortError::Unavailable("subscription registry poisoned".into()))?;

        // Drop subscribers whose receiver has gone away.
        subs.retain(|sub| {
            if !topic_matches(&sub.pattern, topic) {
                return true;
            }
            sub.sender.send(event.clone()).is_ok()
        });
        drop(subs);

        if let Ok(mut history) = self.history.lock() {
            history.push(event);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Publisher half of the outbox.  `publish` only enqueues, so a slow or
/// unavailable bus can never stall the caller.
#[derive(Clone)]
pub struct OutboxEventBus {
    sender: mpsc::Sender<Event>,
}

/// Draining half of the outbox.  Run it on its own task.
pub struct OutboxDispatcher {
    receiver: mpsc::Receiver<Event>,
    sink: Arc<dyn EventBus>,
}

/// Build an outbox in front of `sink` holding at most `capacity` pending events.
pub fn outbox(sink: Arc<dyn EventBus>, capacity: usize) -> (OutboxEventBus, OutboxDispatcher) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (OutboxEventBus { sender }, OutboxDispatcher { receiver, sink })
}

#[async_trait]
impl EventBus for OutboxEventBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PortError> {
        let event = Event { topic: topic.to_owned(), payload };
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PortError::Unavailable("outbox full".into()),
            mpsc::error::TrySendError::Closed(_) => {
                PortError::Unavailable("outbox dispatcher stopped".into())
            }
        })
    }
}

impl OutboxDispatcher {
    /// Forward buffered events until every `OutboxEventBus` handle is dropped
    /// and the buffer is empty.  Returns the number of events delivered.
    pub async fn run(mut self) -> usize {
        let mut delivered = 0usize;
        while let Some(event) = self.receiver.recv().await {
            match self.sink.publish(&event.topic, event.payload).await {
                Ok(()) => {
                    delivered += 1;
                    debug!("outbox delivered '{}'", event.topic);
                }
                Err(e) => warn!("outbox failed to deliver '{}': {}", event.topic, e),
            }
        }
        delivered
    }
}
