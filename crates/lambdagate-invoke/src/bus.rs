//! The asynchronous execution bus.
//!
//! The gateway only needs two primitives from the bus: publish a payload to a
//! subject, and subscribe to a subject. Request/reply is built on top of them
//! by the correlator using a private reply inbox per invocation.
//!
//! [`InMemoryBus`] is a process-local implementation with exact subject
//! matching and at-most-once delivery. Messages published to a subject with no
//! subscribers are dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::BusError;

/// Publish/subscribe transport used to reach function executors.
#[async_trait]
pub trait ExecutionBus: Send + Sync + fmt::Debug {
    /// Publish one message. Never retried by callers.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;

    /// Subscribe to a subject. The subscription ends when dropped.
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError>;
}

type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    subject: String,
    rx: mpsc::UnboundedReceiver<Bytes>,
    on_drop: Option<Unsubscribe>,
}

impl Subscription {
    /// Wrap a receiver, running `on_drop` once the subscription is released.
    pub fn new(
        subject: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Bytes>,
        on_drop: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            subject: subject.into(),
            rx,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// The subscribed subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Receive the next message; `None` once the bus side is gone.
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.on_drop.take() {
            unsubscribe();
        }
    }
}

type SubscriberTable = DashMap<String, Vec<(u64, mpsc::UnboundedSender<Bytes>)>>;

/// Process-local bus with exact subject matching.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use lambdagate_invoke::bus::{ExecutionBus, InMemoryBus};
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryBus::new();
/// let mut sub = bus.subscribe("refunc.prod.echo").await.unwrap();
/// bus.publish("refunc.prod.echo", Bytes::from_static(b"hi")).await.unwrap();
/// assert_eq!(sub.next().await.unwrap(), Bytes::from_static(b"hi"));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBus {
    subscribers: Arc<SubscriberTable>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl InMemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `subject`.
    #[must_use]
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.subscribers.get(subject).map_or(0, |subs| subs.len())
    }

    /// Total number of messages published so far.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExecutionBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.published.fetch_add(1, Ordering::Relaxed);
        let Some(mut subs) = self.subscribers.get_mut(subject) else {
            trace!(subject, "no subscribers, message dropped");
            return Ok(());
        };
        subs.retain(|(_, tx)| tx.send(payload.clone()).is_ok());
        trace!(subject, delivered = subs.len(), "message published");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .entry(subject.to_owned())
            .or_default()
            .push((id, tx));

        let table = Arc::clone(&self.subscribers);
        let key = subject.to_owned();
        Ok(Subscription::new(subject, rx, move || {
            if let Some(mut subs) = table.get_mut(&key) {
                subs.retain(|(sub_id, _)| *sub_id != id);
            }
            table.remove_if(&key, |_, subs| subs.is_empty());
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_fan_out_to_every_subscriber() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("s").await.unwrap();
        let mut b = bus.subscribe("s").await.unwrap();

        bus.publish("s", Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(a.next().await.unwrap(), "x");
        assert_eq!(b.next().await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_should_drop_messages_without_subscribers() {
        let bus = InMemoryBus::new();
        bus.publish("nobody", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(bus.published_count(), 1);
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }

    #[tokio::test]
    async fn test_should_unsubscribe_on_drop() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe("s").await.unwrap();
        let other = bus.subscribe("s").await.unwrap();
        assert_eq!(bus.subscriber_count("s"), 2);

        drop(sub);
        assert_eq!(bus.subscriber_count("s"), 1);
        drop(other);
        assert_eq!(bus.subscriber_count("s"), 0);
    }

    #[tokio::test]
    async fn test_should_not_match_other_subjects() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("refunc.prod.a").await.unwrap();
        bus.publish("refunc.prod.b", Bytes::from_static(b"x"))
            .await
            .unwrap();
        bus.publish("refunc.prod.a", Bytes::from_static(b"y"))
            .await
            .unwrap();
        assert_eq!(sub.next().await.unwrap(), "y");
    }
}
