//! Append-only per-invocation log buffer.
//!
//! The correlator pushes lines as they arrive on the reply inbox; the gateway
//! holds a [`LogCursor`] that waits for "more available" and then drains
//! without blocking. Neither side ever waits on the other.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

/// One log line with its position in the invocation's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Zero-based, gap-free sequence number.
    pub sequence: u64,
    /// The log text.
    pub text: String,
}

/// Shared append-only buffer of [`LogEvent`]s.
#[derive(Debug, Default)]
pub struct LogBuffer {
    events: RwLock<Vec<LogEvent>>,
    notify: Notify,
}

impl LogBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line and wake any waiting reader. Returns its sequence.
    pub fn push(&self, text: impl Into<String>) -> u64 {
        let sequence = {
            let mut events = self.events.write();
            let sequence = events.len() as u64;
            events.push(LogEvent {
                sequence,
                text: text.into(),
            });
            sequence
        };
        self.notify.notify_waiters();
        sequence
    }

    /// Number of events appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A reader position in a [`LogBuffer`].
#[derive(Debug, Clone)]
pub struct LogCursor {
    buffer: Arc<LogBuffer>,
    next: usize,
}

impl LogCursor {
    /// Start reading `buffer` from the beginning.
    #[must_use]
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer, next: 0 }
    }

    /// Whether an unread event is available.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.buffer.len() > self.next
    }

    /// Take the next unread event without waiting.
    pub fn next_event(&mut self) -> Option<LogEvent> {
        let event = self.buffer.events.read().get(self.next).cloned()?;
        self.next += 1;
        Some(event)
    }

    /// Resolve once at least one unread event is available.
    ///
    /// Cancel safe: dropping the future loses nothing, the events stay in the
    /// buffer.
    pub async fn changed(&self) {
        loop {
            let notified = self.buffer.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push in between is not missed.
            notified.as_mut().enable();
            if self.has_next() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_should_number_events_in_order() {
        let buffer = Arc::new(LogBuffer::new());
        assert_eq!(buffer.push("a"), 0);
        assert_eq!(buffer.push("b"), 1);

        let mut cursor = LogCursor::new(Arc::clone(&buffer));
        assert_eq!(cursor.next_event().unwrap().text, "a");
        assert_eq!(cursor.next_event().unwrap().sequence, 1);
        assert!(cursor.next_event().is_none());
        assert!(!cursor.has_next());
    }

    #[tokio::test]
    async fn test_should_wake_reader_on_push() {
        let buffer = Arc::new(LogBuffer::new());
        let cursor = LogCursor::new(Arc::clone(&buffer));

        let writer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                buffer.push("late");
            })
        };

        tokio::time::timeout(Duration::from_secs(5), cursor.changed())
            .await
            .unwrap();
        assert!(cursor.has_next());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_should_return_immediately_when_unread_events_exist() {
        let buffer = Arc::new(LogBuffer::new());
        buffer.push("already here");
        let cursor = LogCursor::new(buffer);
        tokio_test::assert_ready!(tokio_test::task::spawn(cursor.changed()).poll());
    }
}
