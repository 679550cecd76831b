//! Execution bus over Core NATS.
//!
//! Requests go out with a plain publish and replies come back on the private
//! inbox subject the correlator subscribes to, so no JetStream state is
//! involved. Each subscription is pumped into the same channel-backed
//! [`Subscription`] the in-memory bus hands out; dropping it aborts the pump,
//! which drops the NATS subscriber and unsubscribes on the server.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::bus::{ExecutionBus, Subscription};
use crate::error::BusError;

/// [`ExecutionBus`] backed by an `async-nats` client.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl fmt::Debug for NatsBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsBus").finish_non_exhaustive()
    }
}

impl NatsBus {
    /// Connect to the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connect`] when the initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        info!(url, "connected to execution bus");
        Ok(Self::from_client(client))
    }

    /// Wrap an already connected client.
    #[must_use]
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExecutionBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.client
            .publish(subject.to_owned(), payload)
            .await
            .map_err(|e| BusError::Publish {
                subject: subject.to_owned(),
                reason: e.to_string(),
            })?;
        trace!(subject, "message published");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        let subscriber = self
            .client
            .subscribe(subject.to_owned())
            .await
            .map_err(|e| BusError::Subscribe {
                subject: subject.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(forward(subject, subscriber.map(|message| message.payload)))
    }
}

/// Pump `stream` into a [`Subscription`] until either side goes away.
fn forward<S>(subject: &str, stream: S) -> Subscription
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let key = subject.to_owned();
    let pump = tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        while let Some(payload) = stream.next().await {
            if tx.send(payload).is_err() {
                break;
            }
        }
        debug!(subject = %key, "subscription stream ended");
    });
    let abort = pump.abort_handle();
    Subscription::new(subject, rx, move || abort.abort())
}
