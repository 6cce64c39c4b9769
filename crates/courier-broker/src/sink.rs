// Outbound delivery. The router only sees `DeliverySink`; the gateway plugs
// in `SessionChannels`, one bounded queue per connected session.
use crate::error::DeliveryError;
use async_trait::async_trait;
use courier_common::SessionId;
use courier_wire::WampMessage;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Accepts one outbound message for one session.
///
/// Implementations may wait for queue space; callers bound the wait.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(
        &self,
        session_id: &SessionId,
        message: WampMessage,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug)]
pub struct SessionChannels {
    senders: DashMap<SessionId, mpsc::Sender<WampMessage>>,
    capacity: usize,
}

impl SessionChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Opens the outbound queue for a session, replacing any previous one.
    pub fn open(&self, session_id: SessionId) -> mpsc::Receiver<WampMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.senders.insert(session_id.clone(), tx).is_some() {
            tracing::debug!(session_id = %session_id, "replaced outbound channel");
        }
        rx
    }

    pub fn close(&self, session_id: &SessionId) -> bool {
        self.senders.remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.senders.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[async_trait]
impl DeliverySink for SessionChannels {
    async fn deliver(
        &self,
        session_id: &SessionId,
        message: WampMessage,
    ) -> Result<(), DeliveryError> {
        // Clone the sender so no map shard stays locked across the await.
        let sender = self
            .senders
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DeliveryError::SessionClosed(session_id.clone()))?;
        sender
            .send(message)
            .await
            .map_err(|_| DeliveryError::SessionClosed(session_id.clone()))
    }
}
