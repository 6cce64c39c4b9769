use crate::router::{BrokerRouter, FanoutReport};
use courier_common::SessionId;
use courier_wire::{Eligibility, EventMessage};
use serde_json::Value;
use std::sync::Arc;

/// Server-side event publishing on top of the router.
///
/// None of these sends are subject to the authentication gate.
#[derive(Debug, Clone)]
pub struct EventMessenger {
    router: Arc<BrokerRouter>,
}

impl EventMessenger {
    pub fn new(router: Arc<BrokerRouter>) -> Self {
        Self { router }
    }

    /// Fans out `event` honouring its own eligibility.
    pub async fn send(&self, event: EventMessage) -> FanoutReport {
        self.router.dispatch_event(event).await
    }

    pub async fn send_to_all(&self, topic_uri: &str, event: Value) -> FanoutReport {
        self.send(EventMessage::new(topic_uri, event)).await
    }

    pub async fn send_to_all_except(
        &self,
        topic_uri: &str,
        event: Value,
        excluded: impl IntoIterator<Item = SessionId>,
    ) -> FanoutReport {
        let event =
            EventMessage::new(topic_uri, event).with_eligibility(Eligibility::excluding(excluded));
        self.send(event).await
    }

    /// Only subscribers among `eligible` receive the event.
    pub async fn send_to(
        &self,
        topic_uri: &str,
        event: Value,
        eligible: impl IntoIterator<Item = SessionId>,
    ) -> FanoutReport {
        let event = EventMessage::new(topic_uri, event)
            .with_eligibility(Eligibility::eligible_only(eligible));
        self.send(event).await
    }

    /// Bypasses subscriptions: `session_id` gets the event either way.
    pub async fn send_to_direct(
        &self,
        topic_uri: &str,
        event: Value,
        session_id: &SessionId,
    ) -> FanoutReport {
        self.router.deliver_direct(session_id, topic_uri, event).await
    }
}
