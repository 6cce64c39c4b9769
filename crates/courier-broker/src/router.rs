// Inbound message routing and event fan-out.
//
// Registry lookups return immutable snapshots, so no registry or cache lock
// is held while deliveries are awaited.
use crate::error::{DeliveryError, Result, RouterError};
use crate::session::{Inbound, Session};
use crate::sink::DeliverySink;
use courier_common::{BrokerSettings, SessionId};
use courier_registry::SubscriptionRegistry;
use courier_wire::{Eligibility, EventMessage, WampMessage};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of a fan-out. Every admitted recipient lands in exactly one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

#[derive(Debug)]
pub enum Routed {
    Subscribed,
    Unsubscribed,
    /// Cleanup unsubscribe: the session no longer owns any subscription.
    Released,
    Published(FanoutReport),
    /// Not a router concern; handed back to the caller.
    Unhandled(WampMessage),
}

pub struct BrokerRouter {
    registry: Arc<SubscriptionRegistry>,
    sink: Arc<dyn DeliverySink>,
    settings: BrokerSettings,
}

impl std::fmt::Debug for BrokerRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerRouter")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BrokerRouter {
    pub fn new(settings: BrokerSettings, sink: Arc<dyn DeliverySink>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(settings.cache_limit));
        Self::with_registry(settings, registry, sink)
    }

    pub fn with_registry(
        settings: BrokerSettings,
        registry: Arc<SubscriptionRegistry>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            registry,
            sink,
            settings,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub async fn handle(&self, inbound: Inbound<'_>) -> Result<Routed> {
        let Inbound { session, message } = inbound;
        match message {
            WampMessage::Subscribe(msg) => {
                self.authorize(session)?;
                self.registry
                    .register_subscription(session.id(), &msg.topic_uri);
                Ok(Routed::Subscribed)
            }
            WampMessage::Unsubscribe(msg) if msg.is_cleanup() => {
                self.registry.unregister_session(session.id());
                Ok(Routed::Released)
            }
            WampMessage::Unsubscribe(msg) => {
                self.authorize(session)?;
                self.registry
                    .unregister_subscription(session.id(), &msg.topic_uri);
                Ok(Routed::Unsubscribed)
            }
            WampMessage::Publish(msg) => {
                if let Err(err) = self.authorize(session) {
                    metrics::counter!("courier_publish_rejected_total").increment(1);
                    return Err(err);
                }
                let report = self
                    .fan_out(
                        &msg.topic_uri,
                        &msg.event,
                        &msg.eligibility,
                        Some(session.id()),
                    )
                    .await;
                Ok(Routed::Published(report))
            }
            // Programmatic event: no authentication check, no "self".
            WampMessage::Event(msg) => Ok(Routed::Published(self.dispatch_event(msg).await)),
            other => Ok(Routed::Unhandled(other)),
        }
    }

    /// Fans a server-originated event out to the topic's subscribers.
    pub async fn dispatch_event(&self, event: EventMessage) -> FanoutReport {
        self.fan_out(&event.topic_uri, &event.event, &event.eligibility, None)
            .await
    }

    /// Delivers one EVENT to `session_id` regardless of its subscriptions.
    pub async fn deliver_direct(
        &self,
        session_id: &SessionId,
        topic_uri: &str,
        event: Value,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();
        if self
            .deliver(session_id, EventMessage::new(topic_uri, event))
            .await
        {
            report.delivered = 1;
        } else {
            report.failed = 1;
        }
        report
    }

    fn authorize(&self, session: &Session) -> Result<()> {
        if self.settings.authentication_required && !session.is_authenticated() {
            tracing::debug!(session_id = %session.id(), "rejecting unauthenticated session");
            return Err(RouterError::NotAuthenticated(session.id().clone()));
        }
        Ok(())
    }

    async fn fan_out(
        &self,
        topic_uri: &str,
        event: &Value,
        eligibility: &Eligibility,
        publisher: Option<&SessionId>,
    ) -> FanoutReport {
        let subscribers = self.registry.find_subscribers(topic_uri);
        let deliveries = subscribers
            .iter()
            .filter(|recipient| eligibility.admits(recipient, publisher))
            .map(|recipient| self.deliver(recipient, EventMessage::new(topic_uri, event.clone())));
        let outcomes = join_all(deliveries).await;

        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let report = FanoutReport {
            delivered,
            failed: outcomes.len() - delivered,
        };
        tracing::debug!(
            topic = topic_uri,
            subscribers = subscribers.len(),
            delivered = report.delivered,
            failed = report.failed,
            "event fan-out complete"
        );
        report
    }

    // One recipient, bounded by the send timeout. Failures stay local.
    async fn deliver(&self, recipient: &SessionId, event: EventMessage) -> bool {
        let send = self.sink.deliver(recipient, WampMessage::Event(event));
        let result = match tokio::time::timeout(self.settings.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(recipient.clone())),
        };
        match result {
            Ok(()) => {
                metrics::counter!("courier_events_delivered_total").increment(1);
                true
            }
            Err(err) => {
                tracing::warn!(session_id = %recipient, error = %err, "event delivery failed");
                metrics::counter!("courier_delivery_failures_total", "reason" => err.reason())
                    .increment(1);
                false
            }
        }
    }
}
