use async_trait::async_trait;
use courier_auth::{CraAuthenticator, StaticSecrets, sign};
use courier_broker::{
    BrokerRouter, DeliveryError, DeliverySink, EventMessenger, Inbound, ProcedureTable, Routed,
    RouterError, Session,
};
use courier_common::{BrokerSettings, SessionId};
use courier_wire::{CallMessage, EventMessage, Eligibility, WampMessage};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

// Records every delivery; sessions in `reject` fail instead.
#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<(SessionId, WampMessage)>>,
    reject: BTreeSet<SessionId>,
}

impl RecordingSink {
    fn rejecting(ids: &[&str]) -> Self {
        Self {
            delivered: Mutex::default(),
            reject: ids.iter().map(|id| SessionId::from(*id)).collect(),
        }
    }

    fn take(&self) -> Vec<(SessionId, WampMessage)> {
        std::mem::take(&mut *self.delivered.lock().expect("lock"))
    }

    fn recipients(&self) -> BTreeSet<String> {
        self.take()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(
        &self,
        session_id: &SessionId,
        message: WampMessage,
    ) -> Result<(), DeliveryError> {
        if self.reject.contains(session_id) {
            return Err(DeliveryError::Rejected(format!("{session_id} is muted")));
        }
        self.delivered
            .lock()
            .expect("lock")
            .push((session_id.clone(), message));
        Ok(())
    }
}

fn names(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

async fn subscribe_all(router: &BrokerRouter, sessions: &[&Session], topic: &str) {
    for session in sessions {
        let frame = format!(r#"[5, "{topic}"]"#);
        let inbound = session.decode(frame).expect("decode");
        router.handle(inbound).await.expect("subscribe");
    }
}

#[tokio::test]
async fn subscribe_publish_unsubscribe_round_trip() {
    let sink = Arc::new(RecordingSink::default());
    let router = BrokerRouter::new(BrokerSettings::default(), sink.clone());
    let session = Session::new(SessionId::from("sess01"));

    subscribe_all(&router, &[&session], "/foo").await;
    let routed = router
        .handle(session.decode(r#"[7, "/foo", "hello"]"#).expect("decode"))
        .await
        .expect("publish");
    assert!(matches!(routed, Routed::Published(report) if report.delivered == 1));

    let delivered = sink.take();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0.as_str(), "sess01");
    assert_eq!(
        delivered[0].1.encode().expect("encode"),
        r#"[8,"/foo","hello"]"#
    );

    router
        .handle(session.decode(r#"[6, "/foo"]"#).expect("decode"))
        .await
        .expect("unsubscribe");
    let routed = router
        .handle(session.decode(r#"[7, "/foo", "hello"]"#).expect("decode"))
        .await
        .expect("publish");
    assert!(matches!(routed, Routed::Published(report) if report.attempted() == 0));
    assert!(sink.take().is_empty());
}

#[tokio::test]
async fn publish_eligibility_rules() {
    let sink = Arc::new(RecordingSink::default());
    let router = BrokerRouter::new(BrokerSettings::default(), sink.clone());
    let (a, b, c) = (
        Session::new(SessionId::from("A")),
        Session::new(SessionId::from("B")),
        Session::new(SessionId::from("C")),
    );
    subscribe_all(&router, &[&a, &b, &c], "/topic").await;

    let cases = [
        (r#"[7, "/topic", 1, ["A"]]"#, names(&["B", "C"])),
        (r#"[7, "/topic", 1, [], ["B"]]"#, names(&["B"])),
        (r#"[7, "/topic", 1, true]"#, names(&["B", "C"])),
        (r#"[7, "/topic", 1, ["B"], ["B", "C"]]"#, names(&["C"])),
        (r#"[7, "/topic", 1]"#, names(&["A", "B", "C"])),
    ];
    for (frame, expected) in cases {
        router
            .handle(a.decode(frame).expect("decode"))
            .await
            .expect("publish");
        assert_eq!(sink.recipients(), expected, "frame {frame}");
    }
}

#[tokio::test]
async fn exclude_me_always_drops_the_publisher() {
    let sink = Arc::new(RecordingSink::default());
    let router = BrokerRouter::new(BrokerSettings::default(), sink.clone());
    let (a, b) = (
        Session::new(SessionId::from("A")),
        Session::new(SessionId::from("B")),
    );
    subscribe_all(&router, &[&a, &b], "/topic").await;

    let message = WampMessage::Publish(courier_wire::PublishMessage {
        topic_uri: "/topic".to_string(),
        event: json!("x"),
        eligibility: Eligibility::excluding_me().with_eligible([a.id().clone(), b.id().clone()]),
    });
    router
        .handle(Inbound::new(&a, message))
        .await
        .expect("publish");
    assert_eq!(sink.recipients(), names(&["B"]));
}

#[tokio::test]
async fn failed_delivery_does_not_stop_fan_out() {
    let sink = Arc::new(RecordingSink::rejecting(&["B"]));
    let router = BrokerRouter::new(BrokerSettings::default(), sink.clone());
    let sessions: Vec<Session> = ["A", "B", "C"]
        .into_iter()
        .map(|id| Session::new(SessionId::from(id)))
        .collect();
    let refs: Vec<&Session> = sessions.iter().collect();
    subscribe_all(&router, &refs, "/topic").await;

    let routed = router
        .handle(sessions[0].decode(r#"[7, "/topic", null]"#).expect("decode"))
        .await
        .expect("publish");
    let Routed::Published(report) = routed else {
        panic!("expected fan-out");
    };
    assert_eq!((report.delivered, report.failed), (2, 1));
    assert_eq!(sink.recipients(), names(&["A", "C"]));
}

#[tokio::test]
async fn wildcard_and_template_subscriptions_route_events() {
    let sink = Arc::new(RecordingSink::default());
    let router = BrokerRouter::new(BrokerSettings::default(), sink.clone());
    let any = Session::new(SessionId::from("any"));
    let picky = Session::new(SessionId::from("picky"));
    subscribe_all(&router, &[&any], "/topic/PRICE.STOCK.*.IBM").await;
    subscribe_all(&router, &[&picky], "/topic/PRICE.STOCK.*.{ticker:(IBM|MSFT)}").await;

    let messenger = EventMessenger::new(Arc::new(router));
    messenger
        .send_to_all("/topic/PRICE.STOCK.NASDAQ.IBM", json!(101.5))
        .await;
    assert_eq!(sink.recipients(), names(&["any", "picky"]));

    messenger
        .send_to_all("/topic/PRICE.STOCK.NASDAQ.MSFT", json!(99))
        .await;
    assert_eq!(sink.recipients(), names(&["picky"]));

    let report = messenger
        .send_to_all("/topic/PRICE.STOCK.NASDAQ.ORCL", json!(12))
        .await;
    assert_eq!(report.attempted(), 0);
}

#[tokio::test]
async fn messenger_targets() {
    let sink = Arc::new(RecordingSink::default());
    let router = BrokerRouter::new(BrokerSettings::default(), sink.clone());
    let (a, b, c) = (
        Session::new(SessionId::from("A")),
        Session::new(SessionId::from("B")),
        Session::new(SessionId::from("C")),
    );
    subscribe_all(&router, &[&a, &b, &c], "/news").await;
    let messenger = EventMessenger::new(Arc::new(router));

    messenger
        .send_to_all_except("/news", json!("x"), [a.id().clone()])
        .await;
    assert_eq!(sink.recipients(), names(&["B", "C"]));

    messenger
        .send_to("/news", json!("x"), [c.id().clone(), SessionId::from("Z")])
        .await;
    assert_eq!(sink.recipients(), names(&["C"]));

    // Programmatic events have no "self" to drop.
    messenger
        .send(EventMessage::new("/news", json!("x")).with_eligibility(Eligibility::excluding_me()))
        .await;
    assert_eq!(sink.recipients(), names(&["A", "B", "C"]));

    let report = messenger
        .send_to_direct("/private", json!({"k": 1}), &SessionId::from("unsubscribed"))
        .await;
    assert_eq!(report.delivered, 1);
    let delivered = sink.take();
    assert_eq!(delivered[0].0.as_str(), "unsubscribed");
    assert!(
        matches!(&delivered[0].1, WampMessage::Event(event) if event.topic_uri == "/private")
    );
}

#[tokio::test]
async fn failed_handshake_keeps_privileged_operations_closed() {
    let settings = BrokerSettings::default().with_authentication_required(true);
    let sink = Arc::new(RecordingSink::default());
    let router = BrokerRouter::new(settings.clone(), sink.clone());
    let cra = CraAuthenticator::new(Arc::new(StaticSecrets::from_iter([("a", "secret")])));
    let procedures = ProcedureTable::new(&settings, cra);
    let session = Session::new(SessionId::from("sess01"));

    let call = |proc_uri: &str, args: Vec<Value>| CallMessage {
        call_id: "1".to_string(),
        proc_uri: proc_uri.to_string(),
        args,
    };

    let challenge = match procedures.dispatch(&session, &call("#authreq", vec![json!("a")])) {
        WampMessage::CallResult(result) => result.result.as_str().expect("string").to_string(),
        other => panic!("unexpected reply {other:?}"),
    };
    let wrong = sign("wrong", &challenge).expect("sign");
    let reply = procedures.dispatch(&session, &call("#auth", vec![json!(wrong)]));
    assert!(matches!(reply, WampMessage::CallError(_)));

    let err = router
        .handle(session.decode(r#"[5, "/foo"]"#).expect("decode"))
        .await
        .expect_err("gated");
    assert!(matches!(err, RouterError::NotAuthenticated(_)));

    let challenge = match procedures.dispatch(&session, &call("#authreq", vec![json!("a")])) {
        WampMessage::CallResult(result) => result.result.as_str().expect("string").to_string(),
        other => panic!("unexpected reply {other:?}"),
    };
    let right = sign("secret", &challenge).expect("sign");
    let reply = procedures.dispatch(&session, &call("#auth", vec![json!(right)]));
    assert!(matches!(reply, WampMessage::CallResult(ref r) if r.result.is_null()));

    router
        .handle(session.decode(r#"[5, "/foo"]"#).expect("decode"))
        .await
        .expect("subscribe");
    router
        .handle(session.decode(r#"[7, "/foo", "hello"]"#).expect("decode"))
        .await
        .expect("publish");
    assert_eq!(sink.recipients(), names(&["sess01"]));
}

#[tokio::test]
async fn cleanup_releases_every_subscription() {
    let sink = Arc::new(RecordingSink::default());
    let router = BrokerRouter::new(BrokerSettings::default(), sink.clone());
    let session = Session::new(SessionId::from("gone"));
    for topic in ["/a", "/b/**", "/c/{id}"] {
        subscribe_all(&router, &[&session], topic).await;
    }
    assert_eq!(router.registry().subscriptions(session.id()).len(), 3);

    let routed = router.handle(session.cleanup()).await.expect("cleanup");
    assert!(matches!(routed, Routed::Released));
    assert!(!router.registry().has_subscriptions());
    for destination in ["/a", "/b/x/y", "/c/7"] {
        assert!(router.registry().find_subscribers(destination).is_empty());
    }
}
