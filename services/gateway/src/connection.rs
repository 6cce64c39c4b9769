// One WebSocket connection = one broker session.
//
// Inbound frames are handled in arrival order on the connection task; all
// outbound traffic (WELCOME, call replies, events) goes through the
// session's bounded channel and a dedicated writer task.
use crate::transport::GatewayState;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use courier_broker::{CallError, DeliverySink, Inbound, RouterError, Session};
use courier_common::SessionId;
use courier_wire::{MessageType, WampMessage, WelcomeMessage};
use futures::{SinkExt, StreamExt};
use serde_json::Value;

pub(crate) async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let session_id = SessionId::generate();
    let mut outbound = state.channels.open(session_id.clone());
    let mut session = Session::new(session_id.clone());
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = session_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(session_id = %writer_id, error = %err, "dropping unencodable message");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let welcome = WampMessage::Welcome(WelcomeMessage::new(session_id.clone()));
    if reply(&state, &session_id, welcome).await {
        tracing::info!(session_id = %session_id, "session opened");
        metrics::gauge!("courier_sessions_active").increment(1.0);

        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    handle_frame(&state, &mut session, text.as_str().as_bytes()).await
                }
                Ok(WsMessage::Binary(bytes)) => handle_frame(&state, &mut session, &bytes).await,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(session_id = %session_id, error = %err, "websocket read failed");
                    break;
                }
            }
        }
        metrics::gauge!("courier_sessions_active").decrement(1.0);
    }

    // Cleanup never waits on deliveries still queued for this session.
    if let Err(err) = state.router.handle(session.cleanup()).await {
        tracing::warn!(session_id = %session_id, error = %err, "session cleanup failed");
    }
    state.channels.close(&session_id);
    writer.abort();
    tracing::info!(session_id = %session_id, "session closed");
}

async fn handle_frame(state: &GatewayState, session: &mut Session, input: &[u8]) {
    let message = match session.decode(input) {
        Ok(inbound) => inbound.message,
        Err(err) => {
            tracing::warn!(session_id = %session.id(), error = %err, "dropping malformed message");
            metrics::counter!("courier_protocol_errors_total").increment(1);
            if let Some(call_id) = malformed_call_id(input) {
                let error = CallError::from(err).into_message(call_id);
                reply(state, session.id(), WampMessage::CallError(error)).await;
            }
            return;
        }
    };

    match message {
        WampMessage::Prefix(prefix) => session.register_prefix(prefix.prefix, prefix.uri),
        WampMessage::Call(call) => {
            let response = state.procedures.dispatch(session, &call);
            reply(state, session.id(), response).await;
        }
        routed @ (WampMessage::Subscribe(_)
        | WampMessage::Unsubscribe(_)
        | WampMessage::Publish(_)) => {
            match state.router.handle(Inbound::new(session, routed)).await {
                Ok(outcome) => {
                    tracing::trace!(session_id = %session.id(), ?outcome, "message routed")
                }
                // Pub/sub rejections are silent on the wire.
                Err(err @ RouterError::NotAuthenticated(_)) => {
                    tracing::debug!(session_id = %session.id(), error = %err, "message dropped");
                }
            }
        }
        other => {
            tracing::debug!(
                session_id = %session.id(),
                kind = %other.message_type(),
                "ignoring message not accepted from clients"
            );
        }
    }
}

// Sends one message to the session itself through its outbound channel.
async fn reply(state: &GatewayState, session_id: &SessionId, message: WampMessage) -> bool {
    let timeout = state.router.settings().send_timeout;
    match tokio::time::timeout(timeout, state.channels.deliver(session_id, message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::debug!(session_id = %session_id, error = %err, "reply not delivered");
            false
        }
        Err(_) => {
            tracing::warn!(session_id = %session_id, "reply timed out");
            false
        }
    }
}

// A CALL that failed to decode still gets an answer if its call id survived.
fn malformed_call_id(input: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(input).ok()?;
    let items = value.as_array()?;
    if items.first()?.as_u64()? != MessageType::Call.id() {
        return None;
    }
    items.get(1)?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::malformed_call_id;

    #[test]
    fn call_id_is_recovered_from_broken_calls() {
        assert_eq!(malformed_call_id(br#"[2, "c7", 42]"#).as_deref(), Some("c7"));
        assert_eq!(malformed_call_id(br#"[2, "c7"]"#).as_deref(), Some("c7"));
        assert!(malformed_call_id(br#"[5, 1]"#).is_none());
        assert!(malformed_call_id(br#"[2, 3]"#).is_none());
        assert!(malformed_call_id(b"not json").is_none());
    }
}
