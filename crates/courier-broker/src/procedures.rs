// Explicit CALL dispatch table: procedure pattern -> handler, built at
// startup. The CRA procedures are reserved and always resolved first.
use crate::session::Session;
use courier_auth::{AuthError, CraAuthenticator};
use courier_common::BrokerSettings;
use courier_registry::{PathPattern, PatternError};
use courier_wire::{CallErrorMessage, CallMessage, CallResultMessage, WampMessage};
use serde_json::Value;
use std::sync::Arc;

pub const AUTH_REQUEST_PROCEDURE: &str = "#authreq";
pub const AUTH_PROCEDURE: &str = "#auth";
/// Base of the full-URI spelling of the reserved procedures.
pub const WAMP_PROCEDURE_BASE: &str = "http://api.wamp.ws/procedure";
pub const ERROR_URI_BASE: &str = "http://courier.local/error";

pub type ProcedureHandler =
    Arc<dyn Fn(&Session, &[Value]) -> Result<Value, CallError> + Send + Sync>;

/// Failure reported to the caller as CALLERROR.
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub uri: String,
    pub description: String,
    pub details: Option<Value>,
}

impl CallError {
    /// `kind` becomes the fragment of an error URI under [`ERROR_URI_BASE`].
    pub fn new(kind: &str, description: impl Into<String>) -> Self {
        Self {
            uri: format!("{ERROR_URI_BASE}#{kind}"),
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn no_such_procedure(proc_uri: &str) -> Self {
        Self::new("no-such-procedure", format!("no procedure registered for {proc_uri}"))
    }

    pub fn not_authenticated() -> Self {
        Self::new("not-authenticated", "authentication required")
    }

    pub fn invalid_argument(description: impl Into<String>) -> Self {
        Self::new("invalid-argument", description)
    }

    pub fn into_message(self, call_id: impl Into<String>) -> CallErrorMessage {
        CallErrorMessage {
            call_id: call_id.into(),
            error_uri: self.uri,
            error_desc: self.description,
            error_details: self.details,
        }
    }
}

impl From<AuthError> for CallError {
    fn from(err: AuthError) -> Self {
        CallError::new(err.code(), err.to_string())
    }
}

impl From<courier_wire::Error> for CallError {
    fn from(err: courier_wire::Error) -> Self {
        CallError::new("protocol-error", err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reserved {
    AuthRequest,
    Auth,
}

// Only the bare `#authreq` / `#auth` names and their WAMP procedure URIs are
// reserved; other URIs with the same fragment go to the table.
fn reserved(proc_uri: &str) -> Option<Reserved> {
    let fragment = match proc_uri.strip_prefix(WAMP_PROCEDURE_BASE) {
        Some(rest) => rest,
        None => proc_uri,
    };
    match fragment {
        AUTH_REQUEST_PROCEDURE => Some(Reserved::AuthRequest),
        AUTH_PROCEDURE => Some(Reserved::Auth),
        _ => None,
    }
}

pub struct ProcedureTable {
    entries: Vec<(PathPattern, ProcedureHandler)>,
    authenticator: CraAuthenticator,
    authentication_required: bool,
}

impl std::fmt::Debug for ProcedureTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<&str> = self.entries.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("ProcedureTable")
            .field("patterns", &patterns)
            .field("authentication_required", &self.authentication_required)
            .finish_non_exhaustive()
    }
}

impl ProcedureTable {
    pub fn new(settings: &BrokerSettings, authenticator: CraAuthenticator) -> Self {
        Self {
            entries: Vec::new(),
            authenticator,
            authentication_required: settings.authentication_required,
        }
    }

    /// Registers `handler` for every procedure URI `pattern` matches.
    /// Earlier registrations take precedence.
    pub fn register<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(&Session, &[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        let compiled = PathPattern::parse(pattern)?;
        self.entries.push((compiled, Arc::new(handler)));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs a CALL and produces the CALLRESULT or CALLERROR to send back.
    pub fn dispatch(&self, session: &Session, call: &CallMessage) -> WampMessage {
        let outcome = self.invoke(session, call);
        let (label, reply) = match outcome {
            Ok(result) => (
                "ok",
                WampMessage::CallResult(CallResultMessage {
                    call_id: call.call_id.clone(),
                    result,
                }),
            ),
            Err(err) => {
                tracing::debug!(
                    session_id = %session.id(),
                    procedure = %call.proc_uri,
                    error_uri = %err.uri,
                    "call failed"
                );
                ("error", WampMessage::CallError(err.into_message(call.call_id.clone())))
            }
        };
        metrics::counter!("courier_calls_total", "outcome" => label).increment(1);
        reply
    }

    fn invoke(&self, session: &Session, call: &CallMessage) -> Result<Value, CallError> {
        match reserved(&call.proc_uri) {
            Some(Reserved::AuthRequest) => return self.auth_request(session, &call.args),
            Some(Reserved::Auth) => return self.auth_response(session, &call.args),
            None => {}
        }
        if self.authentication_required && !session.is_authenticated() {
            return Err(CallError::not_authenticated());
        }
        let handler = self
            .entries
            .iter()
            .find(|(pattern, _)| pattern.matches(&call.proc_uri))
            .map(|(_, handler)| Arc::clone(handler))
            .ok_or_else(|| CallError::no_such_procedure(&call.proc_uri))?;
        handler(session, &call.args)
    }

    fn auth_request(&self, session: &Session, args: &[Value]) -> Result<Value, CallError> {
        let auth_key = string_arg(args, 0, "authKey")?;
        let challenge = self.authenticator.handle_auth_request(
            session.id(),
            session.auth(),
            auth_key,
            args.get(1),
        )?;
        Ok(Value::String(challenge))
    }

    fn auth_response(&self, session: &Session, args: &[Value]) -> Result<Value, CallError> {
        let signature = string_arg(args, 0, "signature")?;
        self.authenticator
            .handle_auth_response(session.id(), session.auth(), signature)?;
        Ok(Value::Null)
    }
}

fn string_arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, CallError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| CallError::invalid_argument(format!("{name} must be a string")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_auth::{StaticSecrets, sign};
    use courier_common::SessionId;
    use serde_json::json;

    fn call(proc_uri: &str, args: Vec<Value>) -> CallMessage {
        CallMessage {
            call_id: "c1".to_string(),
            proc_uri: proc_uri.to_string(),
            args,
        }
    }

    fn table(required: bool) -> ProcedureTable {
        let settings = BrokerSettings::default().with_authentication_required(required);
        let secrets = StaticSecrets::from_iter([("app", "s3cret")]);
        let mut table = ProcedureTable::new(&settings, CraAuthenticator::new(Arc::new(secrets)));
        table
            .register("/calc/add", |_, args| {
                let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
                Ok(json!(sum))
            })
            .expect("add")
            .register("/calc/*", |_, _| Err(CallError::new("unsupported", "nope")))
            .expect("fallback");
        table
    }

    fn error_uri(reply: &WampMessage) -> &str {
        match reply {
            WampMessage::CallError(err) => &err.error_uri,
            other => panic!("expected CALLERROR, got {other:?}"),
        }
    }

    #[test]
    fn first_matching_registration_wins() {
        let table = table(false);
        let session = Session::new(SessionId::from("s"));
        let reply = table.dispatch(&session, &call("/calc/add", vec![json!(1), json!(2)]));
        assert_eq!(
            reply,
            WampMessage::CallResult(CallResultMessage {
                call_id: "c1".to_string(),
                result: json!(3),
            })
        );
        let reply = table.dispatch(&session, &call("/calc/mul", vec![]));
        assert_eq!(error_uri(&reply), "http://courier.local/error#unsupported");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unknown_procedure_is_reported() {
        let table = table(false);
        let session = Session::new(SessionId::from("s"));
        let reply = table.dispatch(&session, &call("/other", vec![]));
        assert_eq!(error_uri(&reply), "http://courier.local/error#no-such-procedure");
    }

    #[test]
    fn unauthenticated_calls_are_refused_when_required() {
        let table = table(true);
        let session = Session::new(SessionId::from("s"));
        let reply = table.dispatch(&session, &call("/calc/add", vec![json!(1)]));
        assert_eq!(error_uri(&reply), "http://courier.local/error#not-authenticated");
    }

    #[test]
    fn handshake_through_reserved_procedures() {
        let table = table(true);
        let session = Session::new(SessionId::from("sess01"));

        let reply = table.dispatch(&session, &call("#authreq", vec![json!("app"), json!({})]));
        let WampMessage::CallResult(CallResultMessage { result, .. }) = reply else {
            panic!("expected challenge");
        };
        let challenge = result.as_str().expect("challenge string");

        let signature = sign("s3cret", challenge).expect("sign");
        let reply = table.dispatch(
            &session,
            &call("http://api.wamp.ws/procedure#auth", vec![json!(signature)]),
        );
        assert!(matches!(
            reply,
            WampMessage::CallResult(CallResultMessage { result: Value::Null, .. })
        ));
        assert!(session.is_authenticated());
        assert_eq!(session.principal().as_deref(), Some("app"));

        let reply = table.dispatch(&session, &call("/calc/add", vec![json!(4)]));
        assert!(matches!(reply, WampMessage::CallResult(_)));
    }

    #[test]
    fn handshake_failures_map_to_error_uris() {
        let table = table(true);
        let session = Session::new(SessionId::from("s"));

        let reply = table.dispatch(&session, &call("#auth", vec![json!("sig")]));
        assert_eq!(error_uri(&reply), "http://courier.local/error#no-challenge-issued");

        let reply = table.dispatch(&session, &call("#authreq", vec![json!("ghost")]));
        assert_eq!(error_uri(&reply), "http://courier.local/error#unknown-auth-key");

        let reply = table.dispatch(&session, &call("#authreq", vec![json!(42)]));
        assert_eq!(error_uri(&reply), "http://courier.local/error#invalid-argument");

        table.dispatch(&session, &call("#authreq", vec![json!("app")]));
        let reply = table.dispatch(&session, &call("#authreq", vec![json!("app")]));
        assert_eq!(
            error_uri(&reply),
            "http://courier.local/error#challenge-already-issued"
        );

        let reply = table.dispatch(&session, &call("#auth", vec![json!("bogus")]));
        assert_eq!(error_uri(&reply), "http://courier.local/error#invalid-signature");
        assert!(!session.is_authenticated());
    }

    #[test]
    fn reserved_names_are_recognised() {
        assert_eq!(reserved("#authreq"), Some(Reserved::AuthRequest));
        assert_eq!(reserved("#auth"), Some(Reserved::Auth));
        assert_eq!(
            reserved("http://api.wamp.ws/procedure#authreq"),
            Some(Reserved::AuthRequest)
        );
        assert_eq!(reserved("http://api.wamp.ws/procedure#auth"), Some(Reserved::Auth));
        assert_eq!(reserved("http://x/y#auth"), None);
        assert_eq!(reserved("/auth"), None);
        assert_eq!(reserved("http://x/y#authorize"), None);
        assert_eq!(reserved("http://api.wamp.ws/procedure/extra#auth"), None);
    }

    #[test]
    fn user_procedure_with_auth_fragment_is_dispatched() {
        let settings = BrokerSettings::default();
        let secrets = StaticSecrets::from_iter([("app", "s3cret")]);
        let mut table = ProcedureTable::new(&settings, CraAuthenticator::new(Arc::new(secrets)));
        table
            .register("http://example.com/api#auth", |_, _| Ok(json!("user handler")))
            .expect("register");
        let session = Session::new(SessionId::from("s"));

        let reply = table.dispatch(&session, &call("http://example.com/api#auth", vec![]));
        assert_eq!(
            reply,
            WampMessage::CallResult(CallResultMessage {
                call_id: "c1".to_string(),
                result: json!("user handler"),
            })
        );
        assert_eq!(session.auth().state(), courier_auth::AuthState::Idle);
    }
}
