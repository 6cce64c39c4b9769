// WAMP v1 wire format: every message is a JSON array led by an integer type id.
use courier_common::SessionId;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fmt;

mod eligibility;
mod prefix;

pub use eligibility::Eligibility;
pub use prefix::PrefixTable;

pub const PROTOCOL_VERSION: u64 = 1;
pub const SERVER_IDENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("message is not a JSON array")]
    NotAnArray,
    #[error("missing or non-integer message type id")]
    MissingType,
    #[error("unknown message type id {0}")]
    UnknownType(u64),
    #[error("{kind} message is missing field `{field}`")]
    MissingField {
        kind: MessageType,
        field: &'static str,
    },
    #[error("{kind} message has an invalid `{field}`")]
    InvalidField {
        kind: MessageType,
        field: &'static str,
    },
    #[error("malformed JSON")]
    Json(#[source] serde_json::Error),
    #[error("{0} has no wire representation")]
    NotEncodable(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Welcome = 0,
    Prefix = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
    Subscribe = 5,
    Unsubscribe = 6,
    Publish = 7,
    Event = 8,
}

impl MessageType {
    pub fn id(self) -> u64 {
        self as u64
    }

    pub fn from_id(id: u64) -> Result<Self> {
        Ok(match id {
            0 => Self::Welcome,
            1 => Self::Prefix,
            2 => Self::Call,
            3 => Self::CallResult,
            4 => Self::CallError,
            5 => Self::Subscribe,
            6 => Self::Unsubscribe,
            7 => Self::Publish,
            8 => Self::Event,
            other => return Err(Error::UnknownType(other)),
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Welcome => "WELCOME",
            Self::Prefix => "PREFIX",
            Self::Call => "CALL",
            Self::CallResult => "CALLRESULT",
            Self::CallError => "CALLERROR",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Publish => "PUBLISH",
            Self::Event => "EVENT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeMessage {
    pub session_id: SessionId,
    pub protocol_version: u64,
    pub server_ident: String,
}

impl WelcomeMessage {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            protocol_version: PROTOCOL_VERSION,
            server_ident: SERVER_IDENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMessage {
    pub prefix: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMessage {
    pub call_id: String,
    pub proc_uri: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResultMessage {
    pub call_id: String,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallErrorMessage {
    pub call_id: String,
    pub error_uri: String,
    pub error_desc: String,
    pub error_details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeMessage {
    pub topic_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeMessage {
    pub topic_uri: String,
    cleanup: bool,
}

impl UnsubscribeMessage {
    pub fn new(topic_uri: impl Into<String>) -> Self {
        Self {
            topic_uri: topic_uri.into(),
            cleanup: false,
        }
    }

    /// Internal disconnect marker: drop every subscription of the session.
    /// Never produced by the decoder and never encoded.
    pub fn cleanup() -> Self {
        Self {
            topic_uri: String::new(),
            cleanup: true,
        }
    }

    pub fn is_cleanup(&self) -> bool {
        self.cleanup
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMessage {
    pub topic_uri: String,
    pub event: Value,
    pub eligibility: Eligibility,
}

/// EVENT as delivered to subscribers. `eligibility` only matters for
/// programmatic fan-out and is not part of the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub topic_uri: String,
    pub event: Value,
    pub eligibility: Eligibility,
}

impl EventMessage {
    pub fn new(topic_uri: impl Into<String>, event: Value) -> Self {
        Self {
            topic_uri: topic_uri.into(),
            event,
            eligibility: Eligibility::everyone(),
        }
    }

    pub fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }
}

/// A decoded WAMP message.
///
/// ```
/// use courier_wire::{PrefixTable, WampMessage, decode};
///
/// let mut prefixes = PrefixTable::new();
/// prefixes.register("t", "/topic/");
/// let message = decode(r#"[7, "t:news", "hello"]"#, &prefixes).expect("decode");
/// assert_eq!(message.destination(), Some("/topic/news"));
/// assert_eq!(message.encode().expect("encode"), r#"[7,"/topic/news","hello"]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WampMessage {
    Welcome(WelcomeMessage),
    Prefix(PrefixMessage),
    Call(CallMessage),
    CallResult(CallResultMessage),
    CallError(CallErrorMessage),
    Subscribe(SubscribeMessage),
    Unsubscribe(UnsubscribeMessage),
    Publish(PublishMessage),
    Event(EventMessage),
}

impl WampMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Welcome(_) => MessageType::Welcome,
            Self::Prefix(_) => MessageType::Prefix,
            Self::Call(_) => MessageType::Call,
            Self::CallResult(_) => MessageType::CallResult,
            Self::CallError(_) => MessageType::CallError,
            Self::Subscribe(_) => MessageType::Subscribe,
            Self::Unsubscribe(_) => MessageType::Unsubscribe,
            Self::Publish(_) => MessageType::Publish,
            Self::Event(_) => MessageType::Event,
        }
    }

    /// Topic or procedure URI this message targets, if any.
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::Call(msg) => Some(&msg.proc_uri),
            Self::Subscribe(msg) => Some(&msg.topic_uri),
            Self::Unsubscribe(msg) if !msg.is_cleanup() => Some(&msg.topic_uri),
            Self::Publish(msg) => Some(&msg.topic_uri),
            Self::Event(msg) => Some(&msg.topic_uri),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        let id = self.message_type().id();
        let value = match self {
            Self::Welcome(msg) => json!([
                id,
                msg.session_id,
                msg.protocol_version,
                msg.server_ident
            ]),
            Self::Prefix(msg) => json!([id, msg.prefix, msg.uri]),
            Self::Call(msg) => {
                let mut items = Vec::with_capacity(3 + msg.args.len());
                items.push(json!(id));
                items.push(json!(msg.call_id));
                items.push(json!(msg.proc_uri));
                items.extend(msg.args.iter().cloned());
                Value::Array(items)
            }
            Self::CallResult(msg) => json!([id, msg.call_id, msg.result]),
            Self::CallError(msg) => match &msg.error_details {
                Some(details) => json!([id, msg.call_id, msg.error_uri, msg.error_desc, details]),
                None => json!([id, msg.call_id, msg.error_uri, msg.error_desc]),
            },
            Self::Subscribe(msg) => json!([id, msg.topic_uri]),
            Self::Unsubscribe(msg) => {
                if msg.is_cleanup() {
                    return Err(Error::NotEncodable("cleanup UNSUBSCRIBE"));
                }
                json!([id, msg.topic_uri])
            }
            Self::Publish(msg) => {
                let rule = &msg.eligibility;
                // The wire form carries either the flag or the lists, never both.
                if rule.exclude_me && (rule.exclude.is_some() || rule.eligible.is_some()) {
                    return Err(Error::NotEncodable("PUBLISH with excludeMe and session lists"));
                }
                let mut items = vec![json!(id), json!(msg.topic_uri), msg.event.clone()];
                if rule.exclude_me {
                    items.push(Value::Bool(true));
                } else if let Some(eligible) = &rule.eligible {
                    items.push(id_list(rule.exclude.as_ref()));
                    items.push(id_list(Some(eligible)));
                } else if let Some(exclude) = &rule.exclude {
                    items.push(id_list(Some(exclude)));
                }
                Value::Array(items)
            }
            Self::Event(msg) => json!([id, msg.topic_uri, msg.event]),
        };
        Ok(value)
    }

    pub fn encode(&self) -> Result<String> {
        let value = self.to_value()?;
        serde_json::to_string(&value).map_err(Error::Json)
    }
}

fn id_list(ids: Option<&BTreeSet<SessionId>>) -> Value {
    let items = ids
        .map(|ids| ids.iter().map(|id| json!(id)).collect())
        .unwrap_or_default();
    Value::Array(items)
}

/// Decodes one message, expanding CURIEs in destination URIs with `prefixes`.
pub fn decode(input: impl AsRef<[u8]>, prefixes: &PrefixTable) -> Result<WampMessage> {
    let value: Value = serde_json::from_slice(input.as_ref()).map_err(Error::Json)?;
    decode_value(value, prefixes)
}

pub fn decode_value(value: Value, prefixes: &PrefixTable) -> Result<WampMessage> {
    let Value::Array(items) = value else {
        return Err(Error::NotAnArray);
    };
    let mut items = items.into_iter();
    let kind = items
        .next()
        .and_then(|id| id.as_u64())
        .ok_or(Error::MissingType)
        .and_then(MessageType::from_id)?;
    let mut fields = Fields { kind, items };

    let message = match kind {
        MessageType::Welcome => WampMessage::Welcome(WelcomeMessage {
            session_id: SessionId::new(fields.string("sessionId")?),
            protocol_version: fields.unsigned("protocolVersion")?,
            server_ident: fields.string("serverIdent")?,
        }),
        MessageType::Prefix => WampMessage::Prefix(PrefixMessage {
            prefix: fields.string("prefix")?,
            uri: fields.string("uri")?,
        }),
        MessageType::Call => WampMessage::Call(CallMessage {
            call_id: fields.string("callId")?,
            proc_uri: fields.uri("procUri", prefixes)?,
            args: fields.rest(),
        }),
        MessageType::CallResult => WampMessage::CallResult(CallResultMessage {
            call_id: fields.string("callId")?,
            result: fields.value("result")?,
        }),
        MessageType::CallError => WampMessage::CallError(CallErrorMessage {
            call_id: fields.string("callId")?,
            error_uri: fields.string("errorUri")?,
            error_desc: fields.string("errorDesc")?,
            error_details: fields.optional(),
        }),
        MessageType::Subscribe => WampMessage::Subscribe(SubscribeMessage {
            topic_uri: fields.uri("topicUri", prefixes)?,
        }),
        MessageType::Unsubscribe => {
            WampMessage::Unsubscribe(UnsubscribeMessage::new(fields.uri("topicUri", prefixes)?))
        }
        MessageType::Publish => {
            let topic_uri = fields.uri("topicUri", prefixes)?;
            let event = fields.value("event")?;
            let eligibility = fields.publish_options()?;
            WampMessage::Publish(PublishMessage {
                topic_uri,
                event,
                eligibility,
            })
        }
        MessageType::Event => WampMessage::Event(EventMessage {
            topic_uri: fields.uri("topicUri", prefixes)?,
            event: fields.value("event")?,
            eligibility: Eligibility::everyone(),
        }),
    };
    Ok(message)
}

struct Fields {
    kind: MessageType,
    items: std::vec::IntoIter<Value>,
}

impl Fields {
    fn value(&mut self, field: &'static str) -> Result<Value> {
        self.items.next().ok_or(Error::MissingField {
            kind: self.kind,
            field,
        })
    }

    fn optional(&mut self) -> Option<Value> {
        self.items.next()
    }

    fn string(&mut self, field: &'static str) -> Result<String> {
        match self.value(field)? {
            Value::String(value) => Ok(value),
            _ => Err(self.invalid(field)),
        }
    }

    fn unsigned(&mut self, field: &'static str) -> Result<u64> {
        self.value(field)?
            .as_u64()
            .ok_or_else(|| self.invalid(field))
    }

    fn uri(&mut self, field: &'static str, prefixes: &PrefixTable) -> Result<String> {
        let raw = self.string(field)?;
        Ok(prefixes.expand(&raw))
    }

    fn rest(self) -> Vec<Value> {
        self.items.collect()
    }

    // [.., excludeMe] | [.., excludeList] | [.., excludeList, eligibleList]
    fn publish_options(&mut self) -> Result<Eligibility> {
        let mut rule = Eligibility::everyone();
        match self.items.next() {
            None => return Ok(rule),
            Some(Value::Bool(exclude_me)) => {
                rule.exclude_me = exclude_me;
                return Ok(rule);
            }
            Some(Value::Array(exclude)) => {
                rule.exclude = Some(self.session_ids(exclude, "exclude")?);
            }
            Some(_) => return Err(self.invalid("exclude")),
        }
        match self.items.next() {
            None => {}
            Some(Value::Array(eligible)) => {
                rule.eligible = Some(self.session_ids(eligible, "eligible")?);
            }
            Some(_) => return Err(self.invalid("eligible")),
        }
        Ok(rule)
    }

    fn session_ids(&self, values: Vec<Value>, field: &'static str) -> Result<BTreeSet<SessionId>> {
        values
            .into_iter()
            .map(|value| match value {
                Value::String(id) => Ok(SessionId::new(id)),
                _ => Err(self.invalid(field)),
            })
            .collect()
    }

    fn invalid(&self, field: &'static str) -> Error {
        Error::InvalidField {
            kind: self.kind,
            field,
        }
    }
}
