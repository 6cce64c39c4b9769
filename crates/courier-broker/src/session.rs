// Per-connection context. Owned by the connection task and handed to the
// router and procedure table by reference.
use courier_auth::SessionAuth;
use courier_common::SessionId;
use courier_wire::{PrefixTable, WampMessage};

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    principal: Option<String>,
    auth: SessionAuth,
    prefixes: PrefixTable,
}

/// A decoded message together with the session it arrived on.
#[derive(Debug)]
pub struct Inbound<'a> {
    pub session: &'a Session,
    pub message: WampMessage,
}

impl<'a> Inbound<'a> {
    pub fn new(session: &'a Session, message: WampMessage) -> Self {
        Self { session, message }
    }
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            principal: None,
            auth: SessionAuth::new(),
            prefixes: PrefixTable::new(),
        }
    }

    /// Transport-level identity (for example a peer address or a user name).
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The explicit principal, else the CRA key once authenticated.
    pub fn principal(&self) -> Option<String> {
        self.principal.clone().or_else(|| self.auth.auth_key())
    }

    pub fn auth(&self) -> &SessionAuth {
        &self.auth
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    pub fn prefixes(&self) -> &PrefixTable {
        &self.prefixes
    }

    pub fn register_prefix(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let (prefix, uri) = (prefix.into(), uri.into());
        tracing::trace!(session_id = %self.id, prefix = %prefix, uri = %uri, "prefix registered");
        self.prefixes.register(prefix, uri);
    }

    /// Decodes a frame with this session's prefixes.
    pub fn decode(&self, input: impl AsRef<[u8]>) -> courier_wire::Result<Inbound<'_>> {
        let message = courier_wire::decode(input, &self.prefixes)?;
        Ok(Inbound::new(self, message))
    }

    /// Envelope for the disconnect cleanup that releases every subscription.
    pub fn cleanup(&self) -> Inbound<'_> {
        Inbound::new(
            self,
            WampMessage::Unsubscribe(courier_wire::UnsubscribeMessage::cleanup()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_uses_session_prefixes() {
        let mut session = Session::new(SessionId::from("sess01"));
        session.register_prefix("calc", "http://example.com/calc#");
        let inbound = session
            .decode(r#"[2, "c1", "calc:add", 1, 2]"#)
            .expect("decode");
        assert_eq!(inbound.session.id().as_str(), "sess01");
        assert_eq!(
            inbound.message.destination(),
            Some("http://example.com/calc#add")
        );
    }

    #[test]
    fn principal_prefers_explicit_value() {
        let session = Session::new(SessionId::from("s")).with_principal("peer-1");
        assert_eq!(session.principal().as_deref(), Some("peer-1"));
        assert!(Session::new(SessionId::from("s")).principal().is_none());
    }

    #[test]
    fn cleanup_envelope_has_no_destination() {
        let session = Session::new(SessionId::from("s"));
        let inbound = session.cleanup();
        assert!(matches!(&inbound.message, WampMessage::Unsubscribe(msg) if msg.is_cleanup()));
        assert_eq!(inbound.message.destination(), None);
    }
}
