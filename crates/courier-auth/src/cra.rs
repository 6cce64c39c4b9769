// Challenge-response handshake.
//
// challenge = HMAC-SHA256(session_id || now_millis, key = auth_key)
// expected  = HMAC-SHA256(challenge, key = secret(auth_key))
//
// Both are carried as standard base64 strings.
use crate::errors::{AuthError, AuthResult};
use crate::secrets::SecretProvider;
use crate::state::{AuthState, SessionAuth};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_common::SessionId;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Base64 HMAC-SHA256 of `data` under `key`.
///
/// ```
/// let signature = courier_auth::sign("secret", "challenge").unwrap();
/// assert_eq!(signature.len(), 44);
/// ```
pub fn sign(key: &str, data: &str) -> AuthResult<String> {
    let mut mac = mac_for(key)?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

// Constant-time comparison against a base64 signature.
fn verify(key: &str, data: &str, signature: &str) -> AuthResult<bool> {
    let Ok(provided) = STANDARD.decode(signature) else {
        return Ok(false);
    };
    let mut mac = mac_for(key)?;
    mac.update(data.as_bytes());
    Ok(mac.verify_slice(&provided).is_ok())
}

fn mac_for(key: &str) -> AuthResult<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).map_err(|_| AuthError::InvalidKey)
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Drives the handshake for any number of sessions against one secret source.
#[derive(Clone)]
pub struct CraAuthenticator {
    secrets: Arc<dyn SecretProvider>,
}

impl std::fmt::Debug for CraAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraAuthenticator").finish_non_exhaustive()
    }
}

impl CraAuthenticator {
    pub fn new(secrets: Arc<dyn SecretProvider>) -> Self {
        Self { secrets }
    }

    /// Issues a challenge for `auth_key`. `extra` is accepted for protocol
    /// compatibility and otherwise ignored.
    pub fn handle_auth_request(
        &self,
        session_id: &SessionId,
        auth: &SessionAuth,
        auth_key: &str,
        extra: Option<&Value>,
    ) -> AuthResult<String> {
        let mut state = auth.lock();
        match &*state {
            AuthState::Idle => {}
            AuthState::ChallengeIssued { .. } => return Err(AuthError::ChallengeAlreadyIssued),
            AuthState::Authenticated { .. } => return Err(AuthError::AlreadyAuthenticated),
        }
        if self.secrets.secret_for(auth_key).is_none() {
            tracing::debug!(session_id = %session_id, auth_key, "authentication requested for unknown key");
            return Err(AuthError::UnknownAuthKey(auth_key.to_string()));
        }

        let challenge = sign(auth_key, &format!("{session_id}{}", now_millis()))?;
        *state = AuthState::ChallengeIssued {
            auth_key: auth_key.to_string(),
            challenge: challenge.clone(),
        };
        tracing::debug!(
            session_id = %session_id,
            auth_key,
            has_extra = extra.is_some_and(|value| !value.is_null()),
            "authentication challenge issued"
        );
        Ok(challenge)
    }

    /// Checks the client's signature over the pending challenge. Any failure
    /// returns the session to `Idle` so it may start over.
    pub fn handle_auth_response(
        &self,
        session_id: &SessionId,
        auth: &SessionAuth,
        signature: &str,
    ) -> AuthResult<()> {
        let mut state = auth.lock();
        let (auth_key, challenge) = match std::mem::take(&mut *state) {
            AuthState::ChallengeIssued {
                auth_key,
                challenge,
            } => (auth_key, challenge),
            other => {
                *state = other;
                return Err(AuthError::NoChallengeIssued);
            }
        };

        let Some(secret) = self.secrets.secret_for(&auth_key) else {
            tracing::warn!(session_id = %session_id, auth_key = %auth_key, "secret disappeared during authentication");
            metrics::counter!("courier_auth_failures_total", "reason" => "secret-not-found")
                .increment(1);
            return Err(AuthError::SecretNotFound(auth_key));
        };

        if !verify(&secret, &challenge, signature)? {
            tracing::warn!(
                target: "courier::security",
                session_id = %session_id,
                auth_key = %auth_key,
                "authentication failed: signature mismatch"
            );
            metrics::counter!("courier_auth_failures_total", "reason" => "invalid-signature")
                .increment(1);
            return Err(AuthError::InvalidSignature);
        }

        tracing::info!(session_id = %session_id, auth_key = %auth_key, "session authenticated");
        *state = AuthState::Authenticated {
            auth_key,
            signature: signature.to_string(),
        };
        Ok(())
    }
}
