use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication already requested")]
    ChallengeAlreadyIssued,
    #[error("session is already authenticated")]
    AlreadyAuthenticated,
    #[error("no authentication challenge pending")]
    NoChallengeIssued,
    #[error("unknown authentication key: {0}")]
    UnknownAuthKey(String),
    #[error("no secret registered for authentication key: {0}")]
    SecretNotFound(String),
    #[error("signature for authentication request is invalid")]
    InvalidSignature,
    #[error("unusable HMAC key")]
    InvalidKey,
}

impl AuthError {
    // Short machine-readable code, used as the fragment of CALLERROR URIs.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::ChallengeAlreadyIssued => "challenge-already-issued",
            AuthError::AlreadyAuthenticated => "already-authenticated",
            AuthError::NoChallengeIssued => "no-challenge-issued",
            AuthError::UnknownAuthKey(_) => "unknown-auth-key",
            AuthError::SecretNotFound(_) => "secret-not-found",
            AuthError::InvalidSignature => "invalid-signature",
            AuthError::InvalidKey => "invalid-key",
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
