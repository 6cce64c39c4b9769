use courier_common::SessionId;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("session {0} is not authenticated")]
    NotAuthenticated(SessionId),
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("session {0} is closed")]
    SessionClosed(SessionId),
    #[error("delivery to session {0} timed out")]
    Timeout(SessionId),
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    // Label value for delivery failure metrics.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            DeliveryError::SessionClosed(_) => "closed",
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Rejected(_) => "rejected",
        }
    }
}
