// Shared data types and small helpers used across crates.
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("config error: {0}")]
    Config(String),
}

pub mod ids {
    // Connection-scoped identifiers. Session ids are opaque strings on the
    // wire (WELCOME carries them verbatim), so they are not forced into UUIDs.
    use super::{Error, Result};
    use serde::{Deserialize, Serialize};
    use std::borrow::Borrow;
    use std::fmt;
    use std::str::FromStr;
    use uuid::Uuid;

    #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SessionId(String);

    impl SessionId {
        pub fn new(value: impl Into<String>) -> Self {
            Self(value.into())
        }

        // Allocate a fresh random id for a new connection.
        pub fn generate() -> Self {
            Self(Uuid::new_v4().simple().to_string())
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    }

    impl fmt::Display for SessionId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl FromStr for SessionId {
        type Err = Error;

        fn from_str(input: &str) -> Result<Self> {
            if input.trim().is_empty() {
                return Err(Error::InvalidId(input.into()));
            }
            Ok(Self(input.to_string()))
        }
    }

    impl From<&str> for SessionId {
        fn from(value: &str) -> Self {
            Self(value.to_string())
        }
    }

    impl From<String> for SessionId {
        fn from(value: String) -> Self {
            Self(value)
        }
    }

    impl Borrow<str> for SessionId {
        fn borrow(&self) -> &str {
            &self.0
        }
    }
}

pub use ids::SessionId;

pub const DEFAULT_CACHE_LIMIT: usize = 1024;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(2000);

/// Broker policy shared by the registry, router and procedure table.
///
/// ```
/// use courier_common::BrokerSettings;
///
/// let settings = BrokerSettings::default().with_authentication_required(true);
/// assert!(settings.authentication_required);
/// assert_eq!(settings.cache_limit, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    // Reject SUBSCRIBE/UNSUBSCRIBE/PUBLISH and non-auth CALLs until CRA completes.
    pub authentication_required: bool,
    // Max concrete destinations kept in the lookup cache; 0 disables it.
    pub cache_limit: usize,
    // Upper bound for one outbound delivery.
    #[serde(with = "duration_ms")]
    pub send_timeout: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            authentication_required: false,
            cache_limit: DEFAULT_CACHE_LIMIT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl BrokerSettings {
    pub fn with_authentication_required(mut self, required: bool) -> Self {
        self.authentication_required = required;
        self
    }

    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::Config("send timeout must be non-zero".into()));
        }
        self.send_timeout = timeout;
        Ok(self)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
