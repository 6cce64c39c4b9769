use serde::Deserialize;
use std::collections::HashMap;

/// Resolves the shared secret behind an authentication key.
///
/// Must not block: it is consulted inside the handshake's critical section.
pub trait SecretProvider: Send + Sync {
    fn secret_for(&self, auth_key: &str) -> Option<String>;
}

impl<F> SecretProvider for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn secret_for(&self, auth_key: &str) -> Option<String> {
        self(auth_key)
    }
}

/// Fixed key -> secret table, typically loaded from configuration.
///
/// ```
/// use courier_auth::{SecretProvider, StaticSecrets};
///
/// let secrets = StaticSecrets::from_iter([("a", "secret-a")]);
/// assert_eq!(secrets.secret_for("a").as_deref(), Some("secret-a"));
/// assert!(secrets.secret_for("b").is_none());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct StaticSecrets {
    secrets: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, auth_key: impl Into<String>, secret: impl Into<String>) {
        self.secrets.insert(auth_key.into(), secret.into());
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for StaticSecrets
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            secrets: iter
                .into_iter()
                .map(|(key, secret)| (key.into(), secret.into()))
                .collect(),
        }
    }
}

impl SecretProvider for StaticSecrets {
    fn secret_for(&self, auth_key: &str) -> Option<String> {
        // An empty secret is treated as no secret at all.
        self.secrets
            .get(auth_key)
            .filter(|secret| !secret.is_empty())
            .cloned()
    }
}
