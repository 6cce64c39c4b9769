use anyhow::{Context, Result, bail};
use courier_auth::StaticSecrets;
use courier_common::BrokerSettings;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

// Gateway configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // WebSocket listener bind address.
    pub ws_bind: SocketAddr,
    // Metrics HTTP listener bind address.
    pub metrics_bind: SocketAddr,
    // Gate SUBSCRIBE/UNSUBSCRIBE/PUBLISH and CALLs behind CRA.
    pub authentication_required: bool,
    // Max cached destinations; 0 disables the cache.
    pub cache_limit: usize,
    // Max time one outbound delivery may wait for queue space.
    pub send_timeout_ms: u64,
    // Per-session outbound queue depth.
    pub outbound_queue_capacity: usize,
    // CRA auth key -> shared secret.
    pub cra_secrets: StaticSecrets,
}

const DEFAULT_WS_BIND: &str = "0.0.0.0:9000";
const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9090";
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct GatewayConfigOverride {
    ws_bind: Option<String>,
    metrics_bind: Option<String>,
    authentication_required: Option<bool>,
    cache_limit: Option<usize>,
    send_timeout_ms: Option<u64>,
    outbound_queue_capacity: Option<usize>,
    cra_secrets: Option<StaticSecrets>,
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
}

// "key=secret,key2=secret2"
fn parse_secrets(raw: &str) -> Result<StaticSecrets> {
    let mut secrets = StaticSecrets::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Some((key, secret)) = pair.split_once('=') else {
            bail!("expected key=secret in COURIER_CRA_SECRETS, got {pair:?}");
        };
        secrets.insert(key.trim(), secret.trim());
    }
    Ok(secrets)
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let ws_bind = std::env::var("COURIER_WS_BIND")
            .unwrap_or_else(|_| DEFAULT_WS_BIND.to_string())
            .parse()
            .with_context(|| "parse COURIER_WS_BIND")?;
        let metrics_bind = std::env::var("COURIER_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse COURIER_METRICS_BIND")?;
        let authentication_required = env_flag("COURIER_AUTH_REQUIRED").unwrap_or(false);
        // Zero is meaningful here: it turns the cache off.
        let cache_limit = env_parse::<usize>("COURIER_CACHE_LIMIT")
            .unwrap_or(courier_common::DEFAULT_CACHE_LIMIT);
        let send_timeout_ms = env_parse::<u64>("COURIER_SEND_TIMEOUT_MS")
            .filter(|value| *value > 0)
            .unwrap_or(courier_common::DEFAULT_SEND_TIMEOUT.as_millis() as u64);
        let outbound_queue_capacity = env_parse::<usize>("COURIER_OUTBOUND_QUEUE")
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAPACITY);
        let cra_secrets = match std::env::var("COURIER_CRA_SECRETS") {
            Ok(raw) => parse_secrets(&raw)?,
            Err(_) => StaticSecrets::new(),
        };
        Ok(Self {
            ws_bind,
            metrics_bind,
            authentication_required,
            cache_limit,
            send_timeout_ms,
            outbound_queue_capacity,
            cra_secrets,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("COURIER_GATEWAY_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read COURIER_GATEWAY_CONFIG: {path}"))?;
            let override_cfg: GatewayConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse gateway config yaml")?;
            if let Some(value) = override_cfg.ws_bind {
                config.ws_bind = value.parse().with_context(|| "parse ws_bind")?;
            }
            if let Some(value) = override_cfg.metrics_bind {
                config.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
            }
            if let Some(value) = override_cfg.authentication_required {
                config.authentication_required = value;
            }
            if let Some(value) = override_cfg.cache_limit {
                config.cache_limit = value;
            }
            if let Some(value) = override_cfg.send_timeout_ms
                && value > 0
            {
                config.send_timeout_ms = value;
            }
            if let Some(value) = override_cfg.outbound_queue_capacity
                && value > 0
            {
                config.outbound_queue_capacity = value;
            }
            if let Some(value) = override_cfg.cra_secrets {
                config.cra_secrets = value;
            }
        }
        Ok(config)
    }

    pub fn broker_settings(&self) -> Result<BrokerSettings> {
        let settings = BrokerSettings::default()
            .with_authentication_required(self.authentication_required)
            .with_cache_limit(self.cache_limit)
            .with_send_timeout(Duration::from_millis(self.send_timeout_ms))
            .with_context(|| "build broker settings")?;
        Ok(settings)
    }
}
