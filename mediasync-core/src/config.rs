//! Service configuration
//!
//! Where the service of record lives, which credentials to present, and the
//! drift policy used when reconciling local playback.

use std::env;

use thiserror::Error;

/// Default service address (matches the reference server's default port)
pub const DEFAULT_SERVICE_ADDRESS: &str = "http://localhost:8216";

/// Path and query of the Socket.IO endpoint (Engine.IO v4, WebSocket only)
const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Drift beyond which local playback is reloaded instead of corrected in place
const DEFAULT_RESYNC_THRESHOLD_SECS: f64 = 1.0;

/// Positions at or below this are treated as "stopped"
const DEFAULT_STOPPED_POSITION_SECS: f64 = 0.0;

/// How long a load may stay unready before the next snapshot reloads it
const DEFAULT_PREPARE_TIMEOUT_SECS: f64 = 5.0;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid service address: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Thresholds for the player reconciliation state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    /// Minimum position difference (seconds) that forces a reload + re-seek
    pub resync_threshold_secs: f64,
    /// A widget position at or below this counts as not started
    pub stopped_position_secs: f64,
    /// Snapshots for a source still preparing are deferred for this long, then reloaded
    pub prepare_timeout_secs: f64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            resync_threshold_secs: DEFAULT_RESYNC_THRESHOLD_SECS,
            stopped_position_secs: DEFAULT_STOPPED_POSITION_SECS,
            prepare_timeout_secs: DEFAULT_PREPARE_TIMEOUT_SECS,
        }
    }
}

impl ReconcilePolicy {
    /// Whether a widget at `current` must be resynced to reach `target`
    pub fn needs_resync(&self, target: f64, current: f64) -> bool {
        (target - current).abs() >= self.resync_threshold_secs || self.is_stopped(current)
    }

    /// Whether a load started `elapsed_secs` ago has stalled
    pub fn prepare_expired(&self, elapsed_secs: f64) -> bool {
        elapsed_secs >= self.prepare_timeout_secs
    }

    /// Whether a position counts as stopped
    pub fn is_stopped(&self, position: f64) -> bool {
        position <= self.stopped_position_secs
    }
}

/// Connection and credential settings for one service of record
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base HTTP(S) address, e.g. `http://localhost:8216`
    pub service_address: String,
    /// Shared secret for server-to-server calls (user management)
    pub secret_key: Option<String>,
    /// Per-session user token sent with state-mutating commands
    pub user_token: Option<String>,
    /// Drift policy for attached players
    pub reconcile: ReconcilePolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_ADDRESS)
    }
}

impl ServiceConfig {
    /// Create a config for the given service address
    pub fn new(service_address: impl Into<String>) -> Self {
        Self {
            service_address: service_address.into(),
            secret_key: None,
            user_token: None,
            reconcile: ReconcilePolicy::default(),
        }
    }

    /// Set the per-session user token
    pub fn with_user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }

    /// Set the shared secret
    pub fn with_secret_key(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = Some(secret.into());
        self
    }

    /// Set the reconciliation policy
    pub fn with_reconcile_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.reconcile = policy;
        self
    }

    /// Load configuration from `MEDIASYNC_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            lookup("MEDIASYNC_SERVICE_ADDRESS").unwrap_or_else(|| DEFAULT_SERVICE_ADDRESS.to_string()),
        );
        config.secret_key = lookup("MEDIASYNC_SECRET_KEY").filter(|s| !s.is_empty());
        config.user_token = lookup("MEDIASYNC_USER_TOKEN").filter(|s| !s.is_empty());

        if let Some(value) = lookup("MEDIASYNC_RESYNC_THRESHOLD") {
            config.reconcile.resync_threshold_secs = parse_seconds("MEDIASYNC_RESYNC_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("MEDIASYNC_STOPPED_POSITION") {
            config.reconcile.stopped_position_secs = parse_seconds("MEDIASYNC_STOPPED_POSITION", &value)?;
        }
        if let Some(value) = lookup("MEDIASYNC_PREPARE_TIMEOUT") {
            config.reconcile.prepare_timeout_secs = parse_seconds("MEDIASYNC_PREPARE_TIMEOUT", &value)?;
        }

        // Fail early on an unusable address
        config.socket_url()?;
        Ok(config)
    }

    /// Base address without a trailing slash
    pub fn base_address(&self) -> &str {
        self.service_address.trim_end_matches('/')
    }

    /// WebSocket URL of the Socket.IO endpoint
    pub fn socket_url(&self) -> Result<String, ConfigError> {
        let base = self.base_address();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(ConfigError::InvalidAddress(self.service_address.clone()));
        };

        if ws_base.ends_with("://") {
            return Err(ConfigError::InvalidAddress(self.service_address.clone()));
        }

        Ok(format!("{}{}", ws_base, SOCKET_PATH))
    }

    /// Absolute URL of a REST endpoint (`path` starts with `/`)
    pub fn endpoint(&self, path: &str) -> String {
        join_url(self.base_address(), path)
    }
}

/// Join a base address and a server-relative path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

fn parse_seconds(name: &'static str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_socket_url_schemes() {
        let http = ServiceConfig::new("http://localhost:8216");
        assert_eq!(
            http.socket_url().unwrap(),
            "ws://localhost:8216/socket.io/?EIO=4&transport=websocket"
        );

        let https = ServiceConfig::new("https://media.example.com/");
        assert_eq!(
            https.socket_url().unwrap(),
            "wss://media.example.com/socket.io/?EIO=4&transport=websocket"
        );

        assert!(ServiceConfig::new("localhost:8216").socket_url().is_err());
        assert!(ServiceConfig::new("http://").socket_url().is_err());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1/", "/v/a.mp4"), "http://h:1/v/a.mp4");
        assert_eq!(join_url("http://h:1", "v/a.mp4"), "http://h:1/v/a.mp4");
        assert_eq!(ServiceConfig::new("http://h:1").endpoint("/upload"), "http://h:1/upload");
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.service_address, DEFAULT_SERVICE_ADDRESS);
        assert!(config.user_token.is_none());
        assert_eq!(config.reconcile, ReconcilePolicy::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("MEDIASYNC_SERVICE_ADDRESS", "https://sync.example.com"),
            ("MEDIASYNC_USER_TOKEN", "user-1"),
            ("MEDIASYNC_SECRET_KEY", ""),
            ("MEDIASYNC_RESYNC_THRESHOLD", "2.5"),
            ("MEDIASYNC_PREPARE_TIMEOUT", "8"),
        ]))
        .unwrap();

        assert_eq!(config.service_address, "https://sync.example.com");
        assert_eq!(config.user_token.as_deref(), Some("user-1"));
        assert!(config.secret_key.is_none());
        assert_eq!(config.reconcile.resync_threshold_secs, 2.5);
        assert_eq!(config.reconcile.prepare_timeout_secs, 8.0);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let bad_threshold = ServiceConfig::from_lookup(lookup_from(&[("MEDIASYNC_RESYNC_THRESHOLD", "soon")]));
        assert!(matches!(bad_threshold, Err(ConfigError::InvalidValue { .. })));

        let bad_address = ServiceConfig::from_lookup(lookup_from(&[("MEDIASYNC_SERVICE_ADDRESS", "ftp://x")]));
        assert!(matches!(bad_address, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_policy_resync_rules() {
        let policy = ReconcilePolicy::default();
        assert!(!policy.needs_resync(10.4, 10.0));
        assert!(policy.needs_resync(12.0, 10.0));
        assert!(policy.needs_resync(11.0, 10.0));
        assert!(policy.needs_resync(0.2, 0.0));
        assert!(policy.is_stopped(0.0));
        assert!(!policy.is_stopped(0.01));
        assert!(!policy.prepare_expired(1.0));
        assert!(policy.prepare_expired(5.0));
    }
}
