use config::ConfigError;
use serde::Deserialize;

/// Top-level configuration for the dashboard bus client.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub polling: PollingSettings,
    pub health: HealthSettings,
    pub persistence: PersistenceSettings,
    pub log_level: String,
}

/// Where the broker lives and how the session is negotiated.
///
/// Credentials have no default and are normally supplied through the
/// environment.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id_prefix: String,
    pub clean_session: bool,
    pub connect_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub keepalive_secs: u64,
}

/// Client-side behaviour of the outbound and inbound paths.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    /// Minimum spacing between two publishes on the same topic.
    pub rate_limit_ms: u64,
    pub debug_log_capacity: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PollingSettings {
    pub heartbeat_secs: u64,
    pub dashboard_secs: u64,
    /// How long an integration sign-in may stay pending.
    pub auth_timeout_secs: u64,
}

/// The agent bridge health endpoint.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HealthSettings {
    pub url: String,
    pub interval_secs: u64,
    pub timeout_ms: u64,
}

/// Snapshotting of last-received values. Disabled when `snapshot_path` is
/// unset.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PersistenceSettings {
    pub snapshot_path: Option<String>,
    pub snapshot_ttl_secs: u64,
}

/// Partial configuration loaded from files or the environment.
///
/// Every field is optional; missing values are filled from [`Settings::default`].
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
    pub polling: Option<PartialPollingSettings>,
    pub health: Option<PartialHealthSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id_prefix: Option<String>,
    pub clean_session: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub reconnect_interval_ms: Option<u64>,
    pub keepalive_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub rate_limit_ms: Option<u64>,
    pub debug_log_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPollingSettings {
    pub heartbeat_secs: Option<u64>,
    pub dashboard_secs: Option<u64>,
    pub auth_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHealthSettings {
    pub url: Option<String>,
    pub interval_secs: Option<u64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPersistenceSettings {
    pub snapshot_path: Option<String>,
    pub snapshot_ttl_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                url: "wss://localhost:8884/mqtt".to_string(),
                username: None,
                password: None,
                client_id_prefix: "alex_dashboard_".to_string(),
                clean_session: true,
                connect_timeout_ms: 4000,
                reconnect_interval_ms: 1000,
                keepalive_secs: 60,
            },
            client: ClientSettings {
                rate_limit_ms: 500,
                debug_log_capacity: 20,
            },
            polling: PollingSettings {
                heartbeat_secs: 5,
                dashboard_secs: 60,
                auth_timeout_secs: 60,
            },
            health: HealthSettings {
                url: "http://127.0.0.1:8033/health".to_string(),
                interval_secs: 10,
                timeout_ms: 3000,
            },
            persistence: PersistenceSettings {
                snapshot_path: None,
                snapshot_ttl_secs: 86_400,
            },
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Rejects durations the timers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("broker.connect_timeout_ms", self.broker.connect_timeout_ms),
            ("polling.heartbeat_secs", self.polling.heartbeat_secs),
            ("polling.dashboard_secs", self.polling.dashboard_secs),
            ("polling.auth_timeout_secs", self.polling.auth_timeout_secs),
            ("health.interval_secs", self.health.interval_secs),
            ("health.timeout_ms", self.health.timeout_ms),
        ];
        match periods.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(ConfigError::Message(format!("{key} must be greater than zero"))),
            None => Ok(()),
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge_over(self, default: Settings) -> Settings {
        let broker = self.broker.unwrap_or_default();
        let client = self.client.unwrap_or_default();
        let polling = self.polling.unwrap_or_default();
        let health = self.health.unwrap_or_default();
        let persistence = self.persistence.unwrap_or_default();

        Settings {
            broker: BrokerSettings {
                url: broker.url.unwrap_or(default.broker.url),
                username: broker.username.or(default.broker.username),
                password: broker.password.or(default.broker.password),
                client_id_prefix: broker
                    .client_id_prefix
                    .unwrap_or(default.broker.client_id_prefix),
                clean_session: broker.clean_session.unwrap_or(default.broker.clean_session),
                connect_timeout_ms: broker
                    .connect_timeout_ms
                    .unwrap_or(default.broker.connect_timeout_ms),
                reconnect_interval_ms: broker
                    .reconnect_interval_ms
                    .unwrap_or(default.broker.reconnect_interval_ms),
                keepalive_secs: broker.keepalive_secs.unwrap_or(default.broker.keepalive_secs),
            },
            client: ClientSettings {
                rate_limit_ms: client.rate_limit_ms.unwrap_or(default.client.rate_limit_ms),
                debug_log_capacity: client
                    .debug_log_capacity
                    .unwrap_or(default.client.debug_log_capacity),
            },
            polling: PollingSettings {
                heartbeat_secs: polling.heartbeat_secs.unwrap_or(default.polling.heartbeat_secs),
                dashboard_secs: polling.dashboard_secs.unwrap_or(default.polling.dashboard_secs),
                auth_timeout_secs: polling
                    .auth_timeout_secs
                    .unwrap_or(default.polling.auth_timeout_secs),
            },
            health: HealthSettings {
                url: health.url.unwrap_or(default.health.url),
                interval_secs: health.interval_secs.unwrap_or(default.health.interval_secs),
                timeout_ms: health.timeout_ms.unwrap_or(default.health.timeout_ms),
            },
            persistence: PersistenceSettings {
                snapshot_path: persistence
                    .snapshot_path
                    .or(default.persistence.snapshot_path),
                snapshot_ttl_secs: persistence
                    .snapshot_ttl_secs
                    .unwrap_or(default.persistence.snapshot_ttl_secs),
            },
            log_level: self.log_level.unwrap_or(default.log_level),
        }
    }
}
