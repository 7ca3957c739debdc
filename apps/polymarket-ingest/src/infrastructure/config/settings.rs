//! Ingest Configuration Settings
//!
//! Configuration types for the ingestion service, loaded from environment
//! variables. Unparsable values fall back to their defaults; values that
//! would stall a timer are rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::ports::Credentials;
use crate::application::services::{ReconcilerConfig, RetentionConfig};
use crate::infrastructure::polymarket::{
    DEFAULT_MARKET_URL, KeepAliveConfig, ReconnectConfig, SupervisorConfig, WsTransportConfig,
};

/// Market channel session settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Market channel WebSocket URL.
    pub wss_url: String,
    /// Upper bound on the connect handshake.
    pub connect_timeout: Duration,
    /// Time between keep-alive `PING`s.
    pub keepalive_interval: Duration,
    /// Silence after a `PING` before the session is declared dead.
    pub keepalive_timeout: Duration,
    /// Consecutive failures before ingestion goes idle.
    pub max_reconnect_attempts: u32,
    /// Ceiling on the reconnect delay.
    pub reconnect_delay_max: Duration,
    /// Pause between teardown and rebuild on `restart`.
    pub restart_settle: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            wss_url: DEFAULT_MARKET_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            reconnect_delay_max: Duration::from_secs(60),
            restart_settle: Duration::from_millis(1000),
        }
    }
}

/// Longest accepted retention window, in days.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Periodic task settings.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Time between reconciliation ticks.
    pub market_check_interval: Duration,
    /// Time between retention cleanup passes.
    pub cleanup_interval: Duration,
    /// Days stored events are kept.
    pub retention_days: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            market_check_interval: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(3600),
            retention_days: 7,
        }
    }
}

/// File locations.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Watch-list JSON file.
    pub watchlist_path: PathBuf,
    /// JSON-lines book store; `None` keeps events in memory.
    pub book_store_path: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            watchlist_path: PathBuf::from("watchlist.json"),
            book_store_path: None,
        }
    }
}

/// Channel capacities.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Supervisor → dispatcher feed.
    pub event_capacity: usize,
    /// Notification fan-out buffer.
    pub notification_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            event_capacity: 4096,
            notification_capacity: 10_000,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health, metrics and command HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete ingestion configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// API credentials for the optional auth frame.
    pub credentials: Option<Credentials>,
    /// Market channel session settings.
    pub feed: FeedSettings,
    /// Periodic task settings.
    pub schedule: ScheduleSettings,
    /// File locations.
    pub storage: StorageSettings,
    /// Channel capacities.
    pub channels: ChannelSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are only partly set or a timer
    /// setting is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`IngestConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let feed_defaults = FeedSettings::default();
        let schedule_defaults = ScheduleSettings::default();
        let channel_defaults = ChannelSettings::default();

        let feed = FeedSettings {
            wss_url: env
                .non_empty("POLYMARKET_WSS_URL")
                .unwrap_or(feed_defaults.wss_url),
            connect_timeout: env.secs("CONNECT_TIMEOUT_SECS", feed_defaults.connect_timeout),
            keepalive_interval: env.secs("KEEPALIVE_INTERVAL_SECS", feed_defaults.keepalive_interval),
            keepalive_timeout: env.secs("KEEPALIVE_TIMEOUT_SECS", feed_defaults.keepalive_timeout),
            max_reconnect_attempts: env
                .parse("MAX_RECONNECT_ATTEMPTS")
                .unwrap_or(feed_defaults.max_reconnect_attempts),
            reconnect_delay_max: env.secs(
                "RECONNECT_DELAY_MAX_SECS",
                feed_defaults.reconnect_delay_max,
            ),
            restart_settle: env.millis("RESTART_SETTLE_MILLIS", feed_defaults.restart_settle),
        };

        let schedule = ScheduleSettings {
            market_check_interval: env.secs(
                "MARKET_CHECK_INTERVAL",
                schedule_defaults.market_check_interval,
            ),
            cleanup_interval: env.secs("CLEANUP_INTERVAL_SECS", schedule_defaults.cleanup_interval),
            retention_days: env
                .parse("BOOK_RETENTION_DAYS")
                .unwrap_or(schedule_defaults.retention_days),
        };

        let storage = StorageSettings {
            watchlist_path: env
                .non_empty("WATCHLIST_PATH")
                .map_or_else(|| StorageSettings::default().watchlist_path, PathBuf::from),
            book_store_path: env.non_empty("BOOK_STORE_PATH").map(PathBuf::from),
        };

        let channels = ChannelSettings {
            event_capacity: env
                .parse("EVENT_CHANNEL_CAPACITY")
                .unwrap_or(channel_defaults.event_capacity),
            notification_capacity: env
                .parse("NOTIFICATION_CAPACITY")
                .unwrap_or(channel_defaults.notification_capacity),
        };

        let server = ServerSettings {
            health_port: env
                .parse("INGEST_HEALTH_PORT")
                .unwrap_or(ServerSettings::default().health_port),
        };

        let config = Self {
            credentials: credentials(&env)?,
            feed,
            schedule,
            storage,
            channels,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let timers = [
            ("KEEPALIVE_INTERVAL_SECS", self.feed.keepalive_interval),
            ("KEEPALIVE_TIMEOUT_SECS", self.feed.keepalive_timeout),
            ("CONNECT_TIMEOUT_SECS", self.feed.connect_timeout),
            ("MARKET_CHECK_INTERVAL", self.schedule.market_check_interval),
            ("CLEANUP_INTERVAL_SECS", self.schedule.cleanup_interval),
        ];
        for (key, value) in timers {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.schedule.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::InvalidValue {
                key: "BOOK_RETENTION_DAYS".to_string(),
                reason: format!("must be at most {MAX_RETENTION_DAYS}"),
            });
        }
        if self.channels.event_capacity == 0 || self.channels.notification_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EVENT_CHANNEL_CAPACITY/NOTIFICATION_CAPACITY".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Transport settings.
    #[must_use]
    pub fn transport_config(&self) -> WsTransportConfig {
        WsTransportConfig {
            url: self.feed.wss_url.clone(),
            connect_timeout: self.feed.connect_timeout,
        }
    }

    /// Supervisor settings.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            reconnect: ReconnectConfig::new(
                self.feed.reconnect_delay_max,
                self.feed.max_reconnect_attempts,
            ),
            keep_alive: KeepAliveConfig::new(
                self.feed.keepalive_interval,
                self.feed.keepalive_timeout,
            ),
            restart_settle: self.feed.restart_settle,
            credentials: self.credentials.clone(),
            ..SupervisorConfig::default()
        }
    }

    /// Reconciler settings.
    #[must_use]
    pub const fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            interval: self.schedule.market_check_interval,
        }
    }

    /// Retention settings.
    #[must_use]
    pub fn retention_config(&self) -> RetentionConfig {
        RetentionConfig {
            interval: self.schedule.cleanup_interval,
            retention: chrono::Duration::days(i64::from(self.schedule.retention_days)),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Only some of the credential variables are set.
    #[error("incomplete credentials: {0} is missing")]
    IncompleteCredentials(String),
    /// A value is present but unusable.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn credentials<F>(env: &Env<F>) -> Result<Option<Credentials>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const KEYS: [&str; 3] = [
        "POLYMARKET_API_KEY",
        "POLYMARKET_SECRET",
        "POLYMARKET_PASSPHRASE",
    ];
    let [api_key, secret, passphrase] = KEYS.map(|key| env.non_empty(key));

    match (api_key, secret, passphrase) {
        (None, None, None) => Ok(None),
        (Some(api_key), Some(secret), Some(passphrase)) => {
            Ok(Some(Credentials::new(api_key, secret, passphrase)))
        }
        (api_key, secret, _) => {
            let missing = if api_key.is_none() {
                KEYS[0]
            } else if secret.is_none() {
                KEYS[1]
            } else {
                KEYS[2]
            };
            Err(ConfigError::IncompleteCredentials(missing.to_string()))
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.non_empty(key).and_then(|v| v.parse().ok())
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IngestConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert!(config.credentials.is_none());
        assert_eq!(config.feed.wss_url, DEFAULT_MARKET_URL);
        assert_eq!(config.feed.keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.feed.keepalive_timeout, Duration::from_secs(30));
        assert_eq!(config.feed.max_reconnect_attempts, 10);
        assert_eq!(config.feed.reconnect_delay_max, Duration::from_secs(60));
        assert_eq!(config.feed.restart_settle, Duration::from_secs(1));
        assert_eq!(config.schedule.market_check_interval, Duration::from_secs(300));
        assert_eq!(config.schedule.retention_days, 7);
        assert_eq!(config.storage.watchlist_path, PathBuf::from("watchlist.json"));
        assert!(config.storage.book_store_path.is_none());
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            ("POLYMARKET_WSS_URL", "ws://localhost:9000/ws"),
            ("MAX_RECONNECT_ATTEMPTS", "3"),
            ("MARKET_CHECK_INTERVAL", "60"),
            ("BOOK_STORE_PATH", "/var/lib/books.jsonl"),
            ("RESTART_SETTLE_MILLIS", "250"),
        ])
        .unwrap();
        assert_eq!(config.feed.wss_url, "ws://localhost:9000/ws");
        assert_eq!(config.supervisor_config().reconnect.max_attempts, 3);
        assert_eq!(config.reconciler_config().interval, Duration::from_secs(60));
        assert_eq!(config.supervisor_config().restart_settle, Duration::from_millis(250));
        assert_eq!(
            config.storage.book_store_path,
            Some(PathBuf::from("/var/lib/books.jsonl"))
        );
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = load(&[("INGEST_HEALTH_PORT", "not-a-port")]).unwrap();
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn full_credentials_are_loaded() {
        let config = load(&[
            ("POLYMARKET_API_KEY", "key"),
            ("POLYMARKET_SECRET", "secret"),
            ("POLYMARKET_PASSPHRASE", "phrase"),
        ])
        .unwrap();
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.api_key(), "key");
        assert!(!format!("{credentials:?}").contains("secret"));
    }

    #[test]
    fn partial_credentials_are_rejected() {
        let err = load(&[("POLYMARKET_API_KEY", "key")]).unwrap_err();
        assert!(
            matches!(err, ConfigError::IncompleteCredentials(ref key) if key == "POLYMARKET_SECRET")
        );
    }

    #[test]
    fn zero_timer_is_rejected() {
        let err = load(&[("KEEPALIVE_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn retention_window_in_days() {
        let config = load(&[("BOOK_RETENTION_DAYS", "2")]).unwrap();
        assert_eq!(config.retention_config().retention, chrono::Duration::days(2));
    }

    #[test]
    fn oversized_retention_is_rejected() {
        let err = load(&[("BOOK_RETENTION_DAYS", "4000000000")]).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BOOK_RETENTION_DAYS")
        );

        let config = load(&[("BOOK_RETENTION_DAYS", "36500")]).unwrap();
        assert_eq!(config.schedule.retention_days, MAX_RETENTION_DAYS);
    }
}
