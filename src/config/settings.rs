use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// TCP listen port (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub sweeper: SweeperSettings,
}

/// Store connection (`REDIS_ADDR`, `REDIS_PASS`, `REDIS_DB`).
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_addr")]
    pub addr: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub db: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Per-request deadline in seconds; requests past it answer 504.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Grace period in seconds for background tasks during shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
}

/// Streaming session keepalive tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// Interval in seconds between protocol pings to each session.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Sessions with no inbound traffic for this many seconds are closed.
    #[serde(default = "default_read_deadline")]
    pub read_deadline: u64,
    /// Interval in seconds between stale-session scans.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperSettings {
    /// Interval in seconds between housekeeping passes.
    #[serde(default = "default_sweep_interval")]
    pub interval: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_redis_addr() -> String {
    "localhost:6379".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    30
}

fn default_read_deadline() -> u64 {
    120
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    3600
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("port", 8080)?
            .set_default("redis.addr", "localhost:6379")?
            .set_default("redis.pass", "")?
            .set_default("redis.db", 0)?
            .set_default("server.request_timeout", 60)?
            .set_default("server.shutdown_grace", 10)?
            .set_default("stream.ping_interval", 30)?
            .set_default("stream.read_deadline", 120)?
            .set_default("stream.cleanup_interval", 60)?
            .set_default("sweeper.interval", 3600)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // PORT, REDIS_ADDR, REDIS_PASS, REDIS_DB
            .add_source(Environment::default().separator("_").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl RedisSettings {
    pub fn url(&self) -> String {
        if self.pass.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.pass, self.addr, self.db)
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            redis: RedisSettings::default(),
            server: ServerSettings::default(),
            stream: StreamSettings::default(),
            sweeper: SweeperSettings::default(),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            addr: default_redis_addr(),
            pass: String::new(),
            db: 0,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ping_interval: default_ping_interval(),
            read_deadline: default_read_deadline(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval: default_sweep_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.redis.addr, "localhost:6379");
        assert_eq!(settings.redis.db, 0);
        assert_eq!(settings.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_redis_url_without_password() {
        let redis = RedisSettings::default();
        assert_eq!(redis.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_redis_url_with_password() {
        let redis = RedisSettings {
            addr: "redis.internal:6380".to_string(),
            pass: "hunter2".to_string(),
            db: 3,
        };
        assert_eq!(redis.url(), "redis://:hunter2@redis.internal:6380/3");
    }

    #[test]
    fn test_tuning_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.request_timeout, 60);
        assert_eq!(settings.server.shutdown_grace, 10);
        assert_eq!(settings.stream.ping_interval, 30);
        assert_eq!(settings.stream.read_deadline, 120);
        assert_eq!(settings.sweeper.interval, 3600);
    }
}
