//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `soilgate.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use soilgate_adapter_http_axum::SessionConfig;
use soilgate_adapter_serial::SerialConfig;
use soilgate_app::coordinator::CoordinatorConfig;
use soilgate_app::line_source::LineSourceConfig;
use soilgate_domain::event::DEFAULT_GREETING;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subscriber endpoint listener.
    pub server: ServerConfig,
    /// Input device.
    pub serial: SerialSection,
    /// Per-subscriber session behaviour.
    pub session: SessionSection,
    pub shutdown: ShutdownConfig,
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Serial device and line framing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    #[serde(flatten)]
    pub device: SerialConfig,
    /// Longest accepted line; longer lines are discarded.
    pub max_line_bytes: usize,
    /// Lines buffered between the reader and the parser.
    pub line_buffer: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub queue_capacity: usize,
    pub write_timeout_ms: u64,
    pub ping_interval_secs: u64,
    pub max_message_bytes: usize,
    /// Message of the acknowledgement sent on connect.
    pub greeting: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on the release sequence, in milliseconds.
    pub grace_period_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `soilgate.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("soilgate.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // `PORT` is the conventional variable; the prefixed one wins.
        for key in ["PORT", "SOILGATE_PORT"] {
            if let Some(port) = var(key).and_then(|val| val.parse().ok()) {
                self.server.port = port;
            }
        }
        if let Some(val) = var("SOILGATE_HOST") {
            self.server.host = val;
        }
        if let Some(val) = var("SOILGATE_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Some(val) = var("SOILGATE_SERIAL_PATH") {
            self.serial.device.path = val;
        }
        if let Some(baud) = var("SOILGATE_BAUD_RATE").and_then(|val| val.parse().ok()) {
            self.serial.device.baud_rate = baud;
        }
        if let Some(val) = var("SOILGATE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        self.serial
            .device
            .validate()
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        if self.serial.max_line_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_line_bytes must be non-zero".to_string(),
            ));
        }
        if self.serial.line_buffer == 0 {
            return Err(ConfigError::Validation(
                "line_buffer must be non-zero".to_string(),
            ));
        }
        if self.session.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.session.write_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "write_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.session.ping_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "ping_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.shutdown.grace_period_ms == 0 {
            return Err(ConfigError::Validation(
                "grace_period_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            grace_period: Duration::from_millis(self.shutdown.grace_period_ms),
            greeting: self.session.greeting.clone(),
            line_buffer: self.serial.line_buffer,
            line: LineSourceConfig {
                max_line_bytes: self.serial.max_line_bytes,
            },
        }
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            queue_capacity: self.session.queue_capacity,
            write_timeout: Duration::from_millis(self.session.write_timeout_ms),
            ping_interval: Duration::from_secs(self.session.ping_interval_secs),
            max_message_bytes: self.session.max_message_bytes,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            device: SerialConfig::default(),
            max_line_bytes: 1024,
            line_buffer: 64,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            queue_capacity: session.queue_capacity,
            write_timeout_ms: 2000,
            ping_interval_secs: 30,
            max_message_bytes: session.max_message_bytes,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "soilgated=info,soilgate=info,tower_http=debug".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with_env(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).cloned());
        config
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.serial.device.path, "/dev/ttyUSB0");
        assert_eq!(config.serial.device.baud_rate, 9600);
        assert_eq!(config.session.greeting, "Connected to soil moisture server");
        assert_eq!(config.shutdown.grace_period_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [serial]
            path = 'COM5'
            baud_rate = 115200
            max_line_bytes = 256
            line_buffer = 8

            [session]
            queue_capacity = 4
            write_timeout_ms = 500
            ping_interval_secs = 10
            max_message_bytes = 4096
            greeting = 'hello'

            [shutdown]
            grace_period_ms = 250

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9090");
        assert_eq!(config.serial.device.path, "COM5");
        assert_eq!(config.serial.device.baud_rate, 115_200);
        assert_eq!(config.serial.max_line_bytes, 256);
        assert_eq!(config.serial.line_buffer, 8);
        assert_eq!(config.session.queue_capacity, 4);
        assert_eq!(config.session.greeting, "hello");
        assert_eq!(config.shutdown.grace_period_ms, 250);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let toml = "
            [serial]
            path = '/dev/ttyACM0'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.serial.device.path, "/dev/ttyACM0");
        assert_eq!(config.serial.device.baud_rate, 9600);
        assert_eq!(config.serial.max_line_bytes, 1024);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn should_prefer_prefixed_port_over_plain_port() {
        let config = with_env(&[("PORT", "8080"), ("SOILGATE_PORT", "9090")]);
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn should_honour_plain_port() {
        let config = with_env(&[("PORT", "8080")]);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn should_split_bind_override() {
        let config = with_env(&[("SOILGATE_BIND", "127.0.0.1:7000")]);
        assert_eq!(config.bind_addr(), "127.0.0.1:7000");
    }

    #[test]
    fn should_override_serial_settings() {
        let config = with_env(&[
            ("SOILGATE_SERIAL_PATH", "/dev/ttyS0"),
            ("SOILGATE_BAUD_RATE", "19200"),
        ]);
        assert_eq!(config.serial.device.path, "/dev/ttyS0");
        assert_eq!(config.serial.device.baud_rate, 19_200);
    }

    #[test]
    fn should_ignore_unparsable_numbers() {
        let config = with_env(&[("SOILGATE_PORT", "http"), ("SOILGATE_BAUD_RATE", "fast")]);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.serial.device.baud_rate, 9600);
    }

    #[test]
    fn should_let_rust_log_win_over_soilgate_log() {
        let config = with_env(&[("SOILGATE_LOG", "info"), ("RUST_LOG", "trace")]);
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_empty_serial_path() {
        let mut config = Config::default();
        config.serial.device.path = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(msg)) if msg.contains("serial path")
        ));
    }

    #[test]
    fn should_reject_zero_queue_capacity() {
        let mut config = Config::default();
        config.session.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_write_timeout() {
        let mut config = Config::default();
        config.session.write_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(msg)) if msg.contains("write_timeout_ms")
        ));
    }

    #[test]
    fn should_reject_zero_ping_interval() {
        let toml = r"
            [session]
            ping_interval_secs = 0
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(msg)) if msg.contains("ping_interval_secs")
        ));
    }

    #[test]
    fn should_reject_zero_grace_period() {
        let mut config = Config::default();
        config.shutdown.grace_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_build_component_configs() {
        let config = Config::default();

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.grace_period, Duration::from_secs(1));
        assert_eq!(coordinator.line.max_line_bytes, 1024);

        let session = config.session_config();
        assert_eq!(session, SessionConfig::default());
    }
}
