//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::util::time::{DEFAULT_TICK_RATE_HZ, MAX_TICK_RATE_HZ, MIN_TICK_RATE_HZ};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Allowed client origins for CORS, comma separated ("*" for any)
    pub client_origin: String,

    /// Simulation ticks per second for every match
    pub tick_rate_hz: u32,
    /// How long a disconnected player may take to come back
    pub reconnect_grace: Duration,
    /// Period of the matchmaking sweep
    pub queue_sweep_interval: Duration,
    /// Paired remote matches wait for both players to accept
    pub require_match_accept: bool,
    /// Score needed to win, applied to every new match
    pub win_score: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_json: false,
            client_origin: "*".to_string(),
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            reconnect_grace: Duration::from_secs(5),
            queue_sweep_interval: Duration::from_millis(1000),
            require_match_accept: false,
            win_score: 2,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Render-style PORT wins over SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| defaults.server_addr.to_string())
        };

        let tick_rate_hz = parse_or("TICK_RATE_HZ", defaults.tick_rate_hz)?;
        if !(MIN_TICK_RATE_HZ..=MAX_TICK_RATE_HZ).contains(&tick_rate_hz) {
            return Err(ConfigError::Invalid("TICK_RATE_HZ"));
        }

        let win_score = parse_or("WIN_SCORE", defaults.win_score)?;
        if win_score == 0 {
            return Err(ConfigError::Invalid("WIN_SCORE"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or(defaults.client_origin),
            tick_rate_hz,
            reconnect_grace: Duration::from_secs(parse_or("RECONNECT_GRACE_SECS", 5u64)?),
            queue_sweep_interval: Duration::from_millis(parse_or("QUEUE_SWEEP_MS", 1000u64)?),
            require_match_accept: parse_or("REQUIRE_MATCH_ACCEPT", defaults.require_match_accept)?,
            win_score,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.reconnect_grace, Duration::from_secs(5));
        assert!(!config.require_match_accept);
    }

    #[test]
    fn parse_or_falls_back_when_unset() {
        let value: u32 = parse_or("PONG_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
