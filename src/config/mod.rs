//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Match identifier used when reporting to the platform
    pub match_id: String,
    /// HMAC secret the Ready tokens are signed with
    pub auth_jwt_secret: String,

    /// Platform agent base URL (log-only reporting when unset)
    pub platform_url: Option<String>,
    /// Bearer key for the platform agent
    pub platform_api_key: Option<String>,

    /// Max inbound messages per second per connection
    pub input_rate_limit: u32,

    pub match_config: MatchConfig,
}

/// Gameplay and lifecycle timing for a single match
#[derive(Clone, Debug)]
pub struct MatchConfig {
    /// Fixed simulation ticks per second
    pub tick_rate_hz: u32,
    /// Wait after both players are seated before starting
    pub settle_delay: Duration,
    /// Wait after the end broadcast before reporting departures
    pub departure_delay: Duration,
    /// Wait after departures before releasing the match
    pub release_delay: Duration,
    /// Upper bound on waiting for outstanding platform reports at release
    pub report_drain_timeout: Duration,
    /// Distance of each bar from the field centre line
    pub bar_plane_y: f32,
    /// Extra distance past a bar before the ball counts as out
    pub out_of_bounds_margin: f32,
    /// Minimum per-axis speed of the serve
    pub ball_base_speed: f32,
    /// Fixed seed for the serve RNG (entropy when unset)
    pub rng_seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 50,
            settle_delay: Duration::from_secs(1),
            departure_delay: Duration::from_secs(1),
            release_delay: Duration::from_secs(3),
            report_drain_timeout: Duration::from_secs(5),
            bar_plane_y: 270.0,
            out_of_bounds_margin: 60.0,
            ball_base_speed: 1.5,
            rng_seed: None,
        }
    }
}

impl MatchConfig {
    /// Ball |y| beyond which the ball has left the field
    pub fn out_of_bounds_threshold(&self) -> f32 {
        self.bar_plane_y + self.out_of_bounds_margin
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate_hz.max(1) as u64)
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            tick_rate_hz: parse_or("TICK_RATE_HZ", defaults.tick_rate_hz)?,
            settle_delay: millis_or("SETTLE_DELAY_MS", defaults.settle_delay)?,
            departure_delay: millis_or("DEPARTURE_DELAY_MS", defaults.departure_delay)?,
            release_delay: millis_or("RELEASE_DELAY_MS", defaults.release_delay)?,
            rng_seed: match env::var("RNG_SEED") {
                Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("RNG_SEED"))?),
                Err(_) => None,
            },
            ..defaults
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when the host injects it
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:7777".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            match_id: env::var("MATCH_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            auth_jwt_secret: env::var("AUTH_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?,

            platform_url: env::var("PLATFORM_URL").ok(),
            platform_api_key: env::var("PLATFORM_API_KEY").ok(),

            input_rate_limit: parse_or("INPUT_RATE_LIMIT", 240)?,

            match_config: MatchConfig::from_env()?,
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn millis_or(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
