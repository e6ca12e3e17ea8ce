//! Validated runtime settings for the server process.

use crate::ai::ResolverConfig;
use shared::Color;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing API key: set GEMINI_API_KEY or pass --gemini-api-key (or run with --no-ai)")]
    MissingApiKey,

    #[error("max clients must be at least 1")]
    NoClientCapacity,

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("unknown seat {0:?}, expected \"white\" or \"black\"")]
    UnknownSeat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_clients: usize,
    /// Seat reserved for the AI opponent, `None` for two human players.
    pub ai_seat: Option<Color>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::NoClientCapacity);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_clients: 32,
            ai_seat: Some(Color::Black),
        }
    }
}

pub fn parse_seat(value: &str) -> Result<Color, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "white" | "w" => Ok(Color::White),
        "black" | "b" => Ok(Color::Black),
        _ => Err(ConfigError::UnknownSeat(value.to_string())),
    }
}

/// Rejects a resolver setup that could never issue or time a request.
pub fn validate_resolver(config: &ResolverConfig) -> Result<(), ConfigError> {
    if config.request_timeout == Duration::ZERO {
        return Err(ConfigError::MustBePositive("request timeout"));
    }
    if config.candidate_limit == 0 {
        return Err(ConfigError::MustBePositive("candidate limit"));
    }
    Ok(())
}

/// The credential is only needed when the AI seat is in use.
pub fn require_api_key(key: Option<&str>, ai_enabled: bool) -> Result<Option<String>, ConfigError> {
    if !ai_enabled {
        return Ok(None);
    }
    match key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(Some(key.to_string())),
        _ => Err(ConfigError::MissingApiKey),
    }
}
