use interview_core::TurnConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub turn: TurnConfig,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    /// *   `INTERVIEW_API_BASE_URL`: Base URL of the platform's interview API. Defaults to "http://localhost:5000/api".
    /// *   `INTERVIEW_API_TOKEN`: (Optional) Bearer token sent with every API request.
    /// *   `SILENCE_TIMEOUT_MS`: (Optional) Silence that ends an answer. Defaults to 5000.
    /// *   `SPEECH_GRACE_DELAY_MS`: (Optional) Pause between the question ending and capture starting. Defaults to 500.
    /// *   `NEXT_QUESTION_DELAY_MS`: (Optional) Pause before the next question is spoken. Defaults to 1000.
    /// *   `MAX_SILENT_CYCLES`: (Optional) Empty silence windows before a question is skipped. Unset waits forever.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_base_url = lookup("INTERVIEW_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if api_base_url.trim().is_empty() {
            return Err(ConfigError::MissingVar(
                "INTERVIEW_API_BASE_URL must not be empty".to_string(),
            ));
        }
        let api_token = lookup("INTERVIEW_API_TOKEN").filter(|token| !token.is_empty());

        let mut turn = TurnConfig::builder();
        if let Some(ms) = parse_number(&lookup, "SILENCE_TIMEOUT_MS")? {
            turn = turn.with_silence_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_number(&lookup, "SPEECH_GRACE_DELAY_MS")? {
            turn = turn.with_speech_grace_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_number(&lookup, "NEXT_QUESTION_DELAY_MS")? {
            turn = turn.with_next_question_delay(Duration::from_millis(ms));
        }
        let max_silent_cycles = parse_number(&lookup, "MAX_SILENT_CYCLES")?
            .map(|cycles| {
                u32::try_from(cycles).map_err(|e| {
                    ConfigError::InvalidValue("MAX_SILENT_CYCLES".to_string(), e.to_string())
                })
            })
            .transpose()?;
        let turn = turn.with_max_silent_cycles(max_silent_cycles).build();
        if turn.silence_timeout().is_zero() {
            return Err(ConfigError::InvalidValue(
                "SILENCE_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            api_base_url,
            api_token,
            turn,
            log_level,
        })
    }
}

fn parse_number<F>(lookup: &F, name: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
        })
        .transpose()
}
