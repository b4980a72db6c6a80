use bedside_core::InteractionMode;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where the scenario catalog is read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScenarioLocation {
    Url(String),
    Path(PathBuf),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub agent_url: String,
    pub scenarios: ScenarioLocation,
    pub request_timeout: Duration,
    pub audio_output_dir: Option<PathBuf>,
    pub speech_enabled: bool,
    pub speech_language: String,
    pub initial_mode: InteractionMode,
    pub log_level: Level,
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            var.to_string(),
            format!("'{}' is not a boolean", value),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let agent_url =
            std::env::var("AGENT_URL").unwrap_or_else(|_| "http://127.0.0.1:5000".to_string());
        if !agent_url.starts_with("http://") && !agent_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "AGENT_URL".to_string(),
                format!("'{}' is not an http(s) URL", agent_url),
            ));
        }

        let scenarios = match std::env::var("SCENARIOS_URL") {
            Ok(url) if !url.trim().is_empty() => ScenarioLocation::Url(url),
            _ => ScenarioLocation::Path(
                std::env::var("SCENARIOS_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./static/data/scenarios.json")),
            ),
        };

        let timeout_str =
            std::env::var("REQUEST_TIMEOUT_SECS").unwrap_or_else(|_| "60".to_string());
        let request_timeout = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "REQUEST_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        let audio_output_dir = std::env::var("AUDIO_OUTPUT_DIR").ok().map(PathBuf::from);

        let speech_enabled = match std::env::var("SPEECH_ENABLED") {
            Ok(value) => parse_bool("SPEECH_ENABLED", &value)?,
            Err(_) => true,
        };

        let speech_language =
            std::env::var("SPEECH_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());

        let initial_mode = match std::env::var("INTERACTION_MODE") {
            Ok(value) => value.parse::<InteractionMode>().map_err(|e| {
                ConfigError::InvalidValue("INTERACTION_MODE".to_string(), e.to_string())
            })?,
            Err(_) => InteractionMode::Text,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            agent_url,
            scenarios,
            request_timeout,
            audio_output_dir,
            speech_enabled,
            speech_language,
            initial_mode,
            log_level,
        })
    }
}
