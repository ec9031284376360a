//! Error types for the autopilot

use thiserror::Error;

/// Errors surfaced by the autopilot library
#[derive(Debug, Error)]
pub enum AutopilotError {
    /// Configuration file could not be parsed as JSON
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be parsed as TOML
    #[error("config parse error: {0}")]
    ConfigToml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Template image could not be decoded
    #[error("template error: {0}")]
    Image(#[from] image::ImageError),

    /// Room feed request failed
    #[error("room feed error: {0}")]
    Feed(#[from] reqwest::Error),

    /// Process, module or signature lookup failed, or a write was rejected
    #[error("memory error: {0}")]
    Memory(String),

    /// A setting holds a value outside its accepted range
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("autopilot is already running")]
    AlreadyRunning,
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AutopilotError>;
