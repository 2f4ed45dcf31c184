//! Error types for the Gateway

use thiserror::Error;
use warbler_core::{LoadError, PlatformError};

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Specification load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(e: serde_yaml::Error) -> Self {
        GatewayError::InvalidConfig(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::WebSocket(e.to_string())
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Persistence(e.to_string())
    }
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
