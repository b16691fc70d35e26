//! Error types for the event alerter.

use thiserror::Error;

/// Errors that can occur while watching events or delivering alerts.
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API request failed
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Watch stream produced an error
    #[error("watch stream error: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Alert gateway answered with a non-200 status
    #[error("alert gateway returned {status}")]
    GatewayStatus {
        /// Status code of the rejected delivery
        status: reqwest::StatusCode,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The watch subscription ended before the initial full list completed
    #[error("initial sync interrupted: {0}")]
    InitialSync(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
