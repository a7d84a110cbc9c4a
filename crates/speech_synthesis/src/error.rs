//! Speech synthesis errors

use thiserror::Error;

use crate::types::ProviderKind;

/// Errors that can occur during speech synthesis
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Request rejected before any provider was invoked
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A provider was unavailable, uninitialized or returned a failure
    #[error("{provider} provider failed: {message}{}", status_suffix(.status.as_ref()))]
    Provider {
        /// Which provider failed
        provider: ProviderKind,
        /// HTTP status returned by a remote service, if any
        status: Option<u16>,
        /// Failure description
        message: String,
    },

    /// The local model could not be loaded
    #[error("Model initialization failed: {0}")]
    Initialization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn status_suffix(status: Option<&u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl SpeechError {
    /// Failure of the local provider
    pub fn local(message: impl Into<String>) -> Self {
        Self::Provider {
            provider: ProviderKind::Local,
            status: None,
            message: message.into(),
        }
    }

    /// Failure of the cloud provider without an HTTP status
    pub fn cloud(message: impl Into<String>) -> Self {
        Self::Provider {
            provider: ProviderKind::Cloud,
            status: None,
            message: message.into(),
        }
    }

    /// Non-success response from the cloud provider
    pub fn cloud_status(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: ProviderKind::Cloud,
            status: Some(status),
            message: message.into(),
        }
    }

    /// The provider responsible for this error, if any
    #[must_use]
    pub const fn provider(&self) -> Option<ProviderKind> {
        match self {
            Self::Provider { provider, .. } => Some(*provider),
            Self::Initialization(_) => Some(ProviderKind::Local),
            Self::Validation(_) | Self::Configuration(_) => None,
        }
    }

    /// HTTP status carried by a cloud failure
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            format!("request failed: {err}")
        };

        Self::Provider {
            provider: ProviderKind::Cloud,
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}
