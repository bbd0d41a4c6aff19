//! Typed errors for the relay core.
//!
//! Library code returns `RelayError`; `anyhow` is only used by the binary.
//! Every variant is recoverable at some scope (range, item or sink) except
//! `Config`, which only occurs at startup.

use thiserror::Error;

/// Errors raised by the relay core and its collaborators.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Search, detail fetch or asset download failed
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Catalog has no item with this id
    #[error("item not found: {id}")]
    NotFound { id: String },

    /// Ledger I/O failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Description generator failed
    #[error("description error: {0}")]
    Description(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A publishing sink failed
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Local file handling failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// Shutdown was requested
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors a publishing sink can report.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport failure talking to the sink
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Sink answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Asset could not be made acceptable for the sink
    #[error("media error: {0}")]
    Media(String),

    /// Reading the local asset failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sink-specific failure that fits no other bucket
    #[error("{0}")]
    Other(String),
}

impl From<ntfy::NtfyError> for SinkError {
    fn from(err: ntfy::NtfyError) -> Self {
        match err {
            ntfy::NtfyError::Http(e) => SinkError::Http(e),
            ntfy::NtfyError::Api { status, body } => SinkError::Api {
                service: "ntfy",
                status,
                body,
            },
            other => SinkError::Other(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        RelayError::Storage(Box::new(err))
    }
}

impl From<wallhaven_client::WallhavenError> for RelayError {
    fn from(err: wallhaven_client::WallhavenError) -> Self {
        match err {
            wallhaven_client::WallhavenError::NotFound(id) => RelayError::NotFound { id },
            other => RelayError::Network(Box::new(other)),
        }
    }
}

impl From<openai_client::OpenAIError> for RelayError {
    fn from(err: openai_client::OpenAIError) -> Self {
        RelayError::Description(Box::new(err))
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallhaven_not_found_maps_to_not_found() {
        let err: RelayError = wallhaven_client::WallhavenError::NotFound("a1".into()).into();
        assert!(matches!(err, RelayError::NotFound { ref id } if id == "a1"));
    }

    #[test]
    fn test_wallhaven_api_error_maps_to_network() {
        let err: RelayError = wallhaven_client::WallhavenError::Api {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, RelayError::Network(_)));
    }

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::Api {
            service: "mastodon",
            status: 422,
            body: "file too large".into(),
        };
        assert_eq!(err.to_string(), "mastodon returned 422: file too large");
    }
}
