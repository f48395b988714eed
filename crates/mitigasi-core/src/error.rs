//! Error types for the synchronization core.
//!
//! Per-district and per-event failures are not errors of the loops that
//! hit them: they are logged, counted and skipped. [`CoreError`] covers
//! what stops a component, chiefly loss of the broker connection.

use mitigasi_db::DbError;

use crate::config::ConfigError;

/// Errors that can stop a synchronizer or publisher.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// The broker connection failed or a read from it failed.
    #[error("broker transport error: {0}")]
    Transport(String),

    /// An event kept failing to apply and was left unacknowledged.
    #[error("event not applied after {attempts} attempts: {source}")]
    Stalled {
        /// Tries made.
        attempts: u32,
        /// The last store error.
        source: DbError,
    },

    /// The broker ended the event stream.
    #[error("event stream closed by the broker")]
    StreamClosed,

    /// An event could not be serialized or published.
    #[error("publish error: {0}")]
    Publish(String),
}

impl CoreError {
    /// Whether this error ends the event consumer loop.
    pub const fn is_transport_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::StreamClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_closed_stream_are_fatal() {
        assert!(CoreError::Transport("connection reset".to_owned()).is_transport_fatal());
        assert!(CoreError::StreamClosed.is_transport_fatal());
        assert!(!CoreError::Publish("no ack".to_owned()).is_transport_fatal());
        assert!(!CoreError::Store(DbError::Decode("x".to_owned())).is_transport_fatal());
        let stalled = CoreError::Stalled {
            attempts: 5,
            source: DbError::Config("down".to_owned()),
        };
        assert!(!stalled.is_transport_fatal());
        assert!(stalled.to_string().contains("5 attempts"));
    }
}
