//! Error types for the city service.
//!
//! Any of these ending `main` exits the process with a non-zero status.

use mitigasi_api::ServerError;
use mitigasi_core::{ConfigError, CoreError};
use mitigasi_db::DbError;

/// Errors that stop the city service.
#[derive(Debug, thiserror::Error)]
pub enum KotaError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The aggregate database could not be opened or migrated.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// A synchronizer could not start or lost its broker.
    #[error("synchronizer error: {0}")]
    Sync(#[from] CoreError),

    /// The HTTP server failed.
    #[error("server error: {0}")]
    Server(#[from] ServerError),
}
