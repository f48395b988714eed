//! Error types for the district service.

use mitigasi_api::ServerError;
use mitigasi_core::ConfigError;
use mitigasi_db::DbError;

/// Errors that stop the district service.
#[derive(Debug, thiserror::Error)]
pub enum KecamatanError {
    /// Configuration could not be loaded, is invalid, or names no district.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The district database could not be opened or migrated.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// The HTTP server failed.
    #[error("server error: {0}")]
    Server(#[from] ServerError),
}
