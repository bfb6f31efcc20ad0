use pulsemon_common::types::{MetricError, MetricKind};

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use pulsemon_common::types::MetricKind;
/// use pulsemon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Gauge,
///     name: "cpu".to_string(),
/// };
/// assert!(err.is_not_found());
/// assert!(err.to_string().contains("cpu"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No metric with this name exists for the kind.
    #[error("Storage: {kind} metric {name} not found")]
    NotFound { kind: MetricKind, name: String },

    /// The metric violates the delta/value invariant.
    #[error("Storage: invalid metric: {0}")]
    InvalidMetric(#[from] MetricError),

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot file could not be encoded or decoded.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Every connection attempt at startup failed.
    #[error("Storage: could not connect to database after {attempts} attempts: {source}")]
    ConnectFailed {
        attempts: usize,
        source: sea_orm::DbErr,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, StorageError::InvalidMetric(_))
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
