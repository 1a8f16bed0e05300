//! Error taxonomy for the sync engine.

use crate::connector::ConnectorError;
use crate::sync::repository::RepositoryError;

/// Errors that abort a folder sync or a whole origin cycle.
///
/// Per-message failures ([`crate::connector::FetchError`]) never surface
/// here; they are logged and skipped inside the batch loop.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Protocol or network failure. Aborts the current folder's sync without
    /// advancing its watermark; during reconciliation it aborts the whole
    /// origin cycle.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Batch commit failure. The batch is rolled back and the folder
    /// watermark stays at the last committed state.
    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
