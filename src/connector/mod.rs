//! Protocol connector abstraction.
//!
//! The engine never speaks a wire protocol itself. Everything it needs from
//! a mail store goes through the [`Connector`] trait: folder listing, folder
//! selection, UIDVALIDITY, capabilities and search. Search results come back
//! as an [`EmailStream`], a pull-based, finite, non-restartable sequence in
//! server order.

mod query;

pub use query::{SearchQuery, SearchQueryBuilder, SearchTerm};

use async_trait::async_trait;

use crate::domain::{EmailEnvelope, RemoteFolder};

/// Errors that abort a connector call.
///
/// Any of these aborts the current folder's sync; during folder listing or
/// UIDVALIDITY collection they abort the whole origin cycle.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Authentication failed or credentials expired.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The requested folder does not exist or cannot be selected.
    #[error("folder \"{name}\" unavailable: {reason}")]
    Folder { name: String, reason: String },

    /// Protocol-level failure (bad response, unsupported operation).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Per-message failures that skip one message and continue the batch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The message disappeared between search and fetch.
    #[error("message uid {uid} vanished before fetch")]
    Vanished { uid: u32 },

    /// The message headers could not be parsed.
    #[error("cannot parse message uid {uid} (subject {subject:?}): {reason}")]
    Parse {
        uid: u32,
        subject: Option<String>,
        reason: String,
    },
}

/// One item pulled from an [`EmailStream`].
pub type FetchResult = std::result::Result<EmailEnvelope, FetchError>;

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// A lazy, finite sequence of search results.
///
/// Items arrive in server order and the stream cannot be restarted; callers
/// that need to re-read must issue a new search. A `FetchError` item skips a
/// single message, while a `ConnectorError` ends the stream.
#[async_trait]
pub trait EmailStream: Send {
    /// Pulls the next message, or `None` once the sequence is exhausted.
    async fn try_next(&mut self) -> Result<Option<FetchResult>>;
}

/// A ready-made stream over an in-memory result list.
///
/// Connector implementations that buffer a whole search response, and the
/// fake connectors used in tests, can wrap their results in this.
pub struct VecEmailStream {
    items: std::vec::IntoIter<FetchResult>,
}

impl VecEmailStream {
    /// Wraps an already-fetched result list.
    pub fn new(items: Vec<FetchResult>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

#[async_trait]
impl EmailStream for VecEmailStream {
    async fn try_next(&mut self) -> Result<Option<FetchResult>> {
        Ok(self.items.next())
    }
}

/// Protocol access to one remote mail store.
///
/// Folder selection is stateful: `uid_validity` and `search` operate on the
/// most recently selected folder. All calls are sequential from the engine's
/// point of view; retry scheduling and cancellation are the caller's
/// responsibility.
#[async_trait]
pub trait Connector: Send {
    /// Lists folders under `parent` (or the root), optionally recursively.
    async fn list_folders(
        &mut self,
        parent: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<RemoteFolder>>;

    /// Selects a folder by its full server path.
    async fn select_folder(&mut self, full_name: &str) -> Result<()>;

    /// UIDVALIDITY generation counter of the selected folder.
    async fn uid_validity(&mut self) -> Result<u32>;

    /// Capability strings advertised by the server.
    async fn capabilities(&mut self) -> Result<Vec<String>>;

    /// Executes a search in the selected folder.
    async fn search(&mut self, query: &SearchQuery) -> Result<Box<dyn EmailStream>>;
}
