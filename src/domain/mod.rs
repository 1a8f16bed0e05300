//! Domain layer types for the tidemark sync engine.
//!
//! This module contains the core entities the engine reconciles: origins,
//! folder mirrors, message records and the canonical message aggregate, plus
//! the transient DTOs produced by connectors.

mod folder;
mod message;
mod origin;
mod types;

pub use folder::{FolderMirror, FolderType, RemoteFolder, RemoteFolderFlag};
pub use message::{Address, EmailEnvelope, EmailMessage, Importance, MessageRecord};
pub use origin::Origin;
pub use types::{FolderId, MessageId, MessageKey, OriginId, RecordId};
