//! Tidemark is an incremental mailbox synchronization engine.
//!
//! It maintains a local SQLite mirror of remote mail folders, keyed by
//! `(full name, UIDVALIDITY)` generation, and imports message headers
//! incrementally using per-folder watermarks. Message-ID based matching
//! detects messages moved between folders (including across UIDVALIDITY
//! changes) instead of importing duplicates.
//!
//! The crate is organized in four layers:
//!
//! - [`domain`]: entity types shared by everything else
//! - [`connector`]: the trait surface a remote mailbox implementation
//!   provides (folder listing, selection, incremental search)
//! - [`storage`]: the SQLite mirror and the repository the engine runs on
//! - [`sync`]: the reconciliation pipeline itself

pub mod connector;
pub mod domain;
pub mod storage;
pub mod sync;
